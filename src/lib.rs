//! scorelayout: MusicXML layout engine.
//!
//! Parses MusicXML (`.musicxml`/`.xml`) and compressed MXL (`.mxl`)
//! files, builds an immutable [`Document`] of systems, measures and
//! signature-homogeneous fragments, and lays it out into a render tree
//! with positioned staves, notes, beams, tuplets, slurs, ties, wedges and
//! pedals. The render tree can be painted as SVG.
//!
//! # Example
//! ```no_run
//! use scorelayout::{build_document, parse_file, renderer::Renderer, Config};
//!
//! let score = parse_file("path/to/score.musicxml").unwrap();
//! let document = build_document(&score);
//! let svg = Renderer::new(Config::default()).render_svg(&document, Some(1000.0));
//! println!("{svg}");
//! ```

pub mod builder;
pub mod config;
pub mod document;
pub mod error;
pub mod events;
pub mod fraction;
pub mod model;
pub mod mxl;
pub mod parser;
pub mod renderer;
pub mod segment;
pub mod signature;
pub mod spanners;

use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

pub use builder::build_document;
pub use config::Config;
pub use document::Document;
pub use error::{Error, Result};
pub use fraction::Fraction;
pub use model::Score;
pub use mxl::parse_mxl;
pub use parser::parse_musicxml;
pub use renderer::{Renderer, ScoreRender};
pub use signature::Signature;

/// Parse a MusicXML file from a file path.
/// Automatically detects format based on file extension:
/// - `.musicxml` or `.xml` → uncompressed MusicXML
/// - `.mxl` → compressed MXL (ZIP archive)
pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Score> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|source| Error::Io { path: path.to_path_buf(), source })?;
    parse_bytes(&data, path.extension().and_then(|e| e.to_str()))
}

/// Parse MusicXML from raw bytes with an optional format hint.
/// Without a hint, text that looks like XML is parsed as MusicXML and
/// anything else as MXL.
pub fn parse_bytes(data: &[u8], extension: Option<&str>) -> Result<Score> {
    match extension.map(str::to_ascii_lowercase).as_deref() {
        Some("mxl") => parse_mxl(data),
        Some("musicxml") | Some("xml") => parse_musicxml(&String::from_utf8_lossy(data)),
        Some(other) => Err(Error::UnsupportedFormat(other.to_string())),
        None => {
            if let Ok(xml) = std::str::from_utf8(data) {
                if xml.trim_start().starts_with('<') {
                    return parse_musicxml(xml);
                }
            }
            parse_mxl(data)
        }
    }
}

/// Serialize a document tree to pretty JSON.
pub fn document_to_json(document: &Document) -> Result<String> {
    serde_json::to_string_pretty(document).map_err(Error::Serialize)
}

/// Serialize a render tree to pretty JSON.
pub fn render_to_json(render: &ScoreRender) -> Result<String> {
    serde_json::to_string_pretty(render).map_err(Error::Serialize)
}

/// Parse a MusicXML file and render it directly to SVG.
///
/// `width` is the target system width in user units; `None` uses the
/// configured width.
pub fn render_file_to_svg<P: AsRef<Path>>(path: P, width: Option<f64>, config: &Config) -> Result<String> {
    let score = parse_file(path)?;
    let document = build_document(&score);
    Ok(Renderer::new(config.clone()).render_svg(&document, width))
}

/// Parse MusicXML bytes and render to SVG.
pub fn render_bytes_to_svg(
    data: &[u8],
    extension: Option<&str>,
    width: Option<f64>,
    config: &Config,
) -> Result<String> {
    let score = parse_bytes(data, extension)?;
    let document = build_document(&score);
    Ok(Renderer::new(config.clone()).render_svg(&document, width))
}

// ═══════════════════════════════════════════════════════════════════════
// C FFI for static and shared library hosts
// ═══════════════════════════════════════════════════════════════════════

/// Run a render and hand its SVG to C. Errors and panics both come back
/// as null; a panic must not unwind into the host.
fn into_c_string(render: impl FnOnce() -> Result<String>) -> *mut c_char {
    match panic::catch_unwind(AssertUnwindSafe(render)) {
        Ok(Ok(svg)) => CString::new(svg).map_or(std::ptr::null_mut(), CString::into_raw),
        Ok(Err(err)) => {
            log::error!("render failed: {err}");
            std::ptr::null_mut()
        }
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("unknown panic");
            log::error!("render panicked: {message}");
            std::ptr::null_mut()
        }
    }
}

/// Parse a MusicXML file and return SVG as a C string.
/// The caller must free the returned string with `scorelayout_free_string`.
///
/// `width` sets the target system width. Pass 0.0 to use the default.
///
/// # Safety
/// `path` must be a valid null-terminated UTF-8 C string.
#[no_mangle]
pub unsafe extern "C" fn scorelayout_render_file(path: *const c_char, width: f64) -> *mut c_char {
    if path.is_null() {
        return std::ptr::null_mut();
    }
    let Ok(path) = (unsafe { CStr::from_ptr(path) }).to_str() else {
        return std::ptr::null_mut();
    };
    let width = (width > 0.0).then_some(width);
    into_c_string(|| render_file_to_svg(path, width, &Config::default()))
}

/// Parse MusicXML bytes and return SVG as a C string.
/// The caller must free the returned string with `scorelayout_free_string`.
///
/// # Safety
/// `data` must point to `len` valid bytes. `extension` may be null.
#[no_mangle]
pub unsafe extern "C" fn scorelayout_render_bytes(
    data: *const u8,
    len: usize,
    extension: *const c_char,
    width: f64,
) -> *mut c_char {
    if data.is_null() || len == 0 {
        return std::ptr::null_mut();
    }
    let bytes = unsafe { std::slice::from_raw_parts(data, len) };
    let extension = if extension.is_null() {
        None
    } else {
        unsafe { CStr::from_ptr(extension) }.to_str().ok()
    };
    let width = (width > 0.0).then_some(width);
    into_c_string(|| render_bytes_to_svg(bytes, extension, width, &Config::default()))
}

/// Free a string previously returned by a scorelayout function.
///
/// # Safety
/// `ptr` must be a string previously returned by a scorelayout function, or null.
#[no_mangle]
pub unsafe extern "C" fn scorelayout_free_string(ptr: *mut c_char) {
    if !ptr.is_null() {
        unsafe {
            drop(CString::from_raw(ptr));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panicking_render_returns_null() {
        let ptr = into_c_string(|| panic!("stave measured before it was drawn"));
        assert!(ptr.is_null());
    }

    #[test]
    fn failed_render_returns_null() {
        let ptr = into_c_string(|| Err(Error::UnsupportedFormat("pdf".to_string())));
        assert!(ptr.is_null());
    }

    #[test]
    fn serialization_errors_are_not_config_errors() {
        let source = serde_json::from_str::<u8>("x").unwrap_err();
        let err = Error::Serialize(source);
        assert!(err.to_string().starts_with("serialization failed"));
    }
}
