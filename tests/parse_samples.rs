//! Integration tests for the file-level entry points: format detection,
//! MXL archives and error reporting.

use std::ffi::{CStr, CString};
use std::io::{Cursor, Write};

use pretty_assertions::assert_eq;
use scorelayout::{
    parse_bytes, parse_file, parse_mxl, render_bytes_to_svg, scorelayout_free_string, scorelayout_render_bytes, Config,
    Error,
};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

const DUET: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<score-partwise version="3.1">
  <work><work-title>Little Duet</work-title></work>
  <identification><creator type="composer">Anon.</creator></identification>
  <part-list>
    <score-part id="P1"><part-name>Flute</part-name></score-part>
    <score-part id="P2"><part-name>Cello</part-name></score-part>
  </part-list>
  <part id="P1">
    <measure number="1">
      <attributes><divisions>1</divisions><key><fifths>1</fifths></key><time><beats>2</beats><beat-type>4</beat-type></time><clef><sign>G</sign><line>2</line></clef></attributes>
      <note><pitch><step>G</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
      <note><pitch><step>A</step><octave>4</octave></pitch><duration>1</duration><type>quarter</type></note>
    </measure>
  </part>
  <part id="P2">
    <measure number="1">
      <attributes><divisions>1</divisions><key><fifths>1</fifths></key><time><beats>2</beats><beat-type>4</beat-type></time><clef><sign>F</sign><line>4</line></clef></attributes>
      <note><pitch><step>G</step><octave>2</octave></pitch><duration>2</duration><type>half</type></note>
    </measure>
  </part>
</score-partwise>"#;

fn archive(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(content.as_bytes()).expect("write entry");
    }
    writer.finish().expect("finish archive").into_inner()
}

const CONTAINER: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container><rootfiles><rootfile full-path="score/duet.musicxml"/></rootfiles></container>"#;

#[test]
fn plain_musicxml_is_detected_without_a_hint() {
    let score = parse_bytes(DUET.as_bytes(), None).expect("parses");
    assert_eq!(score.title.as_deref(), Some("Little Duet"));
    assert_eq!(score.version.as_deref(), Some("3.1"));
    let names: Vec<&str> = score.parts.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Flute", "Cello"]);
}

#[test]
fn extension_hint_is_case_insensitive() {
    let score = parse_bytes(DUET.as_bytes(), Some("MusicXML")).expect("parses");
    assert_eq!(score.parts.len(), 2);
}

#[test]
fn mxl_root_comes_from_the_container() {
    let data = archive(&[
        ("META-INF/container.xml", CONTAINER),
        ("decoy.xml", "<not-a-score/>"),
        ("score/duet.musicxml", DUET),
    ]);
    let score = parse_mxl(&data).expect("parses");
    assert_eq!(score.title.as_deref(), Some("Little Duet"));

    let detected = parse_bytes(&data, None).expect("zip data falls back to MXL");
    assert_eq!(detected.parts.len(), 2);
}

#[test]
fn mxl_without_container_uses_first_score_file() {
    let data = archive(&[("duet.xml", DUET)]);
    let score = parse_bytes(&data, Some("mxl")).expect("parses");
    assert_eq!(score.parts[1].name, "Cello");
}

#[test]
fn mxl_without_any_score_is_rejected() {
    let data = archive(&[("readme.txt", "nothing here")]);
    assert!(matches!(parse_mxl(&data), Err(Error::Container(_))));
}

#[test]
fn unknown_extension_is_rejected() {
    let err = parse_bytes(DUET.as_bytes(), Some("mid")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(ext) if ext == "mid"));
}

#[test]
fn missing_file_reports_its_path() {
    let err = parse_file("/definitely/not/here.musicxml").unwrap_err();
    match err {
        Error::Io { path, .. } => assert!(path.ends_with("here.musicxml")),
        other => panic!("expected an io error, got {other:?}"),
    }
}

#[test]
fn partwise_root_is_required() {
    let err = parse_bytes(b"<score-timewise version=\"3.1\"/>", Some("xml")).unwrap_err();
    assert!(matches!(err, Error::UnsupportedRoot(root) if root == "score-timewise"));
}

#[test]
fn bytes_render_to_svg() {
    let svg = render_bytes_to_svg(DUET.as_bytes(), Some("musicxml"), Some(600.0), &Config::default()).expect("renders");
    assert!(svg.starts_with("<svg"));
    assert!(svg.trim_end().ends_with("</svg>"));
    assert!(svg.contains("Little Duet"));
    assert!(svg.contains("Flute"));
}

#[test]
fn c_entry_point_returns_svg_or_null() {
    let extension = CString::new("musicxml").expect("c string");
    let ptr = unsafe { scorelayout_render_bytes(DUET.as_ptr(), DUET.len(), extension.as_ptr(), 600.0) };
    assert!(!ptr.is_null());
    let svg = unsafe { CStr::from_ptr(ptr) }.to_str().expect("utf-8").to_string();
    unsafe { scorelayout_free_string(ptr) };
    assert!(svg.starts_with("<svg"));

    let garbage = b"not a score";
    let ptr = unsafe { scorelayout_render_bytes(garbage.as_ptr(), garbage.len(), std::ptr::null(), 0.0) };
    assert!(ptr.is_null());
    assert!(unsafe { scorelayout_render_bytes(std::ptr::null(), 0, std::ptr::null(), 0.0) }.is_null());
}
