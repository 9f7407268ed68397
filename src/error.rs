//! Error type shared by the parsing, document and configuration layers.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid fraction: {0}")]
    InvalidFraction(String),

    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("unsupported root element '{0}', only 'score-partwise' is supported")]
    UnsupportedRoot(String),

    #[error("failed to open MXL archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("MXL container: {0}")]
    Container(String),

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported file extension '{0}' (expected musicxml, xml or mxl)")]
    UnsupportedFormat(String),

    #[error("invalid config: {0}")]
    Config(#[source] serde_json::Error),

    #[error("serialization failed: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("document invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, Error>;
