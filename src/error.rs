//! Error types for template processing.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for template operations.
pub type Result<T> = std::result::Result<T, TemplateError>;

/// Errors raised while loading, mutating or saving a template package.
#[derive(Error, Debug)]
pub enum TemplateError {
    /// I/O error when reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The zip container could not be read or written.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// The input is not a zip-based document package.
    #[error("not a valid .docx package")]
    NotAPackage,

    /// The input exceeds the configured size limit.
    #[error("file of {size} bytes exceeds the limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    /// A part the package needs is missing.
    #[error("missing required part: {0}")]
    MissingPart(String),

    /// A part could not be parsed or serialized.
    #[error("malformed xml in {part}: {message}")]
    Xml { part: String, message: String },

    /// A section index does not exist.
    #[error("section {index} does not exist (document has {count} sections)")]
    SectionOutOfRange { index: usize, count: usize },

    /// The section exists but has no footer of its own.
    #[error("section {0} has no footer")]
    NoFooter(usize),

    /// A media key or index did not resolve.
    #[error("media not found: {0}")]
    MediaNotFound(String),

    /// Strict substitution found placeholders without data.
    #[error("placeholders without data: {}", .0.join(", "))]
    MissingData(Vec<String>),

    /// The data payload has an unusable shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The data payload is not valid JSON.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The replacement image type cannot be inferred.
    #[error("unsupported image type: {0}")]
    UnsupportedImage(String),

    /// The replacement image could not be read.
    #[error("cannot read image {path}: {source}")]
    ImageUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A text-only pass changed non-text structure.
    #[error("non-text structure changed in {0}")]
    StructureChanged(String),
}

impl TemplateError {
    pub(crate) fn xml(part: &str, err: anyhow::Error) -> Self {
        TemplateError::Xml {
            part: part.to_string(),
            message: format!("{err:#}"),
        }
    }
}
