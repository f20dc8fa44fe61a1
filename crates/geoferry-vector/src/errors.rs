use std::fmt;

use thiserror::Error;

#[derive(Debug, Clone)]
pub struct ReaderAttempt {
    pub reader: &'static str,
    pub message: String,
}

impl ReaderAttempt {
    pub fn new(reader: &'static str, message: impl Into<String>) -> Self {
        Self {
            reader,
            message: message.into(),
        }
    }
}

impl fmt::Display for ReaderAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reader, self.message)
    }
}

#[derive(Debug, Error)]
pub enum VectorError {
    #[error("{reader} format mismatch: {reason}")]
    FormatMismatch {
        reader: &'static str,
        reason: String,
    },

    #[error("{reader} data row {row_index} invalid: {message}")]
    DataRow {
        reader: &'static str,
        row_index: usize,
        message: String,
    },

    #[error("{reader} CSV error: {source}")]
    Csv {
        reader: &'static str,
        #[source]
        source: csv::Error,
    },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("unsupported coordinate reference system '{0}'")]
    UnsupportedCrs(String),

    #[error("coordinate out of bounds after reprojection: lon {lon}, lat {lat}")]
    OutOfBounds { lon: f64, lat: f64 },

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive contained no vector entries")]
    EmptyArchive,

    #[error("no reader recognized this file; attempts: {attempts:?}")]
    NoMatchingReader { attempts: Vec<ReaderAttempt> },
}
