//! Error types for dataset loading
//!
//! Every failure here is fatal to a pipeline run: without a parsed dataset
//! there is no schema to ground field selections against.

use std::path::PathBuf;

/// Dataset could not be located, read or parsed
#[derive(Debug, thiserror::Error)]
pub enum DataFormatError {
    /// No candidate path exists
    #[error("data file not found: {path} (searched {searched:?})")]
    NotFound {
        /// Path as given by the caller
        path: String,
        /// Every candidate that was tried
        searched: Vec<PathBuf>,
    },

    /// Extension is not one of csv / tsv / json
    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    /// File exists but its contents are not tabular
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Offending file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Dataset has no columns
    #[error("dataset has no columns")]
    Empty,

    /// Underlying I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataFormatError {
    /// Create a parse error for a path
    #[inline]
    pub fn parse(path: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Result alias for schema operations
pub type Result<T> = std::result::Result<T, DataFormatError>;
