//! Error types for VisLang Core
//!
//! Two kinds of failure live here:
//! - Run-level errors ([`PipelineError`]) that reach the caller. Only a few are
//!   fatal; everything else degrades to a partial result.
//! - Attempt-level failures ([`AttemptError`], [`GroundingError`]) that never
//!   escape a retry loop. They are recorded in transcripts and turned into
//!   corrective turns.

use vislang_oracle::{DecodeError, OracleError, RenderError};
use vislang_schema::DataFormatError;

/// Main pipeline error type
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Input data missing, unsupported or corrupt
    #[error("data format error: {0}")]
    DataFormat(#[from] DataFormatError),

    /// Judgment oracle unreadable after bounded retries
    #[error("judgment failed after {attempts} attempts: {last_error}")]
    Judgment {
        /// Attempts made
        attempts: usize,
        /// Last transport or decode failure
        last_error: String,
    },

    /// Configuration invalid or unreadable
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Production oracle could not be set up
    #[error("oracle setup failed: {0}")]
    Oracle(#[from] OracleError),

    /// A spawned generation path panicked or was cancelled
    #[error("generation task failed: {0}")]
    TaskJoin(String),
}

impl PipelineError {
    /// Check if the error aborts the run
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DataFormat(_) | Self::Judgment { .. } | Self::Config(_) | Self::TaskJoin(_)
        )
    }

    /// Check if rerunning the pipeline could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Judgment { .. } | Self::TaskJoin(_) => true,
            Self::Oracle(e) => e.is_transient(),
            Self::DataFormat(_) | Self::Config(_) => false,
        }
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for [`crate::PipelineConfig`]
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range
    #[error("invalid value for '{field}': {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}

/// Artifact persistence errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Artifact could not be serialized
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Artifact name escapes the run directory
    #[error("invalid artifact name: {0}")]
    InvalidName(String),
}

/// Field names referenced by the oracle that are not in the schema
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "The following field names are not in the schema: {invalid:?}. Valid field names are: {valid:?}. Please return corrected JSON using only exact field names from the schema."
)]
pub struct GroundingError {
    /// Names that failed grounding, in order of first reference
    pub invalid: Vec<String>,
    /// Schema field names, sorted
    pub valid: Vec<String>,
}

/// Why one generation attempt did not succeed
///
/// The `Display` text is embedded verbatim in the next corrective turn.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttemptError {
    /// Oracle could not be reached
    #[error("oracle call failed: {0}")]
    Transport(String),

    /// Response was not the expected structured object
    #[error("Your response was not valid structured output: {0}")]
    Parse(String),

    /// Specification failed a structural check
    #[error("{0}")]
    Validation(String),

    /// Renderer could not build a chart
    #[error("Chart construction failed: {0}")]
    Construction(String),

    /// Chart was built but could not be rasterized
    #[error("PNG rendering failed: {0}")]
    Export(String),
}

impl AttemptError {
    /// Short classification label
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Parse(_) => "parse",
            Self::Validation(_) => "validation",
            Self::Construction(_) => "construction",
            Self::Export(_) => "export",
        }
    }

    /// Whether the oracle produced something to correct
    #[inline]
    #[must_use]
    pub fn warrants_correction(&self) -> bool {
        !matches!(self, Self::Transport(_))
    }
}

impl From<OracleError> for AttemptError {
    fn from(err: OracleError) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<DecodeError> for AttemptError {
    fn from(err: DecodeError) -> Self {
        Self::Parse(err.to_string())
    }
}

impl From<RenderError> for AttemptError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Construction(msg) => Self::Construction(msg),
            RenderError::Export(msg) => Self::Export(msg),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
