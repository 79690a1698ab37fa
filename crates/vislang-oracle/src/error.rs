//! Error types for oracle boundaries
//!
//! - Oracle invocation failures (transport, status, malformed envelopes)
//! - Structured-output decoding failures
//! - Renderer construction / export failures

/// Failure invoking an external oracle
#[derive(Debug, Clone, thiserror::Error)]
pub enum OracleError {
    /// Network or connection failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status
    #[error("oracle returned status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response envelope did not have the expected shape
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Call exceeded the configured timeout
    #[error("oracle call timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed
        secs: u64,
    },

    /// Subprocess oracle failed
    #[error("oracle process failed: {0}")]
    Process(String),
}

impl OracleError {
    /// Whether a repeated call could plausibly succeed
    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::InvalidResponse(_) | Self::Process(_) => false,
        }
    }
}

/// Oracle text could not be decoded into the expected structure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Text does not begin with a JSON value
    #[error("no JSON value found: {0}")]
    Syntax(String),

    /// JSON value has the wrong shape
    #[error("unexpected structure: {0}")]
    Shape(String),
}

/// Failure building or rasterizing a chart
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    /// Chart object could not be built from the specification
    #[error("{0}")]
    Construction(String),

    /// Chart was built but could not be exported to an image
    #[error("{0}")]
    Export(String),
}

impl RenderError {
    /// Whether the chart object itself was usable
    #[inline]
    #[must_use]
    pub fn chart_constructed(&self) -> bool {
        matches!(self, Self::Export(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(OracleError::Transport("reset".into()).is_transient());
        assert!(OracleError::Timeout { secs: 5 }.is_transient());
        assert!(OracleError::Status { status: 503, body: String::new() }.is_transient());
        assert!(OracleError::Status { status: 429, body: String::new() }.is_transient());
        assert!(!OracleError::Status { status: 401, body: String::new() }.is_transient());
        assert!(!OracleError::InvalidResponse("x".into()).is_transient());
    }

    #[test]
    fn render_error_messages_are_literal() {
        let err = RenderError::Construction("unknown mark 'pie'".into());
        assert_eq!(err.to_string(), "unknown mark 'pie'");
        assert!(!err.chart_constructed());
        assert!(RenderError::Export("no rasterizer".into()).chart_constructed());
    }
}
