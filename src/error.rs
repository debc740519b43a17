//! Error types for Homepulse

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Homepulse
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Telemetry Errors
    // =========================================================================
    /// A host counter source is missing, unreadable or unparseable
    #[error("Failed to read {source_name}: {reason}")]
    ReadFailure { source_name: String, reason: String },

    // =========================================================================
    // Liveness Errors
    // =========================================================================
    /// The monitored target list could not be loaded
    #[error("Target store error: {0}")]
    TargetStore(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),

    // =========================================================================
    // General Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `ReadFailure` for the named counter source
    pub fn read_failure(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::ReadFailure {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error came from an unreadable counter source
    pub fn is_read_failure(&self) -> bool {
        matches!(self, Error::ReadFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_failure_display() {
        let err = Error::read_failure("/proc/stat", "missing aggregate cpu line");
        assert_eq!(
            err.to_string(),
            "Failed to read /proc/stat: missing aggregate cpu line"
        );
        assert!(err.is_read_failure());
    }
}
