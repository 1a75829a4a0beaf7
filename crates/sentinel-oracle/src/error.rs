//! Error types for sentinel-oracle

use std::time::Duration;

use thiserror::Error;

/// Result type for oracle calls
pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// Ways an analysis call can fail.
///
/// None of these reach a session's subscribers as errors: the monitor
/// substitutes a conservative judgment and marks the cycle degraded.
#[derive(Error, Debug)]
pub enum OracleError {
    /// The analysis service could not be reached or refused the request
    #[error("analysis unavailable: {0}")]
    Unavailable(String),

    /// The service answered, but the answer could not be turned into a judgment
    #[error("analysis response malformed: {0}")]
    Malformed(String),

    /// The call did not finish within its bound
    #[error("analysis timed out after {0:?}")]
    Timeout(Duration),
}

impl OracleError {
    /// Short machine-readable code, used in logs and degraded-status flags.
    pub fn code(&self) -> &'static str {
        match self {
            OracleError::Unavailable(_) => "analysis_unavailable",
            OracleError::Malformed(_) => "analysis_malformed",
            OracleError::Timeout(_) => "analysis_timeout",
        }
    }
}

impl From<reqwest::Error> for OracleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OracleError::Unavailable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            OracleError::Malformed(err.to_string())
        } else {
            OracleError::Unavailable(err.to_string())
        }
    }
}
