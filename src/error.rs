//! Error types for the harvest pipeline.
//!
//! Two layers are kept apart:
//! - [`TransportError`]: what a single HTTP attempt produced.
//! - [`HarvestError`]: what a caller of the pipeline sees once the retry
//!   policy has run its course.
//!
//! Only [`HarvestError::Auth`] aborts a run. Every other fetch failure is
//! scoped to the source that produced it.

use thiserror::Error;

/// Failure of one HTTP attempt, before any retry decision.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The relay answered with a non-2xx status.
    #[error("HTTP status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// The request did not complete within the per-request timeout.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TLS, reset, ...).
    #[error("network error: {0}")]
    Network(String),

    /// The body was not valid JSON.
    #[error("invalid JSON body: {0}")]
    Decode(String),
}

impl TransportError {
    /// Status code when the credential is no longer accepted (401 or 403).
    pub fn auth_status(&self) -> Option<u16> {
        match self {
            TransportError::Status {
                status: status @ (401 | 403),
            } => Some(*status),
            _ => None,
        }
    }

    /// Server errors and timeouts are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Status { status } => *status >= 500,
            TransportError::Timeout => true,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if let Some(status) = e.status() {
            TransportError::Status {
                status: status.as_u16(),
            }
        } else if e.is_decode() {
            TransportError::Decode(e.to_string())
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

/// Errors surfaced by the harvest pipeline.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Credential rejected by the relay. Fatal for the whole run.
    #[error("authentication rejected (HTTP {status}); refresh the credential and rerun")]
    Auth {
        /// 401 or 403
        status: u16,
    },

    /// Transient failures outlasted the retry budget.
    #[error("request failed after {attempts} attempts: {last}")]
    RetryExhausted {
        /// Total attempts made
        attempts: usize,
        /// Failure of the final attempt
        #[source]
        last: TransportError,
    },

    /// A non-auth client error persisted across the retry budget.
    #[error("HTTP error {status} after {attempts} attempts")]
    Http {
        /// HTTP status code of the final attempt
        status: u16,
        /// Total attempts made
        attempts: usize,
    },

    /// Required credential absent from the environment.
    #[error("environment variable {var} is not set; export the relay credential before running")]
    MissingCredential {
        /// Name of the variable the credential is read from
        var: &'static str,
    },

    /// Downstream push failed. Logged, never fatal.
    #[error("downstream push failed: {0}")]
    Downstream(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl HarvestError {
    /// True when the run must stop immediately.
    pub fn is_auth(&self) -> bool {
        matches!(self, HarvestError::Auth { .. })
    }
}
