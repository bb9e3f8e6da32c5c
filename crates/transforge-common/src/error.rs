//! Typed failure taxonomy for transcode jobs.
//!
//! Every failure a caller can observe is one of the [`TranscodeError`]
//! variants. Each carries a short machine-readable [`ErrorKind`] and a
//! human-readable detail string. Engine internals never escape past the job
//! executor; they are folded into one of these variants first.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine-readable error kind, stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    EngineUnavailable,
    InvalidRequest,
    StagingWriteError,
    StagingReadError,
    TranscodeFailure,
    Cancelled,
    TimedOut,
}

impl ErrorKind {
    /// The snake_case identifier for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EngineUnavailable => "engine_unavailable",
            Self::InvalidRequest => "invalid_request",
            Self::StagingWriteError => "staging_write_error",
            Self::StagingReadError => "staging_read_error",
            Self::TranscodeFailure => "transcode_failure",
            Self::Cancelled => "cancelled",
            Self::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure outcome of a transcode job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TranscodeError {
    /// The engine never initialized. Sticky until re-initialization is
    /// requested.
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The request was malformed and was rejected before touching the engine.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Writing into the engine's namespace failed.
    #[error("Staging write failed [{path}]: {message}")]
    StagingWrite {
        /// Virtual path that could not be written.
        path: String,
        /// Human-readable error description.
        message: String,
    },

    /// Reading from the engine's namespace failed.
    #[error("Staging read failed [{path}]: {message}")]
    StagingRead {
        /// Virtual path that could not be read.
        path: String,
        /// Human-readable error description.
        message: String,
    },

    /// The engine ran but reported failure or produced no usable output.
    /// The diagnostic is the engine's text, verbatim.
    #[error("Transcode failed: {diagnostic}")]
    TranscodeFailure {
        /// Engine diagnostic text.
        diagnostic: String,
    },

    /// The caller withdrew the request.
    #[error("Job cancelled")]
    Cancelled,

    /// The host-level watchdog elapsed before the job finished.
    #[error("Job timed out after {secs:.1}s")]
    TimedOut {
        /// Watchdog budget in seconds.
        secs: f64,
    },
}

impl TranscodeError {
    /// Machine-readable kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EngineUnavailable(_) => ErrorKind::EngineUnavailable,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Self::StagingWrite { .. } => ErrorKind::StagingWriteError,
            Self::StagingRead { .. } => ErrorKind::StagingReadError,
            Self::TranscodeFailure { .. } => ErrorKind::TranscodeFailure,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::TimedOut { .. } => ErrorKind::TimedOut,
        }
    }

    /// Human-readable detail, without the kind prefix.
    pub fn detail(&self) -> String {
        match self {
            Self::EngineUnavailable(msg) | Self::InvalidRequest(msg) => msg.clone(),
            Self::StagingWrite { path, message } | Self::StagingRead { path, message } => {
                format!("{path}: {message}")
            }
            Self::TranscodeFailure { diagnostic } => diagnostic.clone(),
            Self::Cancelled => "request was withdrawn".to_string(),
            Self::TimedOut { secs } => format!("no result within {secs:.1}s"),
        }
    }

    /// Whether resubmitting the same request could succeed.
    ///
    /// Engine failures are deterministic for a given input and are never
    /// retried automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StagingWrite { .. } | Self::Cancelled | Self::TimedOut { .. }
        )
    }

    /// Convenience constructor for [`TranscodeError::EngineUnavailable`].
    pub fn engine_unavailable(msg: impl Into<String>) -> Self {
        Self::EngineUnavailable(msg.into())
    }

    /// Convenience constructor for [`TranscodeError::InvalidRequest`].
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Convenience constructor for [`TranscodeError::StagingWrite`].
    pub fn staging_write(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StagingWrite {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`TranscodeError::StagingRead`].
    pub fn staging_read(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StagingRead {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`TranscodeError::TranscodeFailure`].
    pub fn transcode_failure(diagnostic: impl Into<String>) -> Self {
        Self::TranscodeFailure {
            diagnostic: diagnostic.into(),
        }
    }

    /// Convenience constructor for [`TranscodeError::TimedOut`].
    pub fn timed_out(budget: std::time::Duration) -> Self {
        Self::TimedOut {
            secs: budget.as_secs_f64(),
        }
    }
}

/// Result type alias using [`TranscodeError`].
pub type Result<T> = std::result::Result<T, TranscodeError>;
