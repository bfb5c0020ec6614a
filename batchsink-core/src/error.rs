use std::fmt::Display;

use thiserror::Error;

use crate::classify::{ClassifiedFailure, FailureKind, ServiceError};

pub type Result<T> = std::result::Result<T, Error>;

const FAIL_FAST_MESSAGE: &str =
    "Encountered an exception while persisting records, not retrying due to fail_on_error being set";

/// Whether the condition behind a [Error::Sink] can be cured by submitting again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retryability {
    Retryable,
    NotRetryable,
}

impl Display for Retryability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Retryability::Retryable => write!(f, "retryable"),
            Retryability::NotRetryable => write!(f, "not retryable"),
        }
    }
}

impl From<FailureKind> for Retryability {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Fatal => Retryability::NotRetryable,
            FailureKind::Retryable => Retryability::Retryable,
        }
    }
}

/// Failures surfaced by the writer.
///
/// [Error::Sink] and [Error::FailFast] together form the sink failure taxonomy, fail-fast being
/// the narrower of the two: it is only raised when the writer runs with `fail_on_error` and it
/// leaves the writer unusable. Both chain the service error through [std::error::Error::source].
#[derive(Error, Debug)]
pub enum Error {
    #[error("Sink failure ({retryable}) - {message}")]
    Sink {
        message: String,
        retryable: Retryability,
        #[source]
        source: Option<ServiceError>,
    },

    #[error("Fail-fast sink failure (not retryable) - {message}")]
    FailFast {
        message: String,
        #[source]
        source: Option<ServiceError>,
    },

    #[error("Writer is closed, no new batches can be submitted")]
    Closed,

    #[error("Record of {size} bytes exceeds the maximum record size of {limit} bytes")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Sink failure built from a classified service failure.
    pub fn sink(failure: ClassifiedFailure) -> Self {
        Error::Sink {
            message: failure.message,
            retryable: failure.kind.into(),
            source: Some(failure.cause),
        }
    }

    /// Fail-fast failure wrapping whatever went wrong, fatal or not.
    pub fn fail_fast(failure: ClassifiedFailure) -> Self {
        Error::FailFast {
            message: format!("{FAIL_FAST_MESSAGE}: {}", failure.message),
            source: Some(failure.cause),
        }
    }

    /// Fail-fast failure for entries the service rejected individually.
    pub fn fail_fast_rejected(rejected: usize) -> Self {
        Error::FailFast {
            message: format!("{FAIL_FAST_MESSAGE}: {rejected} entries were rejected by the service"),
            source: None,
        }
    }

    /// True for both sink failures and fail-fast failures.
    pub fn is_sink_failure(&self) -> bool {
        matches!(self, Error::Sink { .. } | Error::FailFast { .. })
    }

    pub fn is_fail_fast(&self) -> bool {
        matches!(self, Error::FailFast { .. })
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Sink {
                retryable: Retryability::Retryable,
                ..
            }
        )
    }
}

impl From<String> for Error {
    fn from(value: String) -> Self {
        Error::Other(value)
    }
}
