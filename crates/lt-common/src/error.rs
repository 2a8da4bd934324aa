//! Error types for Location Tracer.
//!
//! Two failure families exist in this library:
//! - Invalid-state errors: a session or alarm lifecycle call made out of
//!   order. Always a caller programming error; surfaced immediately and
//!   never recovered automatically.
//! - Capability errors: an underlying observation/timer capability is
//!   absent or cannot satisfy a request. Propagated at call time, no retry.
//!
//! Reporting failures are deliberately not represented here: the reporting
//! capability owns its own retry policy, and unacknowledged samples simply
//! stay buffered for the next flush.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for Location Tracer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for grouping and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Session or alarm lifecycle violations.
    InvalidState,
    /// Underlying platform capability absent or unusable.
    Capability,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCategory::InvalidState => write!(f, "invalid_state"),
            ErrorCategory::Capability => write!(f, "capability"),
        }
    }
}

/// Unified error type for Location Tracer.
#[derive(Error, Debug)]
pub enum Error {
    // Listening session lifecycle (invalid state)
    #[error("cannot start listening when listening is already in progress")]
    ListeningInProgress,

    #[error("cannot stop listening when listening is not in progress")]
    ListeningNotInProgress,

    // Reporting session lifecycle (invalid state)
    #[error("cannot start reporting when reporting is already in progress")]
    ReportingInProgress,

    #[error("cannot stop reporting when reporting is not in progress")]
    ReportingNotInProgress,

    // Alarm lifecycle (invalid state)
    #[error("cannot start an alarm that is already started")]
    AlarmAlreadyStarted,

    #[error("cannot stop an alarm that is not started")]
    AlarmNotStarted,

    // Capability errors
    #[error("capability unavailable: {capability}: {detail}")]
    CapabilityUnavailable { capability: String, detail: String },

    #[error("no usable observation provider: {0}")]
    NoProvider(String),
}

impl Error {
    /// Returns the error category for grouping and filtering.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::ListeningInProgress
            | Error::ListeningNotInProgress
            | Error::ReportingInProgress
            | Error::ReportingNotInProgress
            | Error::AlarmAlreadyStarted
            | Error::AlarmNotStarted => ErrorCategory::InvalidState,

            Error::CapabilityUnavailable { .. } | Error::NoProvider(_) => ErrorCategory::Capability,
        }
    }

    /// Returns whether this error is potentially recoverable.
    ///
    /// Invalid-state errors are bugs in the calling code and are never
    /// recoverable by retrying. Capability errors may resolve once the
    /// platform capability is installed or configured.
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::InvalidState => false,
            ErrorCategory::Capability => true,
        }
    }

    /// Convenience constructor for capability failures.
    pub fn capability_unavailable(
        capability: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Error::CapabilityUnavailable {
            capability: capability.into(),
            detail: detail.into(),
        }
    }
}
