//! Error types for the update session.

use thiserror::Error;

use crate::status::UpdateMode;

/// Errors that can occur during update operations.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The platform refused, or could not be asked, to start an update flow
    #[error("failed to start {mode} update flow: {source}")]
    FlowStart {
        mode: UpdateMode,
        #[source]
        source: FlowStartError,
    },

    /// Availability query against the update service failed
    #[error("update availability query failed: {0}")]
    Query(String),

    /// Finalizing a downloaded flexible update failed
    #[error("failed to complete update: {0}")]
    Complete(String),

    /// The session was torn down and no longer accepts work
    #[error("update session has been torn down")]
    TornDown,

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error returned by an update service when a flow cannot be started.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FlowStartError {
    /// The host cannot display the platform's confirmation UI
    #[error("host cannot display the update UI: {0}")]
    HostUnavailable(String),

    /// The update info is stale or the mode is not allowed any more
    #[error("update type not allowed: {0}")]
    NotAllowed(String),

    /// Any other platform failure
    #[error("platform error: {0}")]
    Platform(String),
}

/// Stable numeric codes reported through the observer's error channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Starting a flexible flow failed
    StartFlexibleFailed,
    /// Starting an immediate flow failed
    StartImmediateFailed,
}

impl ErrorCode {
    /// Numeric identifier for interop with host code.
    pub const fn id(self) -> i32 {
        match self {
            Self::StartFlexibleFailed => 100,
            Self::StartImmediateFailed => 101,
        }
    }

    /// Look up a code by its numeric identifier.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            100 => Some(Self::StartFlexibleFailed),
            101 => Some(Self::StartImmediateFailed),
            _ => None,
        }
    }

    /// Error code for a failed flow start in the given mode.
    pub const fn from_mode(mode: UpdateMode) -> Self {
        match mode {
            UpdateMode::Flexible => Self::StartFlexibleFailed,
            UpdateMode::Immediate => Self::StartImmediateFailed,
        }
    }
}

impl UpdateError {
    /// Observer error code for this error, if it is reported via the error channel.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::FlowStart { mode, .. } => Some(ErrorCode::from_mode(*mode)),
            _ => None,
        }
    }
}
