//! # inapp-update
//!
//! In-app update session for hosts backed by a platform update service.
//!
//! This crate handles:
//! - Availability checks and starting flexible or immediate update flows
//! - Falling back to an immediate flow when flexible is not permitted
//! - Forwarding install-state changes to a host observer, in order
//! - A confirmation prompt for downloaded flexible updates
//! - Recovering stalled updates when the host returns to the foreground
//!
//! The platform service sits behind the [`UpdateOracle`] trait; the host
//! receives outcomes through an [`UpdateObserver`].

pub mod config;
pub mod error;
pub mod harness;
pub mod notification;
pub mod observer;
pub mod oracle;
#[cfg(test)]
mod proptests;
pub mod session;
pub mod status;

// Re-export main types for convenience
pub use config::{ConfirmationConfig, UpdateConfig, UpdateConfigBuilder};
pub use error::{ErrorCode, FlowStartError, UpdateError};
pub use notification::{
    CompletionTrigger, ConfirmationBackend, ConfirmationContent, ConfirmationPrompter,
    LoggingConfirmationBackend,
};
pub use observer::{ObserverHandle, UpdateObserver};
pub use oracle::{
    FlowOutcome, InstallStateListener, RequestCode, SubscriptionId, UpdateOracle,
    DEFAULT_REQUEST_CODE,
};
pub use session::{CheckKind, SessionEvent, SessionHandle, SessionState, UpdateSession};
pub use status::{
    AllowedModes, AppUpdateInfo, InstallState, InstallStatus, StatusSnapshot, UpdateAvailability,
    UpdateMode, UpdateStatus, NO_UPDATE,
};
