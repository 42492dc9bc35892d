//! Observer contract between the session and the host application.

use std::sync::Arc;

use crate::error::{ErrorCode, UpdateError};
use crate::status::{StatusSnapshot, UpdateStatus};

/// Receives status changes and errors from an update session.
///
/// Both methods are invoked from the session's sequential context, one call
/// per event, in the order the events were processed.
pub trait UpdateObserver: Send + Sync {
    /// A flow could not be started. The attempt is abandoned.
    fn on_update_error(&self, code: ErrorCode, error: &UpdateError);

    /// The update status changed. `snapshot` holds the latest raw signals.
    fn on_status_update(&self, status: UpdateStatus, snapshot: &StatusSnapshot);
}

/// Shared observer handle held by a session.
pub type ObserverHandle = Arc<dyn UpdateObserver>;
