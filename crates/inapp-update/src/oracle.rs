//! Interface to the platform update service.
//!
//! The service is opaque to the session: it answers availability queries
//! asynchronously, starts platform-owned update flows, finalizes flexible
//! updates, and pushes install-state changes to subscribed listeners.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{FlowStartError, UpdateError};
use crate::status::{AppUpdateInfo, InstallState, UpdateMode};

/// Correlation token matching a started flow to its result callback.
pub type RequestCode = i32;

/// Request code used when none is configured.
pub const DEFAULT_REQUEST_CODE: RequestCode = 64534;

/// Listener invoked for every install-state push, in emission order.
pub type InstallStateListener = Arc<dyn Fn(InstallState) + Send + Sync>;

/// Handle returned by [`UpdateOracle::subscribe`], used to cancel the subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Outcome of a previously started flow, delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// The user accepted the update
    Accepted,
    /// The user declined or backed out of the flow
    Canceled,
    /// The flow failed for a platform reason
    Failed(String),
}

/// Platform update service.
///
/// Implementations own whatever host binding they need to present the
/// platform UI (activity, window, ...); the session only supplies the
/// update info, mode and request code.
#[async_trait]
pub trait UpdateOracle: Send + Sync {
    /// Query update availability.
    async fn get_update_info(&self) -> Result<AppUpdateInfo, UpdateError>;

    /// Start the platform-owned update flow for `info` in `mode`.
    fn start_flow(
        &self,
        info: &AppUpdateInfo,
        mode: UpdateMode,
        request_code: RequestCode,
    ) -> Result<(), FlowStartError>;

    /// Finalize a downloaded flexible update (usually restarts the app).
    fn complete_update(&self) -> Result<(), UpdateError>;

    /// Register for install-state pushes.
    fn subscribe(&self, listener: InstallStateListener) -> SubscriptionId;

    /// Cancel a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
