//! Update session - drives one in-app update flow for a host.
//!
//! The session turns the asynchronous signals of an [`UpdateOracle`]
//! (availability results, install-state pushes) and of the host (flow
//! results, foreground/teardown lifecycle) into a single ordered stream of
//! [`SessionEvent`]s. Events are handled one at a time on whatever task owns
//! the session, so the session itself needs no locking and the observer is
//! always called from that one sequential context.
//!
//! Availability queries run as spawned Tokio tasks that post their result
//! back into the queue; install-state pushes are posted into the same queue
//! by the subscription listener. No operation blocks the caller.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{ConfirmationConfig, UpdateConfig};
use crate::error::UpdateError;
use crate::notification::{CompletionTrigger, ConfirmationBackend, ConfirmationPrompter};
use crate::observer::ObserverHandle;
use crate::oracle::{FlowOutcome, InstallStateListener, RequestCode, SubscriptionId, UpdateOracle};
use crate::status::{
    AppUpdateInfo, InstallState, InstallStatus, StatusSnapshot, UpdateAvailability, UpdateMode,
    UpdateStatus,
};

/// Where the session is in its update flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing requested yet
    #[default]
    Idle,
    /// Explicit availability check in flight
    Checking,
    /// Last check found no update
    NoUpdate,
    /// Update available but no flow started
    AwaitingUserStart,
    /// Flow started, no install state seen yet
    InProgress(UpdateMode),
    Downloading,
    /// Downloaded, waiting for the user to complete
    Downloaded,
    /// Finalization requested or installing
    Completing,
    /// Installed, or an immediate flow was accepted
    Done,
    Failed,
    Canceled,
    /// Host container destroyed
    TornDown,
}

impl SessionState {
    fn from_status(status: UpdateStatus) -> Option<Self> {
        match status {
            UpdateStatus::Downloading => Some(Self::Downloading),
            UpdateStatus::Downloaded => Some(Self::Downloaded),
            UpdateStatus::Failed => Some(Self::Failed),
            UpdateStatus::Canceled => Some(Self::Canceled),
            UpdateStatus::Unknown | UpdateStatus::UpdateNotAvailable => None,
        }
    }

    /// Whether install-state pushes have taken over from the check flow.
    fn is_installing(&self) -> bool {
        matches!(self, Self::Downloading | Self::Downloaded | Self::Completing)
    }

    /// States a fresh availability result may overwrite.
    fn is_settled(&self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Checking | Self::NoUpdate | Self::AwaitingUserStart
        )
    }
}

/// Why an availability query was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// Status-only check when the session attaches
    Initial,
    /// `check_for_app_update`: start a flow if one is available
    Explicit,
    /// Foreground resume: recover stalled updates
    Resume,
}

/// Unit of work processed by the session's sequential context.
#[derive(Debug)]
pub enum SessionEvent {
    CheckRequested,
    CompleteRequested,
    Foreground,
    Teardown,
    CheckCompleted {
        id: u64,
        result: Result<AppUpdateInfo, UpdateError>,
    },
    InstallStateChanged(InstallState),
    FlowResult {
        request_code: RequestCode,
        outcome: FlowOutcome,
    },
}

/// An availability query that has not answered yet.
#[derive(Debug, Clone, Copy)]
struct PendingCheck {
    kind: CheckKind,
    /// Mode captured when the check was requested
    mode: UpdateMode,
    /// State to fall back to if the query fails
    previous: SessionState,
}

/// Cloneable sender for delivering commands and host signals to a session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionHandle {
    fn send(&self, event: SessionEvent) -> Result<(), UpdateError> {
        self.tx.send(event).map_err(|_| UpdateError::TornDown)
    }

    pub fn check_for_app_update(&self) -> Result<(), UpdateError> {
        self.send(SessionEvent::CheckRequested)
    }

    pub fn complete_update(&self) -> Result<(), UpdateError> {
        self.send(SessionEvent::CompleteRequested)
    }

    pub fn on_foreground(&self) -> Result<(), UpdateError> {
        self.send(SessionEvent::Foreground)
    }

    pub fn on_teardown(&self) -> Result<(), UpdateError> {
        self.send(SessionEvent::Teardown)
    }

    /// Deliver the result of a flow the session started.
    pub fn deliver_flow_result(
        &self,
        request_code: RequestCode,
        outcome: FlowOutcome,
    ) -> Result<(), UpdateError> {
        self.send(SessionEvent::FlowResult {
            request_code,
            outcome,
        })
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// In-app update session bound to one host container.
///
/// # Example
///
/// ```ignore
/// use inapp_update::{UpdateConfig, UpdateMode, UpdateSession};
///
/// let config = UpdateConfig::builder().mode(UpdateMode::Immediate).build();
/// let mut session = UpdateSession::new(config, oracle).with_observer(observer);
/// session.attach();
///
/// let handle = session.handle();
/// tokio::spawn(session.run());
///
/// handle.check_for_app_update()?;
/// ```
///
/// Methods that query the oracle spawn Tokio tasks and must be called from
/// within a Tokio runtime.
pub struct UpdateSession {
    /// Configuration; last writer wins, in-flight checks keep their captured mode
    config: UpdateConfig,
    /// Platform update service
    oracle: Arc<dyn UpdateOracle>,
    /// Host observer, cleared on teardown
    observer: Option<ObserverHandle>,
    /// Built-in confirmation prompt
    prompter: ConfirmationPrompter,
    /// Latest raw signals
    snapshot: StatusSnapshot,
    state: SessionState,
    /// The single install-state subscription
    subscription: Option<SubscriptionId>,
    /// Availability queries awaiting an answer
    pending: HashMap<u64, PendingCheck>,
    /// Id of the explicit check in flight, if any
    explicit_in_flight: Option<u64>,
    next_check_id: u64,
    /// Mode of the flow most recently started
    active_mode: Option<UpdateMode>,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl UpdateSession {
    /// Create a detached session. Call [`attach`](Self::attach) once the host is ready.
    pub fn new(config: UpdateConfig, oracle: Arc<dyn UpdateOracle>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let prompter = ConfirmationPrompter::with_default_backend(config.confirmation.clone());

        Self {
            config,
            oracle,
            observer: None,
            prompter,
            snapshot: StatusSnapshot::default(),
            state: SessionState::Idle,
            subscription: None,
            pending: HashMap::new(),
            explicit_in_flight: None,
            next_check_id: 0,
            active_mode: None,
            events_tx,
            events_rx,
        }
    }

    /// Set the observer.
    pub fn with_observer(mut self, observer: ObserverHandle) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Use a host-provided presenter for the built-in confirmation prompt.
    pub fn with_confirmation_backend(mut self, backend: Box<dyn ConfirmationBackend>) -> Self {
        self.prompter.set_backend(backend);
        self
    }

    /// Subscribe to install-state pushes and run the initial status check.
    ///
    /// Calling this again only re-runs the status check.
    pub fn attach(&mut self) {
        if self.state == SessionState::TornDown {
            warn!("attach() on a torn-down update session ignored");
            return;
        }

        self.subscribe_install_state();

        if self.config.check_on_create {
            self.spawn_check(CheckKind::Initial);
        }
    }

    /// Handle for sending commands from other tasks.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            tx: self.events_tx.clone(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn snapshot(&self) -> &StatusSnapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Whether an explicit check is waiting for the oracle.
    pub fn is_checking(&self) -> bool {
        self.explicit_in_flight.is_some()
    }

    pub fn set_mode(&mut self, mode: UpdateMode) {
        self.config.mode = mode;
    }

    pub fn set_resume_updates(&mut self, resume_updates: bool) {
        self.config.resume_updates = resume_updates;
    }

    pub fn set_request_code(&mut self, request_code: RequestCode) {
        self.config.request_code = request_code;
    }

    /// Replace or clear the observer.
    pub fn set_observer(&mut self, observer: Option<ObserverHandle>) {
        self.observer = observer;
    }

    /// Delegate the downloaded-update prompt to the host.
    pub fn set_use_custom_notification(&mut self, custom: bool) {
        self.config.confirmation.enabled = !custom;
        self.prompter.set_config(self.config.confirmation.clone());
    }

    pub fn set_confirmation(&mut self, confirmation: ConfirmationConfig) {
        self.config.confirmation = confirmation.clone();
        self.prompter.set_config(confirmation);
    }

    /// Check for an update and start the configured flow if one is available.
    ///
    /// Returns immediately; the outcome reaches the observer. While an
    /// explicit check is in flight further calls are coalesced into it.
    pub fn check_for_app_update(&mut self) {
        if self.state == SessionState::TornDown {
            warn!("check_for_app_update() on a torn-down update session ignored");
            return;
        }

        if let Some(id) = self.explicit_in_flight {
            debug!("Update check {} already in flight, coalescing", id);
            return;
        }

        let id = self.spawn_check(CheckKind::Explicit);
        self.explicit_in_flight = Some(id);
        if !self.state.is_installing() {
            self.state = SessionState::Checking;
        }
    }

    /// Ask the oracle to finalize a downloaded flexible update.
    ///
    /// Not gated on the session state; calling it before a download
    /// finished is left to the oracle, whose error is returned as is.
    pub fn complete_update(&mut self) -> Result<(), UpdateError> {
        if self.state == SessionState::TornDown {
            warn!("complete_update() on a torn-down update session ignored");
            return Err(UpdateError::TornDown);
        }

        info!("Completing update");
        self.prompter.dismiss();
        match self.oracle.complete_update() {
            Ok(()) => {
                if self.state == SessionState::Downloaded {
                    self.state = SessionState::Completing;
                }
                Ok(())
            }
            Err(e) => {
                warn!("Update service failed to complete update: {}", e);
                Err(e)
            }
        }
    }

    /// Host returned to the foreground: look for stalled updates.
    pub fn on_foreground(&mut self) {
        if self.state == SessionState::TornDown {
            return;
        }

        if !self.config.resume_updates {
            debug!("Resume checks disabled");
            return;
        }

        self.spawn_check(CheckKind::Resume);
    }

    /// Host container destroyed. Safe to call any number of times.
    pub fn on_teardown(&mut self) {
        if let Some(id) = self.subscription.take() {
            debug!("Unsubscribing from install state ({:?})", id);
            self.oracle.unsubscribe(id);
        }

        if self.state != SessionState::TornDown {
            info!("Update session torn down");
            self.prompter.dismiss();
        }

        self.observer = None;
        self.pending.clear();
        self.explicit_in_flight = None;
        self.state = SessionState::TornDown;
    }

    /// Handle one event.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::CheckRequested => self.check_for_app_update(),
            SessionEvent::CompleteRequested => {
                // Already logged; queued requests have no caller to return to.
                let _ = self.complete_update();
            }
            SessionEvent::Foreground => self.on_foreground(),
            SessionEvent::Teardown => self.on_teardown(),
            SessionEvent::CheckCompleted { id, result } => self.on_check_completed(id, result),
            SessionEvent::InstallStateChanged(state) => self.on_install_state(state),
            SessionEvent::FlowResult {
                request_code,
                outcome,
            } => self.on_flow_result(request_code, outcome),
        }
    }

    /// Wait for the next event and handle it.
    ///
    /// Returns `false` if the queue is closed. The session holds a sender
    /// itself, so this waits until an event arrives.
    pub async fn process_next(&mut self) -> bool {
        match self.events_rx.recv().await {
            Some(event) => {
                self.handle_event(event);
                true
            }
            None => false,
        }
    }

    /// Handle every event already queued, without waiting.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Process events until the session is torn down.
    pub async fn run(mut self) {
        while self.state != SessionState::TornDown {
            if !self.process_next().await {
                break;
            }
        }
        debug!("Update session event loop finished");
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Register the install-state listener once.
    fn subscribe_install_state(&mut self) {
        if self.subscription.is_some() {
            debug!("Install state listener already registered");
            return;
        }

        let tx = self.events_tx.clone();
        let listener: InstallStateListener = Arc::new(move |state| {
            let _ = tx.send(SessionEvent::InstallStateChanged(state));
        });

        let id = self.oracle.subscribe(listener);
        debug!("Subscribed to install state ({:?})", id);
        self.subscription = Some(id);
    }

    /// Query the oracle on a spawned task; the answer comes back as an event.
    fn spawn_check(&mut self, kind: CheckKind) -> u64 {
        let id = self.next_check_id;
        self.next_check_id += 1;

        self.pending.insert(
            id,
            PendingCheck {
                kind,
                mode: self.config.mode,
                previous: self.state,
            },
        );
        debug!("Update check {} ({:?}) started", id, kind);

        let oracle = Arc::clone(&self.oracle);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = oracle.get_update_info().await;
            let _ = tx.send(SessionEvent::CheckCompleted { id, result });
        });

        id
    }

    fn on_check_completed(&mut self, id: u64, result: Result<AppUpdateInfo, UpdateError>) {
        let Some(check) = self.pending.remove(&id) else {
            debug!("Dropping result of unknown or abandoned update check {}", id);
            return;
        };
        if self.explicit_in_flight == Some(id) {
            self.explicit_in_flight = None;
        }

        let info = match result {
            Ok(info) => info,
            Err(e) => {
                // A failed query is not a status; the observer hears nothing.
                warn!("Update check {} ({:?}) failed: {}", id, check.kind, e);
                if check.kind == CheckKind::Explicit && self.state == SessionState::Checking {
                    self.state = check.previous;
                }
                return;
            }
        };

        debug!(
            "Update check {} ({:?}): availability {:?}, version {}",
            id, check.kind, info.availability, info.available_version_code
        );
        self.snapshot.set_app_update_info(info.clone());

        match check.kind {
            CheckKind::Initial => {
                self.settle_from_availability(&info);
                self.report_status(self.status_for_query(&info));
            }
            CheckKind::Explicit => self.on_explicit_check(&info, check),
            CheckKind::Resume => self.on_resume_check(&info),
        }
    }

    fn on_explicit_check(&mut self, info: &AppUpdateInfo, check: PendingCheck) {
        match info.availability {
            UpdateAvailability::Available => match info.resolve_mode(check.mode) {
                Some(mode) => {
                    info!(
                        "Update available: version {} ({} flow)",
                        info.available_version_code, mode
                    );
                    self.start_flow(info, mode);
                }
                None => {
                    warn!(
                        "Update {} available but no permitted update mode",
                        info.available_version_code
                    );
                    self.settle_from_availability(info);
                }
            },
            UpdateAvailability::NotAvailable => {
                info!("No update available");
                self.settle_from_availability(info);
            }
            other => {
                debug!("Nothing to start for availability {:?}", other);
                if self.state == SessionState::Checking {
                    self.state = check.previous;
                }
            }
        }

        self.report_status(self.status_for_query(info));
    }

    fn on_resume_check(&mut self, info: &AppUpdateInfo) {
        // Flexible: downloaded but not installed, ask the user again.
        if info.install_status == InstallStatus::Downloaded {
            info!("Resuming downloaded flexible update");
            if !self.snapshot.is_downloaded() {
                self.snapshot
                    .set_install_state(InstallState::new(InstallStatus::Downloaded));
            }
            self.state = SessionState::Downloaded;
            self.report_status(UpdateStatus::Downloaded);
            if self.active_mode.unwrap_or(UpdateMode::Flexible) == UpdateMode::Flexible {
                self.prompt_for_completion();
            }
        }

        // Immediate: an interrupted blocking flow is restarted without asking.
        if info.availability == UpdateAvailability::DeveloperTriggeredInProgress {
            info!("Resuming in-progress immediate update");
            self.start_flow(info, UpdateMode::Immediate);
        }
    }

    fn on_install_state(&mut self, state: InstallState) {
        if self.state == SessionState::TornDown {
            debug!("Install state after teardown dropped");
            return;
        }

        let raw = state.install_status;
        self.snapshot.set_install_state(state);

        match raw {
            InstallStatus::Installing => self.state = SessionState::Completing,
            InstallStatus::Installed => self.state = SessionState::Done,
            _ => {}
        }

        let Some(status) = UpdateStatus::from_install_status(raw) else {
            debug!("Install status {:?} not forwarded", raw);
            return;
        };

        if let Some(next) = SessionState::from_status(status) {
            self.state = next;
        }
        self.report_status(status);

        let mode = self.active_mode.unwrap_or(self.config.mode);
        if status == UpdateStatus::Downloaded && mode == UpdateMode::Flexible {
            self.prompt_for_completion();
        }
    }

    fn on_flow_result(&mut self, request_code: RequestCode, outcome: FlowOutcome) {
        if self.state == SessionState::TornDown {
            return;
        }
        if request_code != self.config.request_code {
            debug!("Ignoring flow result for request code {}", request_code);
            return;
        }

        match outcome {
            FlowOutcome::Accepted => {
                info!("Update flow accepted");
                if self.active_mode == Some(UpdateMode::Immediate) {
                    self.state = SessionState::Done;
                }
            }
            FlowOutcome::Canceled => {
                info!("Update flow canceled by user");
                self.state = SessionState::Canceled;
                self.report_status(UpdateStatus::Canceled);
            }
            FlowOutcome::Failed(reason) => {
                warn!("Update flow failed: {}", reason);
                self.state = SessionState::Failed;
                self.report_status(UpdateStatus::Failed);
            }
        }
    }

    /// Ask the oracle to start a flow; failures go to the error channel.
    fn start_flow(&mut self, info: &AppUpdateInfo, mode: UpdateMode) {
        match self
            .oracle
            .start_flow(info, mode, self.config.request_code)
        {
            Ok(()) => {
                info!(
                    "Started {} update flow (request code {})",
                    mode, self.config.request_code
                );
                self.active_mode = Some(mode);
                if !self.state.is_installing() {
                    // Install state of an earlier attempt no longer applies.
                    self.snapshot.clear_install_state();
                    self.state = SessionState::InProgress(mode);
                }
            }
            Err(source) => {
                error!("Failed to start {} update flow: {}", mode, source);
                if self.state == SessionState::Checking {
                    self.state = SessionState::Idle;
                }
                self.report_error(UpdateError::FlowStart { mode, source });
            }
        }
    }

    fn settle_from_availability(&mut self, info: &AppUpdateInfo) {
        if !self.state.is_settled() {
            return;
        }
        self.state = match info.availability {
            UpdateAvailability::NotAvailable => SessionState::NoUpdate,
            UpdateAvailability::Available => SessionState::AwaitingUserStart,
            _ => SessionState::Idle,
        };
    }

    /// Status to report after an availability query.
    fn status_for_query(&self, info: &AppUpdateInfo) -> UpdateStatus {
        if info.availability == UpdateAvailability::NotAvailable {
            UpdateStatus::UpdateNotAvailable
        } else {
            self.snapshot.status()
        }
    }

    fn completion_trigger(&self) -> CompletionTrigger {
        let tx = self.events_tx.clone();
        CompletionTrigger::new(move || {
            let _ = tx.send(SessionEvent::CompleteRequested);
        })
    }

    fn prompt_for_completion(&self) {
        self.prompter.present(self.completion_trigger());
    }

    fn report_status(&self, status: UpdateStatus) {
        debug!("Reporting update status {}", status);
        if let Some(observer) = &self.observer {
            observer.on_status_update(status, &self.snapshot);
        }
    }

    fn report_error(&self, error: UpdateError) {
        let Some(code) = error.code() else {
            warn!("Update error without observer code: {}", error);
            return;
        };
        if let Some(observer) = &self.observer {
            observer.on_update_error(code, &error);
        }
    }
}

impl fmt::Debug for UpdateSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateSession")
            .field("state", &self.state)
            .field("mode", &self.config.mode)
            .field("subscribed", &self.subscription.is_some())
            .field("pending_checks", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorCode, FlowStartError};
    use crate::harness::{
        FakeUpdateOracle, ObservedEvent, RecordingConfirmationBackend, RecordingObserver,
    };
    use crate::status::AllowedModes;

    fn quiet_config() -> UpdateConfig {
        UpdateConfig::builder().check_on_create(false).build()
    }

    fn session_with(
        config: UpdateConfig,
        info: AppUpdateInfo,
    ) -> (UpdateSession, Arc<FakeUpdateOracle>, Arc<RecordingObserver>) {
        let oracle = Arc::new(FakeUpdateOracle::new(info));
        let observer = Arc::new(RecordingObserver::new());
        let mut session = UpdateSession::new(config, oracle.clone()).with_observer(observer.clone());
        session.attach();
        (session, oracle, observer)
    }

    #[test]
    fn test_session_state_default() {
        assert_eq!(SessionState::default(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_attach_subscribes_once() {
        let (mut session, oracle, _) = session_with(quiet_config(), AppUpdateInfo::not_available());
        assert!(session.is_subscribed());

        session.attach();
        assert_eq!(oracle.subscribe_calls(), 1);
        assert_eq!(oracle.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_initial_check_reports_without_starting() {
        let info = AppUpdateInfo::available(3, AllowedModes::all());
        let (mut session, oracle, observer) = session_with(UpdateConfig::default(), info);

        assert!(session.process_next().await);
        assert_eq!(observer.statuses(), vec![UpdateStatus::Unknown]);
        assert!(oracle.started_flows().is_empty());
        assert_eq!(session.state(), SessionState::AwaitingUserStart);
        assert!(session.snapshot().is_update_available());
    }

    #[tokio::test]
    async fn test_no_update_available() {
        let (mut session, oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());

        session.check_for_app_update();
        assert_eq!(session.state(), SessionState::Checking);
        assert!(session.process_next().await);

        assert_eq!(observer.statuses(), vec![UpdateStatus::UpdateNotAvailable]);
        assert!(oracle.started_flows().is_empty());
        assert_eq!(session.state(), SessionState::NoUpdate);
    }

    #[tokio::test]
    async fn test_flexible_falls_back_to_immediate() {
        let info = AppUpdateInfo::available(9, AllowedModes::only(UpdateMode::Immediate));
        let (mut session, oracle, observer) = session_with(quiet_config(), info);

        session.check_for_app_update();
        session.process_next().await;

        assert_eq!(oracle.started_flows(), vec![(UpdateMode::Immediate, 64534)]);
        assert!(!observer.statuses().contains(&UpdateStatus::UpdateNotAvailable));
        assert_eq!(session.state(), SessionState::InProgress(UpdateMode::Immediate));
    }

    #[tokio::test]
    async fn test_flow_start_failure_reported_as_error() {
        let info = AppUpdateInfo::available(9, AllowedModes::all());
        let (mut session, oracle, observer) = session_with(quiet_config(), info);
        oracle.set_start_flow_error(Some(FlowStartError::HostUnavailable("gone".into())));

        session.check_for_app_update();
        session.process_next().await;

        assert_eq!(observer.errors(), vec![ErrorCode::StartFlexibleFailed]);
        assert_eq!(session.state(), SessionState::Idle);
        // No automatic retry
        assert_eq!(oracle.query_count(), 1);
    }

    #[tokio::test]
    async fn test_mode_captured_at_call_time() {
        let info = AppUpdateInfo::available(9, AllowedModes::all());
        let (mut session, oracle, _) = session_with(quiet_config(), info);

        session.check_for_app_update();
        session.set_mode(UpdateMode::Immediate);
        session.process_next().await;

        assert_eq!(oracle.started_flows(), vec![(UpdateMode::Flexible, 64534)]);
        assert_eq!(session.config().mode, UpdateMode::Immediate);
    }

    #[tokio::test]
    async fn test_explicit_checks_are_single_flight() {
        let info = AppUpdateInfo::available(9, AllowedModes::all());
        let (mut session, oracle, _) = session_with(quiet_config(), info);

        session.check_for_app_update();
        session.check_for_app_update();
        assert!(session.is_checking());
        session.process_next().await;

        assert_eq!(oracle.query_count(), 1);
        assert_eq!(oracle.started_flows().len(), 1);
        assert!(!session.is_checking());
    }

    #[tokio::test]
    async fn test_query_failure_reports_nothing() {
        let (mut session, oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());
        oracle.fail_next_query("offline");

        session.check_for_app_update();
        session.process_next().await;

        assert!(observer.events().is_empty());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_install_states_forwarded_in_order() {
        let (mut session, oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());

        for status in [
            InstallStatus::Pending,
            InstallStatus::Downloading,
            InstallStatus::Other(42),
            InstallStatus::Downloading,
            InstallStatus::Downloaded,
            InstallStatus::Installing,
        ] {
            oracle.push_install_state(InstallState::new(status));
        }
        assert_eq!(session.process_pending(), 6);

        assert_eq!(
            observer.statuses(),
            vec![
                UpdateStatus::Downloading,
                UpdateStatus::Downloading,
                UpdateStatus::Downloaded
            ]
        );
        assert_eq!(session.state(), SessionState::Completing);
    }

    #[tokio::test]
    async fn test_downloaded_push_prompts_dismiss_then_show() {
        let backend = RecordingConfirmationBackend::new();
        let oracle = Arc::new(FakeUpdateOracle::new(AppUpdateInfo::not_available()));
        let mut session = UpdateSession::new(quiet_config(), oracle.clone())
            .with_confirmation_backend(Box::new(backend.clone()));
        session.attach();

        oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
        oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
        session.process_pending();

        assert_eq!(backend.show_count(), 2);
        assert_eq!(backend.dismiss_count(), 1);
        assert_eq!(backend.max_visible(), 1);
    }

    #[tokio::test]
    async fn test_custom_notification_suppresses_prompt() {
        let backend = RecordingConfirmationBackend::new();
        let oracle = Arc::new(FakeUpdateOracle::new(AppUpdateInfo::not_available()));
        let observer = Arc::new(RecordingObserver::new());
        let mut session = UpdateSession::new(quiet_config(), oracle.clone())
            .with_observer(observer.clone())
            .with_confirmation_backend(Box::new(backend.clone()));
        session.set_use_custom_notification(true);
        session.attach();

        oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
        session.process_pending();

        assert_eq!(backend.show_count(), 0);
        assert_eq!(observer.statuses(), vec![UpdateStatus::Downloaded]);
    }

    #[tokio::test]
    async fn test_prompt_action_completes_update() {
        let backend = RecordingConfirmationBackend::new();
        let oracle = Arc::new(FakeUpdateOracle::new(AppUpdateInfo::not_available()));
        let mut session = UpdateSession::new(quiet_config(), oracle.clone())
            .with_confirmation_backend(Box::new(backend.clone()));
        session.attach();

        oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
        session.process_pending();
        assert!(backend.press_action());
        session.process_pending();

        assert_eq!(oracle.complete_calls(), 1);
        assert_eq!(session.state(), SessionState::Completing);
        assert!(!backend.is_shown());
    }

    #[tokio::test]
    async fn test_resume_restarts_immediate_flow() {
        let info = AppUpdateInfo {
            availability: UpdateAvailability::DeveloperTriggeredInProgress,
            ..AppUpdateInfo::available(5, AllowedModes::all())
        };
        let (mut session, oracle, _) = session_with(quiet_config(), info);

        session.on_foreground();
        session.process_next().await;
        assert_eq!(oracle.started_flows(), vec![(UpdateMode::Immediate, 64534)]);

        session.on_foreground();
        session.process_next().await;
        assert_eq!(oracle.started_flows().len(), 2);
    }

    #[tokio::test]
    async fn test_resume_disabled() {
        let config = UpdateConfig::builder()
            .check_on_create(false)
            .resume_updates(false)
            .build();
        let (mut session, oracle, _) = session_with(config, AppUpdateInfo::not_available());

        session.on_foreground();
        tokio::task::yield_now().await;
        assert_eq!(session.process_pending(), 0);
        assert_eq!(oracle.query_count(), 0);
    }

    #[tokio::test]
    async fn test_resume_downloaded_reprompts() {
        let backend = RecordingConfirmationBackend::new();
        let info = AppUpdateInfo {
            install_status: InstallStatus::Downloaded,
            ..AppUpdateInfo::available(5, AllowedModes::all())
        };
        let oracle = Arc::new(FakeUpdateOracle::new(info));
        let observer = Arc::new(RecordingObserver::new());
        let mut session = UpdateSession::new(quiet_config(), oracle.clone())
            .with_observer(observer.clone())
            .with_confirmation_backend(Box::new(backend.clone()));
        session.attach();

        session.on_foreground();
        session.process_next().await;
        session.on_foreground();
        session.process_next().await;

        assert_eq!(
            observer.statuses(),
            vec![UpdateStatus::Downloaded, UpdateStatus::Downloaded]
        );
        assert_eq!(backend.show_count(), 2);
        assert_eq!(backend.max_visible(), 1);
        assert_eq!(session.state(), SessionState::Downloaded);
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let (mut session, oracle, _) = session_with(quiet_config(), AppUpdateInfo::not_available());

        session.on_teardown();
        session.on_teardown();

        assert_eq!(oracle.unsubscribe_calls(), 1);
        assert_eq!(oracle.active_subscriptions(), 0);
        assert_eq!(session.state(), SessionState::TornDown);
    }

    #[tokio::test]
    async fn test_teardown_without_subscription() {
        let oracle = Arc::new(FakeUpdateOracle::new(AppUpdateInfo::not_available()));
        let mut session = UpdateSession::new(quiet_config(), oracle.clone());

        session.on_teardown();
        assert_eq!(oracle.unsubscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_results_after_teardown_are_dropped() {
        let (mut session, _oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());

        session.check_for_app_update();
        session.on_teardown();
        session.process_next().await;

        assert!(observer.events().is_empty());
        assert_eq!(session.state(), SessionState::TornDown);
    }

    #[tokio::test]
    async fn test_flow_results() {
        let (mut session, _oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());

        session.handle_event(SessionEvent::FlowResult {
            request_code: 1,
            outcome: FlowOutcome::Canceled,
        });
        assert!(observer.events().is_empty());

        session.handle_event(SessionEvent::FlowResult {
            request_code: 64534,
            outcome: FlowOutcome::Canceled,
        });
        session.handle_event(SessionEvent::FlowResult {
            request_code: 64534,
            outcome: FlowOutcome::Failed("no space".into()),
        });

        assert_eq!(
            observer.events(),
            vec![
                ObservedEvent::Status(UpdateStatus::Canceled),
                ObservedEvent::Status(UpdateStatus::Failed)
            ]
        );
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_handle_drives_session() {
        let (mut session, _oracle, observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());
        let handle = session.handle();

        handle.check_for_app_update().unwrap();
        session.process_next().await;
        session.process_next().await;

        assert_eq!(observer.statuses(), vec![UpdateStatus::UpdateNotAvailable]);
    }

    #[tokio::test]
    async fn test_new_flow_drops_stale_install_state() {
        let info = AppUpdateInfo::available(9, AllowedModes::all());
        let (mut session, oracle, observer) = session_with(quiet_config(), info);

        oracle.push_install_state(InstallState::new(InstallStatus::Failed));
        session.process_pending();
        assert_eq!(session.state(), SessionState::Failed);

        session.check_for_app_update();
        session.process_next().await;

        assert_eq!(
            observer.statuses(),
            vec![UpdateStatus::Failed, UpdateStatus::Unknown]
        );
        assert_eq!(oracle.started_flows(), vec![(UpdateMode::Flexible, 64534)]);
        assert_eq!(session.state(), SessionState::InProgress(UpdateMode::Flexible));
        assert!(session.snapshot().install_state().is_none());
    }

    #[tokio::test]
    async fn test_resume_keeps_downloaded_byte_counts() {
        let info = AppUpdateInfo {
            install_status: InstallStatus::Downloaded,
            ..AppUpdateInfo::available(5, AllowedModes::all())
        };
        let (mut session, oracle, _observer) = session_with(quiet_config(), info);

        oracle.push_install_state(InstallState {
            install_status: InstallStatus::Downloaded,
            bytes_downloaded: 2048,
            total_bytes_to_download: 2048,
            install_error_code: 0,
        });
        session.process_pending();

        session.on_foreground();
        session.process_next().await;

        let state = session.snapshot().install_state().unwrap();
        assert_eq!(state.bytes_downloaded, 2048);
        assert_eq!(session.snapshot().download_progress(), Some(1.0));
    }

    #[tokio::test]
    async fn test_complete_update_returns_service_error() {
        let (mut session, oracle, _observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());
        oracle.push_install_state(InstallState::new(InstallStatus::Downloaded));
        session.process_pending();

        oracle.set_complete_error(Some("install blocked".into()));
        let result = session.complete_update();
        assert!(matches!(result, Err(UpdateError::Complete(_))));
        assert_eq!(session.state(), SessionState::Downloaded);

        oracle.set_complete_error(None);
        session.complete_update().unwrap();
        assert_eq!(session.state(), SessionState::Completing);
        assert_eq!(oracle.complete_calls(), 2);
    }

    #[tokio::test]
    async fn test_complete_update_after_teardown() {
        let (mut session, oracle, _observer) =
            session_with(quiet_config(), AppUpdateInfo::not_available());

        session.on_teardown();
        assert!(matches!(session.complete_update(), Err(UpdateError::TornDown)));
        assert_eq!(oracle.complete_calls(), 0);
    }
}
