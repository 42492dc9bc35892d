//! Test harness for update sessions.
//!
//! Scripted stand-ins for the update service, the observer and the
//! confirmation presenter. Used by the crate's own tests, the integration
//! tests and the demo binary.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ErrorCode, FlowStartError, UpdateError};
use crate::notification::{CompletionTrigger, ConfirmationBackend, ConfirmationContent};
use crate::observer::UpdateObserver;
use crate::oracle::{InstallStateListener, RequestCode, SubscriptionId, UpdateOracle};
use crate::status::{AppUpdateInfo, InstallState, StatusSnapshot, UpdateMode, UpdateStatus};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Default)]
struct FakeOracleState {
    info: Option<AppUpdateInfo>,
    queued: VecDeque<Result<AppUpdateInfo, String>>,
    query_delay: Option<Duration>,
    query_count: usize,
    start_flow_error: Option<FlowStartError>,
    started_flows: Vec<(UpdateMode, RequestCode)>,
    complete_error: Option<String>,
    complete_calls: usize,
    listeners: Vec<(SubscriptionId, InstallStateListener)>,
    next_subscription: u64,
    subscribe_calls: usize,
    unsubscribe_calls: usize,
}

/// Scripted update service.
///
/// Answers every query with the configured info unless a one-shot response
/// was queued, records flow starts and completions, and lets tests push
/// install states to subscribers.
#[derive(Default)]
pub struct FakeUpdateOracle {
    state: Mutex<FakeOracleState>,
}

impl FakeUpdateOracle {
    pub fn new(info: AppUpdateInfo) -> Self {
        let oracle = Self::default();
        lock(&oracle.state).info = Some(info);
        oracle
    }

    /// Replace the info returned by future queries.
    pub fn set_update_info(&self, info: AppUpdateInfo) {
        lock(&self.state).info = Some(info);
    }

    /// Answer the next query with `info`, then fall back to the configured info.
    pub fn queue_update_info(&self, info: AppUpdateInfo) {
        lock(&self.state).queued.push_back(Ok(info));
    }

    /// Fail the next query.
    pub fn fail_next_query(&self, reason: impl Into<String>) {
        lock(&self.state).queued.push_back(Err(reason.into()));
    }

    /// Delay every query answer.
    pub fn set_query_delay(&self, delay: Option<Duration>) {
        lock(&self.state).query_delay = delay;
    }

    /// Make `start_flow` fail until cleared.
    pub fn set_start_flow_error(&self, error: Option<FlowStartError>) {
        lock(&self.state).start_flow_error = error;
    }

    /// Make `complete_update` fail until cleared.
    pub fn set_complete_error(&self, reason: Option<String>) {
        lock(&self.state).complete_error = reason;
    }

    /// Deliver an install state to every subscriber, in subscription order.
    pub fn push_install_state(&self, state: InstallState) {
        let listeners: Vec<InstallStateListener> = lock(&self.state)
            .listeners
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(state.clone());
        }
    }

    pub fn query_count(&self) -> usize {
        lock(&self.state).query_count
    }

    pub fn started_flows(&self) -> Vec<(UpdateMode, RequestCode)> {
        lock(&self.state).started_flows.clone()
    }

    pub fn complete_calls(&self) -> usize {
        lock(&self.state).complete_calls
    }

    pub fn subscribe_calls(&self) -> usize {
        lock(&self.state).subscribe_calls
    }

    pub fn unsubscribe_calls(&self) -> usize {
        lock(&self.state).unsubscribe_calls
    }

    pub fn active_subscriptions(&self) -> usize {
        lock(&self.state).listeners.len()
    }
}

#[async_trait]
impl UpdateOracle for FakeUpdateOracle {
    async fn get_update_info(&self) -> Result<AppUpdateInfo, UpdateError> {
        let (delay, answer) = {
            let mut state = lock(&self.state);
            state.query_count += 1;
            let answer = match state.queued.pop_front() {
                Some(answer) => answer,
                None => state
                    .info
                    .clone()
                    .ok_or_else(|| "no update info configured".to_string()),
            };
            (state.query_delay, answer)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        answer.map_err(UpdateError::Query)
    }

    fn start_flow(
        &self,
        _info: &AppUpdateInfo,
        mode: UpdateMode,
        request_code: RequestCode,
    ) -> Result<(), FlowStartError> {
        let mut state = lock(&self.state);
        if let Some(error) = &state.start_flow_error {
            return Err(error.clone());
        }
        state.started_flows.push((mode, request_code));
        Ok(())
    }

    fn complete_update(&self) -> Result<(), UpdateError> {
        let mut state = lock(&self.state);
        state.complete_calls += 1;
        match &state.complete_error {
            Some(reason) => Err(UpdateError::Complete(reason.clone())),
            None => Ok(()),
        }
    }

    fn subscribe(&self, listener: InstallStateListener) -> SubscriptionId {
        let mut state = lock(&self.state);
        let id = SubscriptionId(state.next_subscription);
        state.next_subscription += 1;
        state.subscribe_calls += 1;
        state.listeners.push((id, listener));
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut state = lock(&self.state);
        state.unsubscribe_calls += 1;
        state.listeners.retain(|(existing, _)| *existing != id);
    }
}

/// One observer callback as seen by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedEvent {
    Status(UpdateStatus),
    Error(ErrorCode),
}

/// Observer that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ObservedEvent>>,
    last_snapshot: Mutex<Option<StatusSnapshot>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ObservedEvent> {
        lock(&self.events).clone()
    }

    pub fn statuses(&self) -> Vec<UpdateStatus> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Status(status) => Some(*status),
                ObservedEvent::Error(_) => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<ErrorCode> {
        lock(&self.events)
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Error(code) => Some(*code),
                ObservedEvent::Status(_) => None,
            })
            .collect()
    }

    /// Snapshot passed with the most recent status.
    pub fn last_snapshot(&self) -> Option<StatusSnapshot> {
        lock(&self.last_snapshot).clone()
    }
}

impl UpdateObserver for RecordingObserver {
    fn on_update_error(&self, code: ErrorCode, _error: &UpdateError) {
        lock(&self.events).push(ObservedEvent::Error(code));
    }

    fn on_status_update(&self, status: UpdateStatus, snapshot: &StatusSnapshot) {
        lock(&self.events).push(ObservedEvent::Status(status));
        *lock(&self.last_snapshot) = Some(snapshot.clone());
    }
}

#[derive(Default)]
struct PresenterState {
    shown: bool,
    show_count: usize,
    dismiss_count: usize,
    max_visible: usize,
    content: Option<ConfirmationContent>,
    trigger: Option<CompletionTrigger>,
}

/// Confirmation presenter that records what it was asked to do.
///
/// Clones share state, so a test can keep one clone and hand the other to
/// a session.
#[derive(Clone, Default)]
pub struct RecordingConfirmationBackend {
    state: Arc<Mutex<PresenterState>>,
}

impl RecordingConfirmationBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show_count(&self) -> usize {
        lock(&self.state).show_count
    }

    pub fn dismiss_count(&self) -> usize {
        lock(&self.state).dismiss_count
    }

    /// Largest number of prompts ever visible at once.
    pub fn max_visible(&self) -> usize {
        lock(&self.state).max_visible
    }

    pub fn last_content(&self) -> Option<ConfirmationContent> {
        lock(&self.state).content.clone()
    }

    /// Simulate the user picking the action. `false` if nothing was shown.
    pub fn press_action(&self) -> bool {
        let trigger = {
            let mut state = lock(&self.state);
            if !state.shown {
                return false;
            }
            state.shown = false;
            state.trigger.clone()
        };

        match trigger {
            Some(trigger) => {
                trigger.trigger();
                true
            }
            None => false,
        }
    }
}

impl ConfirmationBackend for RecordingConfirmationBackend {
    fn show(
        &self,
        content: &ConfirmationContent,
        on_action: CompletionTrigger,
    ) -> Result<(), UpdateError> {
        let mut state = lock(&self.state);
        let visible = if state.shown { 2 } else { 1 };
        state.max_visible = state.max_visible.max(visible);
        state.shown = true;
        state.show_count += 1;
        state.content = Some(content.clone());
        state.trigger = Some(on_action);
        Ok(())
    }

    fn dismiss(&self) {
        let mut state = lock(&self.state);
        state.shown = false;
        state.dismiss_count += 1;
    }

    fn is_shown(&self) -> bool {
        lock(&self.state).shown
    }
}
