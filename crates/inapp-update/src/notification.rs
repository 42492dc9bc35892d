//! Confirmation prompt for downloaded flexible updates.
//!
//! Once a flexible update has been downloaded the user has to confirm a
//! restart before it is installed. The session asks a
//! [`ConfirmationPrompter`] to present that prompt; the prompter applies the
//! enabled flag and a dismiss-then-show policy so that at most one prompt is
//! visible at a time, then hands the content to a pluggable
//! [`ConfirmationBackend`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::ConfirmationConfig;
use crate::error::UpdateError;

/// Content of the confirmation prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationContent {
    /// Message shown to the user
    pub message: String,
    /// Label of the action that completes the update
    pub action: String,
    /// Action text color as 0xAARRGGBB
    pub action_color: Option<u32>,
}

impl ConfirmationContent {
    pub fn from_config(config: &ConfirmationConfig) -> Self {
        Self {
            message: config.message.clone(),
            action: config.action.clone(),
            action_color: config.action_color,
        }
    }
}

/// Callback a backend invokes when the user picks the prompt's action.
///
/// Triggering it asks the owning session to complete the update.
#[derive(Clone)]
pub struct CompletionTrigger(Arc<dyn Fn() + Send + Sync>);

impl CompletionTrigger {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn trigger(&self) {
        (self.0)()
    }
}

impl fmt::Debug for CompletionTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionTrigger")
    }
}

/// Host-side presenter for the confirmation prompt (banner, dialog, ...).
pub trait ConfirmationBackend: Send + Sync {
    /// Display the prompt. Picking the action must call `on_action`.
    fn show(
        &self,
        content: &ConfirmationContent,
        on_action: CompletionTrigger,
    ) -> Result<(), UpdateError>;

    /// Hide the prompt if it is visible.
    fn dismiss(&self);

    /// Whether the prompt is visible or queued for display.
    fn is_shown(&self) -> bool;
}

/// Applies the enabled flag and the dismiss-then-show policy.
pub struct ConfirmationPrompter {
    config: ConfirmationConfig,
    backend: Box<dyn ConfirmationBackend>,
}

impl ConfirmationPrompter {
    pub fn new(config: ConfirmationConfig, backend: Box<dyn ConfirmationBackend>) -> Self {
        Self { config, backend }
    }

    /// Create with the logging backend.
    pub fn with_default_backend(config: ConfirmationConfig) -> Self {
        Self::new(config, Box::new(LoggingConfirmationBackend::new()))
    }

    pub fn config(&self) -> &ConfirmationConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: ConfirmationConfig) {
        self.config = config;
    }

    pub fn set_backend(&mut self, backend: Box<dyn ConfirmationBackend>) {
        self.backend = backend;
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Present the prompt, replacing one that is already visible.
    ///
    /// Returns `true` if the backend was asked to show the prompt.
    pub fn present(&self, on_action: CompletionTrigger) -> bool {
        if !self.config.enabled {
            debug!("Built-in confirmation disabled; host handles DOWNLOADED");
            return false;
        }

        if self.backend.is_shown() {
            debug!("Confirmation already visible, dismissing before re-showing");
            self.backend.dismiss();
        }

        let content = ConfirmationContent::from_config(&self.config);
        match self.backend.show(&content, on_action) {
            Ok(()) => {
                info!("Showing update confirmation: {}", content.message);
                true
            }
            Err(e) => {
                warn!("Failed to show update confirmation: {}", e);
                false
            }
        }
    }

    /// Hide the prompt if visible.
    pub fn dismiss(&self) {
        if self.backend.is_shown() {
            self.backend.dismiss();
        }
    }
}

/// Backend that only logs. Used when the host supplies no presenter.
#[derive(Debug, Default)]
pub struct LoggingConfirmationBackend {
    shown: AtomicBool,
}

impl LoggingConfirmationBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfirmationBackend for LoggingConfirmationBackend {
    fn show(
        &self,
        content: &ConfirmationContent,
        _on_action: CompletionTrigger,
    ) -> Result<(), UpdateError> {
        info!("Update confirmation: {} [{}]", content.message, content.action);
        self.shown.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn dismiss(&self) {
        self.shown.store(false, Ordering::SeqCst);
    }

    fn is_shown(&self) -> bool {
        self.shown.load(Ordering::SeqCst)
    }
}
