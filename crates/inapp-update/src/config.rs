//! Configuration structures for the update session.
//!
//! Defines the session configuration and the built-in confirmation prompt
//! text. Configuration can be built in code or loaded from a TOML file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::oracle::{RequestCode, DEFAULT_REQUEST_CODE};
use crate::status::UpdateMode;

/// Main session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Request code correlating a started flow with its result
    #[serde(default = "default_request_code")]
    pub request_code: RequestCode,

    /// Requested update mode
    #[serde(default)]
    pub mode: UpdateMode,

    /// Re-check for stalled updates whenever the host returns to the foreground
    #[serde(default = "default_true")]
    pub resume_updates: bool,

    /// Run a status-only availability check when the session attaches
    #[serde(default = "default_true")]
    pub check_on_create: bool,

    /// Built-in confirmation prompt for downloaded flexible updates
    #[serde(default)]
    pub confirmation: ConfirmationConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            request_code: DEFAULT_REQUEST_CODE,
            mode: UpdateMode::default(),
            resume_updates: true,
            check_on_create: true,
            confirmation: ConfirmationConfig::default(),
        }
    }
}

impl UpdateConfig {
    /// Start building a configuration from defaults.
    pub fn builder() -> UpdateConfigBuilder {
        UpdateConfigBuilder::default()
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self =
            toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Text and styling of the built-in "update downloaded" prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationConfig {
    /// Show the built-in prompt. When false the host reacts to
    /// `DOWNLOADED` itself and calls `complete_update`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_message")]
    pub message: String,

    #[serde(default = "default_action")]
    pub action: String,

    /// Action text color as 0xAARRGGBB; host default when unset
    #[serde(default)]
    pub action_color: Option<u32>,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            message: default_message(),
            action: default_action(),
            action_color: None,
        }
    }
}

/// Chainable builder for [`UpdateConfig`].
#[derive(Debug, Clone, Default)]
pub struct UpdateConfigBuilder {
    config: UpdateConfig,
}

impl UpdateConfigBuilder {
    pub fn request_code(mut self, request_code: RequestCode) -> Self {
        self.config.request_code = request_code;
        self
    }

    pub fn mode(mut self, mode: UpdateMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn resume_updates(mut self, resume_updates: bool) -> Self {
        self.config.resume_updates = resume_updates;
        self
    }

    pub fn check_on_create(mut self, check_on_create: bool) -> Self {
        self.config.check_on_create = check_on_create;
        self
    }

    /// Delegate the downloaded-update prompt to the host.
    pub fn use_custom_notification(mut self, custom: bool) -> Self {
        self.config.confirmation.enabled = !custom;
        self
    }

    pub fn confirmation_message(mut self, message: impl Into<String>) -> Self {
        self.config.confirmation.message = message.into();
        self
    }

    pub fn confirmation_action(mut self, action: impl Into<String>) -> Self {
        self.config.confirmation.action = action.into();
        self
    }

    pub fn confirmation_action_color(mut self, color: u32) -> Self {
        self.config.confirmation.action_color = Some(color);
        self
    }

    pub fn build(self) -> UpdateConfig {
        self.config
    }
}

// Default value functions for serde
fn default_request_code() -> RequestCode {
    DEFAULT_REQUEST_CODE
}

fn default_true() -> bool {
    true
}

fn default_message() -> String {
    "An update has just been downloaded.".to_string()
}

fn default_action() -> String {
    "RESTART".to_string()
}
