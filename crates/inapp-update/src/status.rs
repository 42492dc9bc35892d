//! Update status model.
//!
//! Translates the raw signals an update service hands us (availability code,
//! install status code, version code) into the public [`UpdateStatus`] and a
//! handful of predicates. Everything here is pure and tolerates missing
//! information: an unknown install state yields `false` or
//! [`UpdateStatus::Unknown`], never an error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Version code reported when no update information is known.
pub const NO_UPDATE: i32 = 0;

/// How an available update is applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Background download; the user confirms a restart to install.
    #[default]
    Flexible,
    /// Blocking full-screen flow owned by the update service.
    Immediate,
}

impl fmt::Display for UpdateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flexible => write!(f, "flexible"),
            Self::Immediate => write!(f, "immediate"),
        }
    }
}

/// Outcome reported to the session observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UpdateStatus {
    Unknown,
    Downloading,
    Downloaded,
    Failed,
    Canceled,
    UpdateNotAvailable,
}

impl UpdateStatus {
    /// Every variant, in id order.
    pub const ALL: [UpdateStatus; 6] = [
        Self::Unknown,
        Self::UpdateNotAvailable,
        Self::Downloading,
        Self::Failed,
        Self::Canceled,
        Self::Downloaded,
    ];

    /// Stable numeric identifier.
    pub const fn id(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UpdateNotAvailable => 1,
            Self::Downloading => 2,
            Self::Failed => 5,
            Self::Canceled => 6,
            Self::Downloaded => 11,
        }
    }

    /// Reverse lookup. Unrecognized identifiers map to [`UpdateStatus::Unknown`].
    pub fn from_id(id: i32) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|status| status.id() == id)
            .unwrap_or(Self::Unknown)
    }

    /// Map an install status to the status forwarded to observers.
    ///
    /// Only downloading, downloaded, failed and canceled are meaningful to
    /// the host; every other install status yields `None` and is dropped.
    pub fn from_install_status(status: InstallStatus) -> Option<Self> {
        match status {
            InstallStatus::Downloading => Some(Self::Downloading),
            InstallStatus::Downloaded => Some(Self::Downloaded),
            InstallStatus::Failed => Some(Self::Failed),
            InstallStatus::Canceled => Some(Self::Canceled),
            _ => None,
        }
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::UpdateNotAvailable => "UPDATE_NOT_AVAILABLE",
        };
        f.write_str(name)
    }
}

/// Raw install status pushed by the update service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallStatus {
    Unknown,
    Pending,
    Downloading,
    Installing,
    Installed,
    Failed,
    Canceled,
    Downloaded,
    /// A code this crate does not know about.
    Other(i32),
}

impl InstallStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Unknown,
            1 => Self::Pending,
            2 => Self::Downloading,
            3 => Self::Installing,
            4 => Self::Installed,
            5 => Self::Failed,
            6 => Self::Canceled,
            11 => Self::Downloaded,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::Pending => 1,
            Self::Downloading => 2,
            Self::Installing => 3,
            Self::Installed => 4,
            Self::Failed => 5,
            Self::Canceled => 6,
            Self::Downloaded => 11,
            Self::Other(code) => code,
        }
    }
}

/// Raw availability reported by an availability query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum UpdateAvailability {
    #[default]
    Unknown,
    NotAvailable,
    Available,
    /// A developer-triggered (immediate) flow was started and never finished.
    DeveloperTriggeredInProgress,
}

impl UpdateAvailability {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::NotAvailable,
            2 => Self::Available,
            3 => Self::DeveloperTriggeredInProgress,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::NotAvailable => 1,
            Self::Available => 2,
            Self::DeveloperTriggeredInProgress => 3,
        }
    }
}

/// Update modes the platform permits for a particular update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AllowedModes {
    pub flexible: bool,
    pub immediate: bool,
}

impl AllowedModes {
    pub const fn all() -> Self {
        Self {
            flexible: true,
            immediate: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            flexible: false,
            immediate: false,
        }
    }

    pub const fn only(mode: UpdateMode) -> Self {
        match mode {
            UpdateMode::Flexible => Self {
                flexible: true,
                immediate: false,
            },
            UpdateMode::Immediate => Self {
                flexible: false,
                immediate: true,
            },
        }
    }

    pub fn contains(&self, mode: UpdateMode) -> bool {
        match mode {
            UpdateMode::Flexible => self.flexible,
            UpdateMode::Immediate => self.immediate,
        }
    }
}

/// Result of an availability query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppUpdateInfo {
    /// Whether an update is available, absent, or already in progress
    pub availability: UpdateAvailability,
    /// Version code of the available update
    pub available_version_code: i32,
    /// Modes the platform allows for this update
    pub allowed_modes: AllowedModes,
    /// Install status persisted by the update service
    pub install_status: InstallStatus,
}

impl AppUpdateInfo {
    /// Info describing "no update available".
    pub fn not_available() -> Self {
        Self {
            availability: UpdateAvailability::NotAvailable,
            available_version_code: NO_UPDATE,
            allowed_modes: AllowedModes::none(),
            install_status: InstallStatus::Unknown,
        }
    }

    /// Info describing an available update at `version_code`.
    pub fn available(version_code: i32, allowed_modes: AllowedModes) -> Self {
        Self {
            availability: UpdateAvailability::Available,
            available_version_code: version_code,
            allowed_modes,
            install_status: InstallStatus::Unknown,
        }
    }

    pub fn is_update_type_allowed(&self, mode: UpdateMode) -> bool {
        self.allowed_modes.contains(mode)
    }

    /// Pick the mode to start for `requested`, falling back to immediate
    /// when flexible is not permitted. `None` if neither is allowed.
    pub fn resolve_mode(&self, requested: UpdateMode) -> Option<UpdateMode> {
        if requested == UpdateMode::Flexible && self.is_update_type_allowed(UpdateMode::Flexible) {
            Some(UpdateMode::Flexible)
        } else if self.is_update_type_allowed(UpdateMode::Immediate) {
            Some(UpdateMode::Immediate)
        } else {
            None
        }
    }
}

/// Install-state push from the update service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallState {
    pub install_status: InstallStatus,
    pub bytes_downloaded: u64,
    pub total_bytes_to_download: u64,
    /// Platform error code, 0 when there is none
    pub install_error_code: i32,
}

impl InstallState {
    pub fn new(install_status: InstallStatus) -> Self {
        Self {
            install_status,
            bytes_downloaded: 0,
            total_bytes_to_download: 0,
            install_error_code: 0,
        }
    }

    pub fn downloading(bytes_downloaded: u64, total_bytes_to_download: u64) -> Self {
        Self {
            install_status: InstallStatus::Downloading,
            bytes_downloaded,
            total_bytes_to_download,
            install_error_code: 0,
        }
    }
}

/// Latest known availability and install information.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSnapshot {
    app_update_info: Option<AppUpdateInfo>,
    install_state: Option<InstallState>,
}

impl StatusSnapshot {
    pub fn set_app_update_info(&mut self, info: AppUpdateInfo) {
        self.app_update_info = Some(info);
    }

    pub fn set_install_state(&mut self, state: InstallState) {
        self.install_state = Some(state);
    }

    /// Forget the install state, e.g. when a new flow starts.
    pub fn clear_install_state(&mut self) {
        self.install_state = None;
    }

    pub fn app_update_info(&self) -> Option<&AppUpdateInfo> {
        self.app_update_info.as_ref()
    }

    pub fn install_state(&self) -> Option<&InstallState> {
        self.install_state.as_ref()
    }

    fn install_status(&self) -> Option<InstallStatus> {
        self.install_state.as_ref().map(|s| s.install_status)
    }

    pub fn is_downloading(&self) -> bool {
        self.install_status() == Some(InstallStatus::Downloading)
    }

    pub fn is_downloaded(&self) -> bool {
        self.install_status() == Some(InstallStatus::Downloaded)
    }

    pub fn is_failed(&self) -> bool {
        self.install_status() == Some(InstallStatus::Failed)
    }

    pub fn is_update_available(&self) -> bool {
        self.app_update_info
            .as_ref()
            .map(|info| info.availability == UpdateAvailability::Available)
            .unwrap_or(false)
    }

    /// Available version code, or [`NO_UPDATE`] if nothing is known.
    pub fn available_version_code(&self) -> i32 {
        self.app_update_info
            .as_ref()
            .map(|info| info.available_version_code)
            .unwrap_or(NO_UPDATE)
    }

    /// Download progress in `0.0..=1.0`, if the last push carried sizes.
    pub fn download_progress(&self) -> Option<f64> {
        let state = self.install_state.as_ref()?;
        if state.total_bytes_to_download == 0 {
            return None;
        }
        let fraction = state.bytes_downloaded as f64 / state.total_bytes_to_download as f64;
        Some(fraction.min(1.0))
    }

    /// Current status derived from the latest signals.
    ///
    /// A meaningful install state wins; otherwise the persisted install
    /// status from the last availability query, then availability itself.
    pub fn status(&self) -> UpdateStatus {
        if let Some(status) = self.install_status().and_then(UpdateStatus::from_install_status) {
            return status;
        }
        match &self.app_update_info {
            Some(info) => UpdateStatus::from_install_status(info.install_status).unwrap_or(
                if info.availability == UpdateAvailability::NotAvailable {
                    UpdateStatus::UpdateNotAvailable
                } else {
                    UpdateStatus::Unknown
                },
            ),
            None => UpdateStatus::Unknown,
        }
    }
}
