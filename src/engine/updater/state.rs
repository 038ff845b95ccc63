//! Update Status Types
//!
//! The status stream and command results shared between the controller and the host UI.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result of a manifest check, carried by most statuses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    pub current_version: String,
    pub latest_version: String,
    pub update_available: bool,
    /// Resolved artifact URL for this platform
    pub download_url: Option<String>,
    pub notes: Option<String>,
    pub required: bool,
    /// Source the manifest was fetched from
    pub manifest_url: String,
    pub checked_at: DateTime<Utc>,
}

/// Current status of the update process
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Manifest check in flight
    Checking,
    /// A newer version is published
    Available { info: UpdateInfo },
    /// Already on the latest version
    #[serde(rename = "none")]
    UpToDate { info: UpdateInfo },
    /// Downloading the artifact
    Downloading {
        percent: f64,
        transferred: u64,
        total: u64,
    },
    /// Artifact on disk, ready to install
    Downloaded { info: UpdateInfo, file: PathBuf },
    Error { message: String },
    /// The app must be moved before it can update itself
    NeedsInstall { message: String },
    /// The process is about to be replaced
    Relaunch { message: String },
}

impl UpdateStatus {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Short tag as it appears on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Self::Checking => "checking",
            Self::Available { .. } => "available",
            Self::UpToDate { .. } => "none",
            Self::Downloading { .. } => "downloading",
            Self::Downloaded { .. } => "downloaded",
            Self::Error { .. } => "error",
            Self::NeedsInstall { .. } => "needs_install",
            Self::Relaunch { .. } => "relaunch",
        }
    }
}

/// Why a command did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    NotPackaged,
    Disabled,
    NeedsInstall,
    CheckFailed,
    DownloadFailed,
    InstallFailed,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotPackaged => "not_packaged",
            Self::Disabled => "disabled",
            Self::NeedsInstall => "needs_install",
            Self::CheckFailed => "check_failed",
            Self::DownloadFailed => "download_failed",
            Self::InstallFailed => "install_failed",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a controller command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Ok,
    Rejected(RejectReason),
    /// The process was handed off (relaunch or installer). Nothing after
    /// this point in the calling flow should run.
    Terminal,
}

impl CommandOutcome {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Rejected(_))
    }

    pub fn reason(&self) -> Option<RejectReason> {
        match self {
            Self::Rejected(reason) => Some(*reason),
            _ => None,
        }
    }

    pub fn response(&self) -> CommandResponse {
        CommandResponse {
            ok: self.is_ok(),
            reason: self.reason(),
        }
    }
}

/// `{ok, reason?}` as returned over the UI bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
}

/// Per-command options from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOptions {
    /// Whether the install-location guard may interrupt the user
    #[serde(default = "default_prompt")]
    pub prompt: bool,
}

fn default_prompt() -> bool {
    true
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            prompt: default_prompt(),
        }
    }
}

impl CommandOptions {
    /// Options for background work that must not show dialogs
    pub fn silent() -> Self {
        Self { prompt: false }
    }
}
