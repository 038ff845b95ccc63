//! Install-Location Guard
//!
//! macOS only lets an app replace itself from the applications folder. Before
//! any update command runs, the guard checks the bundle location and, when
//! allowed to prompt, offers to move it there.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::host::Host;
use crate::engine::platform::{self, Platform};

#[derive(Error, Debug)]
pub enum LocationError {
    #[error("Not running from an application bundle")]
    NoBundle,
    #[error("Failed to move application: {0}")]
    RelocationFailed(#[from] io::Error),
}

/// Where the running app lives, and how to move it
pub trait InstallLocation: Send + Sync {
    /// Whether this platform restricts self-update to a sanctioned directory
    fn is_restricted(&self) -> bool;

    fn is_in_sanctioned_dir(&self) -> bool;

    /// Move the app into the sanctioned directory and launch the moved copy
    fn relocate(&self) -> Result<PathBuf, LocationError>;
}

/// Guard decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Ready,
    NeedsInstall(String),
    /// Relocated copy launched; the current process must end
    Relaunch(String),
}

/// Check the install location, prompting and relocating when `prompt` allows.
pub async fn ensure_install_location(
    location: &dyn InstallLocation,
    host: &dyn Host,
    prompt: bool,
) -> GuardOutcome {
    if !location.is_restricted() || location.is_in_sanctioned_dir() {
        return GuardOutcome::Ready;
    }

    let needs_install = "Move OGforge to the Applications folder to enable automatic updates.";
    if !prompt {
        return GuardOutcome::NeedsInstall(needs_install.to_string());
    }

    if !host.confirm_relocation().await {
        tracing::info!("user declined moving the app to Applications");
        return GuardOutcome::NeedsInstall(needs_install.to_string());
    }

    match location.relocate() {
        Ok(path) => {
            tracing::info!(path = %path.display(), "app moved to Applications");
            GuardOutcome::Relaunch("Relaunching OGforge from the Applications folder.".to_string())
        }
        Err(e) => {
            tracing::warn!(error = %e, "moving the app to Applications failed");
            GuardOutcome::NeedsInstall(format!(
                "Could not move OGforge to the Applications folder ({}). Move it manually to enable updates.",
                e
            ))
        }
    }
}

/// Location of the running `.app` bundle
pub struct BundleLocation {
    bundle: Option<PathBuf>,
    applications_dir: PathBuf,
    restricted: bool,
}

impl BundleLocation {
    /// Detect the running bundle
    pub fn current() -> Self {
        Self {
            bundle: platform::macos::current_bundle(),
            applications_dir: PathBuf::from(platform::macos::APPLICATIONS_DIR),
            restricted: Platform::current().restricts_install_location(),
        }
    }

    /// Create with explicit paths (for testing)
    pub fn with_paths(bundle: Option<PathBuf>, applications_dir: PathBuf, restricted: bool) -> Self {
        Self {
            bundle,
            applications_dir,
            restricted,
        }
    }

    /// Move `bundle` to `dest` without touching an existing `dest` until the
    /// new copy is complete
    fn move_bundle(bundle: &Path, dest: &Path) -> io::Result<()> {
        let staged = platform::sibling(dest, "new");

        // Rename only works on the same volume; a bundle launched from a
        // mounted disk image needs a real copy.
        if fs::rename(bundle, &staged).is_err() {
            platform::install_dir_copy(bundle, dest, platform::macos::ditto)?;
            if let Err(e) = fs::remove_dir_all(bundle) {
                tracing::debug!(error = %e, "left original bundle in place");
            }
            return Ok(());
        }

        if let Err(e) = platform::replace_dir(&staged, dest) {
            if let Err(restore) = fs::rename(&staged, bundle) {
                tracing::error!(error = %restore, "could not move bundle back");
            }
            return Err(e);
        }
        Ok(())
    }
}

impl InstallLocation for BundleLocation {
    fn is_restricted(&self) -> bool {
        self.restricted
    }

    fn is_in_sanctioned_dir(&self) -> bool {
        self.bundle
            .as_deref()
            .and_then(Path::parent)
            .map(|parent| parent == self.applications_dir)
            .unwrap_or(false)
    }

    fn relocate(&self) -> Result<PathBuf, LocationError> {
        let bundle = self.bundle.as_deref().ok_or(LocationError::NoBundle)?;
        let name = bundle.file_name().ok_or(LocationError::NoBundle)?;
        let dest = self.applications_dir.join(name);

        Self::move_bundle(bundle, &dest)?;

        #[cfg(target_os = "macos")]
        platform::macos::open_bundle(&dest)?;

        Ok(dest)
    }
}
