//! Platform Detection and Support Module
//!
//! macOS, Linux, and Windows platform integration for the updater

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Supported platforms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

impl Platform {
    /// Detect current platform
    pub fn current() -> Self {
        #[cfg(target_os = "macos")]
        return Platform::MacOS;

        #[cfg(target_os = "linux")]
        return Platform::Linux;

        #[cfg(target_os = "windows")]
        return Platform::Windows;

        #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
        return Platform::Unknown;
    }

    /// Check if this is macOS
    pub fn is_macos(&self) -> bool {
        matches!(self, Platform::MacOS)
    }

    /// Check if this is Linux
    pub fn is_linux(&self) -> bool {
        matches!(self, Platform::Linux)
    }

    /// Check if this is Windows
    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Whether self-update requires the app to live in a sanctioned directory
    pub fn restricts_install_location(&self) -> bool {
        self.is_macos()
    }

    /// Get platform-specific cache directory for downloaded updates
    pub fn update_cache_dir(&self, app_name: &str) -> Option<PathBuf> {
        match self {
            Platform::MacOS | Platform::Windows => {
                dirs::cache_dir().map(|d| d.join(app_name).join("updates"))
            }
            Platform::Linux => {
                dirs::cache_dir().map(|d| d.join(app_name.to_lowercase()).join("updates"))
            }
            Platform::Unknown => None,
        }
    }
}

/// Manifest key for an OS identifier.
///
/// Accepts both Rust (`windows`, `macos`) and Node-style (`win32`, `darwin`)
/// names; anything else is passed through unchanged.
pub fn platform_key(os: &str) -> String {
    match os {
        "windows" | "win32" => "win".to_string(),
        "macos" | "darwin" => "mac".to_string(),
        other => other.to_string(),
    }
}

/// Open an URL with the desktop's default handler
pub fn open_external(url: &str) -> io::Result<()> {
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = Command::new("open");
        c.arg(url);
        c
    };

    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]).arg(url);
        c
    };

    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let mut command = {
        let mut c = Command::new("xdg-open");
        c.arg(url);
        c
    };

    command.spawn().map(|_| ())
}

/// `path` with `suffix` appended to its file name (`OGforge.app` -> `OGforge.app.new`)
pub fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Move the fully prepared directory `staged` to `dest`.
///
/// An existing `dest` is set aside first and only deleted once `staged` is in
/// place; if the final rename fails it is put back.
pub fn replace_dir(staged: &Path, dest: &Path) -> io::Result<()> {
    let backup = sibling(dest, "old");
    remove_dir_if_exists(&backup)?;

    let had_existing = dest.exists();
    if had_existing {
        fs::rename(dest, &backup)?;
    }

    if let Err(e) = fs::rename(staged, dest) {
        if had_existing {
            if let Err(restore) = fs::rename(&backup, dest) {
                tracing::error!(error = %restore, backup = %backup.display(), "could not restore previous copy");
            }
        }
        return Err(e);
    }

    if had_existing {
        if let Err(e) = fs::remove_dir_all(&backup) {
            tracing::debug!(error = %e, "left previous copy behind");
        }
    }
    Ok(())
}

/// Stage a copy of `src` next to `dest`, then swap it in with [`replace_dir`]
pub fn install_dir_copy(
    src: &Path,
    dest: &Path,
    copy: impl FnOnce(&Path, &Path) -> io::Result<()>,
) -> io::Result<()> {
    let staged = sibling(dest, "new");
    remove_dir_if_exists(&staged)?;

    if let Err(e) = copy(src, &staged).and_then(|()| replace_dir(&staged, dest)) {
        if let Err(cleanup) = remove_dir_if_exists(&staged) {
            tracing::debug!(error = %cleanup, "left staged copy behind");
        }
        return Err(e);
    }
    Ok(())
}

/// Run a command to completion, mapping a non-zero exit to an error
pub(crate) fn run_checked(command: &mut Command) -> io::Result<()> {
    let output = command.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!(
                "{:?} exited with {}: {}",
                command.get_program(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

/// macOS-specific utilities
pub mod macos {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use super::run_checked;

    /// System-wide applications folder
    pub const APPLICATIONS_DIR: &str = "/Applications";

    /// The `.app` bundle enclosing `exe`, if any
    pub fn bundle_for(exe: &Path) -> Option<PathBuf> {
        exe.ancestors()
            .find(|p| p.extension().map(|ext| ext == "app").unwrap_or(false))
            .map(Path::to_path_buf)
    }

    /// The `.app` bundle of the running executable
    pub fn current_bundle() -> Option<PathBuf> {
        std::env::current_exe().ok().and_then(|exe| bundle_for(&exe))
    }

    /// Copy a bundle preserving signatures, resource forks and symlinks
    pub fn ditto(src: &Path, dest: &Path) -> io::Result<()> {
        run_checked(Command::new("ditto").arg(src).arg(dest))
    }

    /// Launch a new instance of a bundle
    pub fn open_bundle(bundle: &Path) -> io::Result<()> {
        Command::new("open").arg("-n").arg(bundle).spawn().map(|_| ())
    }

    /// Mount a disk image read-only at `mount_point`
    pub fn attach_dmg(image: &Path, mount_point: &Path) -> io::Result<()> {
        run_checked(
            Command::new("hdiutil")
                .args(["attach", "-nobrowse", "-readonly", "-noautoopen", "-mountpoint"])
                .arg(mount_point)
                .arg(image),
        )
    }

    pub fn detach_dmg(mount_point: &Path) -> io::Result<()> {
        run_checked(Command::new("hdiutil").args(["detach", "-quiet"]).arg(mount_point))
    }

    /// Extract a zip archive the way Finder does
    pub fn unzip(archive: &Path, dest: &Path) -> io::Result<()> {
        run_checked(Command::new("ditto").args(["-x", "-k"]).arg(archive).arg(dest))
    }
}

/// Linux-specific utilities
pub mod linux {
    /// Get AppImage path if running from one
    pub fn appimage_path() -> Option<std::path::PathBuf> {
        std::env::var_os("APPIMAGE").map(std::path::PathBuf::from)
    }
}
