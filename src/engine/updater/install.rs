//! Platform Installer
//!
//! Hands a downloaded artifact to the OS and launches the new version.
//!
//! - Windows: runs the NSIS installer silently; it relaunches the app itself.
//! - macOS: mounts the `.dmg` (or unpacks the `.zip`), replaces the bundle in
//!   `/Applications` and opens it.
//! - Linux: replaces the running AppImage in place, or opens any other
//!   package type with the desktop's handler.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

use crate::engine::platform::{self, Platform};

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Update file not found: {0}")]
    MissingArtifact(PathBuf),
    #[error("No application bundle inside {0}")]
    NoBundle(PathBuf),
    #[error("Unsupported update package: {0}")]
    Unsupported(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub trait Installer: Send + Sync {
    /// Install `artifact` and start the new version.
    ///
    /// Returns once the new version has been launched; the caller is then
    /// expected to end the current process.
    fn install(&self, artifact: &Path) -> Result<(), InstallError>;
}

/// Installer for the platform the binary was built for
pub struct SystemInstaller {
    platform: Platform,
    applications_dir: PathBuf,
    appimage: Option<PathBuf>,
}

impl SystemInstaller {
    pub fn new() -> Self {
        Self {
            platform: Platform::current(),
            applications_dir: PathBuf::from(platform::macos::APPLICATIONS_DIR),
            appimage: platform::linux::appimage_path(),
        }
    }

    /// Replace this AppImage instead of the one from `$APPIMAGE`
    pub fn with_appimage(mut self, path: PathBuf) -> Self {
        self.appimage = Some(path);
        self
    }

    fn install_windows(&self, artifact: &Path) -> Result<(), InstallError> {
        Command::new(artifact)
            .args(["--updated", "/S", "--force-run"])
            .spawn()?;
        Ok(())
    }

    fn install_macos(&self, artifact: &Path) -> Result<(), InstallError> {
        let staging = tempdir_near(artifact)?;
        let result = self.install_macos_from(artifact, &staging);
        if let Err(e) = fs::remove_dir_all(&staging) {
            tracing::debug!(error = %e, "could not remove staging directory");
        }
        result
    }

    fn install_macos_from(&self, artifact: &Path, staging: &Path) -> Result<(), InstallError> {
        let dest = match extension(artifact).as_str() {
            "dmg" => {
                let mount = staging.join("mount");
                fs::create_dir_all(&mount)?;
                platform::macos::attach_dmg(artifact, &mount)?;
                let copied = self.copy_bundle_from(&mount);
                if let Err(e) = platform::macos::detach_dmg(&mount) {
                    tracing::warn!(error = %e, "failed to detach update image");
                }
                copied?
            }
            "zip" => {
                let unpacked = staging.join("unpacked");
                fs::create_dir_all(&unpacked)?;
                platform::macos::unzip(artifact, &unpacked)?;
                self.copy_bundle_from(&unpacked)?
            }
            other => return Err(InstallError::Unsupported(other.to_string())),
        };

        platform::macos::open_bundle(&dest)?;
        Ok(())
    }

    fn copy_bundle_from(&self, dir: &Path) -> Result<PathBuf, InstallError> {
        let bundle = fs::read_dir(dir)?
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .find(|path| extension(path) == "app")
            .ok_or_else(|| InstallError::NoBundle(dir.to_path_buf()))?;
        let name = bundle
            .file_name()
            .ok_or_else(|| InstallError::NoBundle(dir.to_path_buf()))?;

        let dest = self.applications_dir.join(name);
        platform::install_dir_copy(&bundle, &dest, platform::macos::ditto)?;
        Ok(dest)
    }

    fn install_linux(&self, artifact: &Path) -> Result<(), InstallError> {
        let is_appimage = extension(artifact) == "appimage";
        match (&self.appimage, is_appimage) {
            (Some(target), true) => {
                replace_file(artifact, target)?;
                Command::new(target).spawn()?;
                Ok(())
            }
            _ => {
                platform::open_external(&artifact.to_string_lossy())?;
                Ok(())
            }
        }
    }
}

impl Default for SystemInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl Installer for SystemInstaller {
    fn install(&self, artifact: &Path) -> Result<(), InstallError> {
        if !artifact.is_file() {
            return Err(InstallError::MissingArtifact(artifact.to_path_buf()));
        }

        tracing::info!(artifact = %artifact.display(), platform = ?self.platform, "installing update");
        match self.platform {
            Platform::Windows => self.install_windows(artifact),
            Platform::MacOS => self.install_macos(artifact),
            Platform::Linux => self.install_linux(artifact),
            Platform::Unknown => Err(InstallError::Unsupported(extension(artifact))),
        }
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn tempdir_near(artifact: &Path) -> io::Result<PathBuf> {
    let parent = artifact.parent().unwrap_or_else(|| Path::new("."));
    let dir = parent.join(format!(".install-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Swap `target` for `replacement` via a sibling temp file and a rename
fn replace_file(replacement: &Path, target: &Path) -> io::Result<()> {
    let mut staged = target.as_os_str().to_owned();
    staged.push(".new");
    let staged = PathBuf::from(staged);

    fs::copy(replacement, &staged)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&staged)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&staged, perms)?;
    }

    fs::rename(&staged, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_artifact() {
        let installer = SystemInstaller::new();
        let result = installer.install(Path::new("/nonexistent/OGforge.dmg"));
        assert!(matches!(result, Err(InstallError::MissingArtifact(_))));
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        assert_eq!(extension(Path::new("OGforge-1.2.0.AppImage")), "appimage");
        assert_eq!(extension(Path::new("OGforge")), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_replace_file_is_executable() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let replacement = dir.path().join("download.AppImage");
        let target = dir.path().join("OGforge.AppImage");
        fs::write(&replacement, b"new").unwrap();
        fs::write(&target, b"old").unwrap();

        replace_file(&replacement, &target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new");
        let mode = fs::metadata(&target).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
        assert!(!dir.path().join("OGforge.AppImage.new").exists());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_appimage_replaced_and_launched() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join("OGforge-2.0.0.AppImage");
        let running = dir.path().join("OGforge.AppImage");
        fs::write(&download, b"#!/bin/sh\nexit 0\n").unwrap();
        fs::write(&running, b"old").unwrap();

        let installer = SystemInstaller::new().with_appimage(running.clone());
        installer.install(&download).unwrap();

        assert_eq!(fs::read(&running).unwrap(), b"#!/bin/sh\nexit 0\n");
    }
}
