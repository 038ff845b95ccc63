//! Host Application Capabilities
//!
//! What the updater needs from the application embedding it.

use async_trait::async_trait;
use std::io;

use super::state::UpdateStatus;
use crate::engine::platform;

/// The application the updater runs inside
#[async_trait]
pub trait Host: Send + Sync {
    /// Version of the running build
    fn version(&self) -> String;

    /// `false` for local development runs
    fn is_packaged(&self) -> bool;

    /// Key used to pick this platform's artifact from the manifest
    fn platform_key(&self) -> String {
        platform::platform_key(std::env::consts::OS)
    }

    /// Ask the user whether to move the app into the applications folder.
    /// `true` means "move", `false` means "cancel".
    async fn confirm_relocation(&self) -> bool;

    /// Flush anything that must survive the process being replaced
    fn prepare_exit(&self) {}

    /// End the current process. Hosts that return from this are treated as
    /// having exited; callers get [`CommandOutcome::Terminal`](super::state::CommandOutcome).
    fn exit(&self) {
        std::process::exit(0);
    }

    /// Open an URL in the user's browser
    fn open_external(&self, url: &str) -> io::Result<()> {
        platform::open_external(url)
    }
}

/// Destination for status events, typically the main window
pub trait StatusSink: Send + Sync {
    /// A destroyed sink is skipped silently
    fn is_destroyed(&self) -> bool {
        false
    }

    fn deliver(&self, status: &UpdateStatus);
}
