//! OGforge Self-Update System
//!
//! Checks redundant manifest sources, downloads and verifies the platform
//! artifact, and hands it to the OS installer.
//!
//! Components:
//! - `version` - Lenient dotted version comparison
//! - `manifest` - Manifest parsing and asset resolution
//! - `fetch` - Multi-source, multi-transport manifest retrieval
//! - `download` - HTTP download with resume and progress
//! - `verify` - Checksum verification
//! - `location` - Install-location guard
//! - `install` - Platform installers
//! - `controller` - Command state machine

pub mod controller;
pub mod download;
pub mod fetch;
pub mod host;
pub mod install;
pub mod location;
pub mod manifest;
pub mod state;
pub mod verify;
pub mod version;

pub use controller::{UpdateController, UpdateControllerBuilder};
pub use fetch::{FetchError, ManifestFetcher, Transport};
pub use host::{Host, StatusSink};
pub use state::{
    CommandOptions, CommandOutcome, CommandResponse, RejectReason, UpdateInfo, UpdateStatus,
};
