//! Update Controller
//!
//! Drives check -> download -> install for the host application and is the
//! only writer of the current [`UpdateStatus`].
//!
//! Overlapping `check` (or `download`) calls are coalesced: while one is in
//! flight, later callers await the same result instead of starting a second
//! network round trip, and the statuses of that run are emitted once.

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt, Shared};
use reqwest::Url;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::task::JoinHandle;

use super::download::{artifact_file_name, version_dir, Downloader};
use super::fetch::ManifestFetcher;
use super::host::{Host, StatusSink};
use super::install::{Installer, SystemInstaller};
use super::location::{ensure_install_location, BundleLocation, GuardOutcome, InstallLocation};
use super::manifest::resolve_asset;
use super::state::{CommandOptions, CommandOutcome, RejectReason, UpdateInfo, UpdateStatus};
use super::verify;
use super::version;
use crate::engine::config::UpdaterConfig;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

type Flight = Shared<BoxFuture<'static, CommandOutcome>>;

/// Single-flight slot: concurrent callers share one running future.
///
/// The running future empties the slot itself on completion, so a caller
/// arriving afterwards always starts a fresh run.
struct InFlight {
    slot: Arc<Mutex<Option<(u64, Flight)>>>,
    next_id: AtomicU64,
}

impl InFlight {
    fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    async fn run<F>(&self, start: F) -> CommandOutcome
    where
        F: FnOnce() -> BoxFuture<'static, CommandOutcome>,
    {
        let shared = {
            let mut slot = lock(&self.slot);
            match slot.as_ref() {
                Some((_, shared)) => {
                    tracing::debug!("joining in-flight update operation");
                    shared.clone()
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let work = start();
                    let owner = Arc::clone(&self.slot);
                    let shared = async move {
                        let outcome = work.await;
                        let mut slot = lock(&owner);
                        if matches!(slot.as_ref(), Some((current, _)) if *current == id) {
                            *slot = None;
                        }
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some((id, shared.clone()));
                    shared
                }
            }
        };

        shared.await
    }

    #[cfg(test)]
    fn is_idle(&self) -> bool {
        lock(&self.slot).is_none()
    }
}

/// What the last successful check found
#[derive(Debug, Clone)]
struct PendingUpdate {
    info: UpdateInfo,
    checksum: Option<String>,
}

struct Inner {
    config: UpdaterConfig,
    host: Arc<dyn Host>,
    location: Arc<dyn InstallLocation>,
    installer: Arc<dyn Installer>,
    fetcher: ManifestFetcher,
    downloader: Downloader,
    window: RwLock<Option<Arc<dyn StatusSink>>>,
    current: Mutex<Option<UpdateStatus>>,
    enabled: AtomicBool,
    shut_down: AtomicBool,
    pending: Mutex<Option<PendingUpdate>>,
    downloaded: Mutex<Option<PathBuf>>,
    checks: InFlight,
    downloads: InFlight,
    auto_install: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the update state machine; clones share the same state
#[derive(Clone)]
pub struct UpdateController {
    inner: Arc<Inner>,
}

/// Builder for [`UpdateController`]
pub struct UpdateControllerBuilder {
    host: Arc<dyn Host>,
    config: UpdaterConfig,
    location: Option<Arc<dyn InstallLocation>>,
    installer: Option<Arc<dyn Installer>>,
    fetcher: Option<ManifestFetcher>,
}

impl UpdateControllerBuilder {
    pub fn config(mut self, config: UpdaterConfig) -> Self {
        self.config = config;
        self
    }

    /// Override install-location detection
    pub fn location(mut self, location: Arc<dyn InstallLocation>) -> Self {
        self.location = Some(location);
        self
    }

    pub fn installer(mut self, installer: Arc<dyn Installer>) -> Self {
        self.installer = Some(installer);
        self
    }

    /// Provide a custom manifest fetcher (e.g. alternative transports)
    pub fn fetcher(mut self, fetcher: ManifestFetcher) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn build(self) -> UpdateController {
        let user_agent = self.config.user_agent(&self.host.version());
        let fetcher = self
            .fetcher
            .unwrap_or_else(|| ManifestFetcher::new(&user_agent))
            .timeout(self.config.timeout());

        UpdateController {
            inner: Arc::new(Inner {
                location: self
                    .location
                    .unwrap_or_else(|| Arc::new(BundleLocation::current())),
                installer: self
                    .installer
                    .unwrap_or_else(|| Arc::new(SystemInstaller::new())),
                fetcher,
                downloader: Downloader::new(&user_agent).idle_timeout(self.config.timeout()),
                host: self.host,
                config: self.config,
                window: RwLock::new(None),
                current: Mutex::new(None),
                enabled: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                pending: Mutex::new(None),
                downloaded: Mutex::new(None),
                checks: InFlight::new(),
                downloads: InFlight::new(),
                auto_install: Mutex::new(None),
            }),
        }
    }
}

impl UpdateController {
    pub fn builder(host: Arc<dyn Host>) -> UpdateControllerBuilder {
        UpdateControllerBuilder {
            host,
            config: UpdaterConfig::default(),
            location: None,
            installer: None,
            fetcher: None,
        }
    }

    /// Attach (or detach with `None`) the window that receives status events
    pub fn set_window(&self, window: Option<Arc<dyn StatusSink>>) {
        *self.inner.window.write().unwrap_or_else(PoisonError::into_inner) = window;
    }

    /// Last emitted status; `None` while idle
    pub fn current_status(&self) -> Option<UpdateStatus> {
        lock(&self.inner.current).clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::SeqCst)
    }

    pub fn app_version(&self) -> String {
        self.inner.host.version()
    }

    /// Turn the updater on and run a first check.
    ///
    /// The check result is reported on the status stream; `enable` succeeds
    /// even when that first check fails.
    pub async fn enable(&self) -> CommandOutcome {
        if !self.inner.host.is_packaged() {
            return CommandOutcome::Rejected(RejectReason::NotPackaged);
        }
        if let Err(outcome) = self.inner.gate(true).await {
            return outcome;
        }

        self.inner.enabled.store(true, Ordering::SeqCst);
        self.inner.shut_down.store(false, Ordering::SeqCst);
        tracing::info!("updater enabled");

        let _ = self.inner.coalesced_check().await;
        CommandOutcome::Ok
    }

    pub async fn check(&self, opts: CommandOptions) -> CommandOutcome {
        if let Err(outcome) = self.inner.preconditions(true, opts).await {
            return outcome;
        }
        self.inner.coalesced_check().await
    }

    pub async fn download(&self, opts: CommandOptions) -> CommandOutcome {
        if let Err(outcome) = self.inner.preconditions(true, opts).await {
            return outcome;
        }
        self.inner.coalesced_download().await
    }

    /// Install the downloaded update and hand the process off.
    ///
    /// Under a real host this does not return on success.
    pub async fn install(&self, opts: CommandOptions) -> CommandOutcome {
        if let Err(outcome) = self.inner.preconditions(false, opts).await {
            return outcome;
        }
        self.inner.run_install().await
    }

    /// Open a download page in the browser. Only `http`/`https` URLs are opened.
    pub fn open_download(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url.trim()) else {
            return false;
        };
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return false;
        }
        match self.inner.host.open_external(parsed.as_str()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "failed to open download page");
                false
            }
        }
    }

    /// Disable the updater, cancel a scheduled install and drop the window
    pub fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);
        self.inner.enabled.store(false, Ordering::SeqCst);
        if let Some(handle) = lock(&self.inner.auto_install).take() {
            handle.abort();
        }
        self.set_window(None);
        tracing::debug!("updater shut down");
    }
}

impl Inner {
    /// Publish a status to the attached window.
    ///
    /// Delivery happens under the status lock so concurrent emitters cannot
    /// reorder events.
    fn emit(&self, status: UpdateStatus) {
        tracing::debug!(status = status.name(), "update status");
        let mut current = lock(&self.current);

        let window = self
            .window
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match window {
            Some(window) if !window.is_destroyed() => window.deliver(&status),
            _ => tracing::trace!("no window to receive update status"),
        }

        *current = Some(status);
    }

    fn terminate(&self) -> CommandOutcome {
        self.host.prepare_exit();
        self.host.exit();
        CommandOutcome::Terminal
    }

    /// Run the install-location guard and publish its verdict
    async fn gate(&self, prompt: bool) -> Result<(), CommandOutcome> {
        match ensure_install_location(&*self.location, &*self.host, prompt).await {
            GuardOutcome::Ready => Ok(()),
            GuardOutcome::NeedsInstall(message) => {
                self.emit(UpdateStatus::NeedsInstall { message });
                Err(CommandOutcome::Rejected(RejectReason::NeedsInstall))
            }
            GuardOutcome::Relaunch(message) => {
                self.emit(UpdateStatus::Relaunch { message });
                Err(self.terminate())
            }
        }
    }

    async fn preconditions(&self, needs_enabled: bool, opts: CommandOptions) -> Result<(), CommandOutcome> {
        if !self.host.is_packaged() {
            return Err(CommandOutcome::Rejected(RejectReason::NotPackaged));
        }
        if needs_enabled && !self.enabled.load(Ordering::SeqCst) {
            return Err(CommandOutcome::Rejected(RejectReason::Disabled));
        }
        self.gate(opts.prompt).await
    }

    async fn coalesced_check(self: &Arc<Self>) -> CommandOutcome {
        let inner = Arc::clone(self);
        self.checks
            .run(move || async move { inner.run_check().await }.boxed())
            .await
    }

    async fn coalesced_download(self: &Arc<Self>) -> CommandOutcome {
        let inner = Arc::clone(self);
        self.downloads
            .run(move || async move { inner.run_download().await }.boxed())
            .await
    }

    async fn run_check(&self) -> CommandOutcome {
        self.emit(UpdateStatus::Checking);

        let current_version = self.host.version();
        let fetched = match self.fetcher.fetch(&self.config.manifest_urls).await {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::warn!(error = %e, "update check failed");
                self.emit(UpdateStatus::error(e.to_string()));
                return CommandOutcome::Rejected(RejectReason::CheckFailed);
            }
        };

        let manifest = match fetched.manifest() {
            Ok(manifest) => manifest,
            Err(e) => {
                tracing::warn!(source = %fetched.source_url, error = %e, "unusable update manifest");
                self.emit(UpdateStatus::error(e.to_string()));
                return CommandOutcome::Rejected(RejectReason::CheckFailed);
            }
        };

        let platform_key = self.host.platform_key();
        let download_url = resolve_asset(&manifest, fetched.source_url.as_str(), &platform_key);
        let info = UpdateInfo {
            update_available: version::update_available(&current_version, &manifest.version),
            current_version,
            latest_version: manifest.version.clone(),
            download_url: download_url.map(String::from),
            notes: manifest.notes.clone(),
            required: manifest.required,
            manifest_url: fetched.source_url.to_string(),
            checked_at: Utc::now(),
        };

        tracing::info!(
            current = %info.current_version,
            latest = %info.latest_version,
            available = info.update_available,
            "update check finished"
        );

        *lock(&self.pending) = Some(PendingUpdate {
            info: info.clone(),
            checksum: manifest.checksum_for(&platform_key).map(str::to_string),
        });

        if info.update_available {
            self.emit(UpdateStatus::Available { info });
        } else {
            self.emit(UpdateStatus::UpToDate { info });
        }
        CommandOutcome::Ok
    }

    fn download_failed(&self, message: impl Into<String>) -> CommandOutcome {
        let message = message.into();
        tracing::warn!(%message, "update download failed");
        self.emit(UpdateStatus::error(message));
        CommandOutcome::Rejected(RejectReason::DownloadFailed)
    }

    async fn run_download(self: Arc<Self>) -> CommandOutcome {
        let pending = lock(&self.pending).clone();
        let Some(pending) = pending.filter(|p| p.info.update_available) else {
            return self.download_failed("No update available to download.");
        };
        let Some(url) = pending
            .info
            .download_url
            .as_deref()
            .and_then(|url| Url::parse(url).ok())
        else {
            return self.download_failed("No download is published for this platform.");
        };

        let file_name = artifact_file_name(&url, &self.config.app_name, &pending.info.latest_version);
        let dest = version_dir(&self.config.download_dir(), &pending.info.latest_version).join(file_name);
        tracing::info!(%url, dest = %dest.display(), "downloading update");

        let mut last_percent = -1.0_f64;
        let result = self
            .downloader
            .download(&url, &dest, |progress| {
                // One event per whole percent keeps the UI channel quiet
                let percent = progress.percent.floor();
                if percent > last_percent || progress.percent >= 100.0 {
                    last_percent = percent.max(last_percent);
                    self.emit(UpdateStatus::Downloading {
                        percent: progress.percent,
                        transferred: progress.transferred,
                        total: progress.total,
                    });
                }
            })
            .await;

        let downloaded = match result {
            Ok(downloaded) => downloaded,
            Err(e) => return self.download_failed(format!("Download failed: {}", e)),
        };

        if let Some(expected) = pending.checksum.as_deref() {
            let path = downloaded.path.clone();
            let expected = expected.to_string();
            let verified = tokio::task::spawn_blocking(move || verify::verify_checksum(&path, &expected))
                .await
                .map_err(|e| e.to_string())
                .and_then(|r| r.map_err(|e| e.to_string()));
            if let Err(message) = verified {
                if let Err(e) = std::fs::remove_file(&downloaded.path) {
                    tracing::debug!(error = %e, "could not remove rejected download");
                }
                return self.download_failed(format!("Downloaded update failed verification: {}", message));
            }
        }

        tracing::info!(
            bytes = downloaded.bytes_downloaded,
            resumed = downloaded.resumed,
            "update downloaded"
        );
        *lock(&self.downloaded) = Some(downloaded.path.clone());
        self.emit(UpdateStatus::Downloaded {
            info: pending.info,
            file: downloaded.path,
        });

        if self.config.auto_install {
            self.schedule_auto_install();
        }
        CommandOutcome::Ok
    }

    /// Install after a short grace period so the UI can show "downloaded".
    /// Failures are reported as statuses only.
    fn schedule_auto_install(self: &Arc<Self>) {
        let inner = Arc::clone(self);
        let delay = self.config.auto_install_delay();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if inner.shut_down.load(Ordering::SeqCst) {
                return;
            }
            if let Err(outcome) = inner.gate(false).await {
                tracing::info!(?outcome, "automatic install skipped");
                return;
            }
            if let CommandOutcome::Rejected(reason) = inner.run_install().await {
                tracing::warn!(%reason, "automatic install did not complete");
            }
        });

        if let Some(previous) = lock(&self.auto_install).replace(handle) {
            previous.abort();
        }
    }

    async fn run_install(&self) -> CommandOutcome {
        let artifact = lock(&self.downloaded).clone();
        let Some(artifact) = artifact else {
            self.emit(UpdateStatus::error("No downloaded update is ready to install."));
            return CommandOutcome::Rejected(RejectReason::InstallFailed);
        };

        self.host.prepare_exit();

        let installer = Arc::clone(&self.installer);
        let installed = tokio::task::spawn_blocking(move || installer.install(&artifact))
            .await
            .map_err(|e| e.to_string())
            .and_then(|r| r.map_err(|e| e.to_string()));

        match installed {
            Ok(()) => {
                tracing::info!("update handed to installer, exiting");
                self.host.exit();
                CommandOutcome::Terminal
            }
            Err(message) => {
                tracing::warn!(%message, "update install failed");
                self.emit(UpdateStatus::error(format!("Install failed: {}", message)));
                CommandOutcome::Rejected(RejectReason::InstallFailed)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::updater::fetch::{FetchError, Transport};
    use crate::engine::updater::install::InstallError;
    use crate::engine::updater::location::LocationError;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const SOURCE: &str = "https://updates.example/ogforge/version.json";

    struct TestHost {
        packaged: bool,
        confirm: bool,
        exits: AtomicUsize,
        opened: Mutex<Vec<String>>,
    }

    impl TestHost {
        fn packaged() -> Arc<Self> {
            Arc::new(Self {
                packaged: true,
                confirm: true,
                exits: AtomicUsize::new(0),
                opened: Mutex::new(Vec::new()),
            })
        }

        fn unpackaged() -> Arc<Self> {
            Arc::new(Self {
                packaged: false,
                confirm: true,
                exits: AtomicUsize::new(0),
                opened: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Host for TestHost {
        fn version(&self) -> String {
            "1.0.0".into()
        }

        fn is_packaged(&self) -> bool {
            self.packaged
        }

        fn platform_key(&self) -> String {
            "mac".into()
        }

        async fn confirm_relocation(&self) -> bool {
            self.confirm
        }

        fn exit(&self) {
            self.exits.fetch_add(1, Ordering::SeqCst);
        }

        fn open_external(&self, url: &str) -> std::io::Result<()> {
            self.opened.lock().unwrap().push(url.to_string());
            Ok(())
        }
    }

    /// Serves one manifest after a short delay and counts requests
    struct SlowTransport {
        document: Value,
        hits: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for SlowTransport {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn get_json(&self, _url: &Url, _timeout: Duration) -> Result<Value, FetchError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(self.document.clone())
        }
    }

    struct Location {
        restricted: bool,
    }

    impl InstallLocation for Location {
        fn is_restricted(&self) -> bool {
            self.restricted
        }

        fn is_in_sanctioned_dir(&self) -> bool {
            false
        }

        fn relocate(&self) -> Result<PathBuf, LocationError> {
            Ok(PathBuf::from("/Applications/OGforge.app"))
        }
    }

    struct RecordingInstaller {
        installed: Mutex<Vec<PathBuf>>,
        fail: bool,
    }

    impl Installer for RecordingInstaller {
        fn install(&self, artifact: &Path) -> Result<(), InstallError> {
            self.installed.lock().unwrap().push(artifact.to_path_buf());
            if self.fail {
                Err(InstallError::Unsupported("test".into()))
            } else {
                Ok(())
            }
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<UpdateStatus>>,
        destroyed: AtomicBool,
    }

    impl StatusSink for RecordingSink {
        fn is_destroyed(&self) -> bool {
            self.destroyed.load(Ordering::SeqCst)
        }

        fn deliver(&self, status: &UpdateStatus) {
            self.events.lock().unwrap().push(status.clone());
        }
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().iter().map(UpdateStatus::name).collect()
        }
    }

    struct Fixture {
        controller: UpdateController,
        host: Arc<TestHost>,
        sink: Arc<RecordingSink>,
        hits: Arc<AtomicUsize>,
        installer: Arc<RecordingInstaller>,
    }

    fn fixture(host: Arc<TestHost>, restricted: bool, document: Value) -> Fixture {
        let hits = Arc::new(AtomicUsize::new(0));
        let transport: Arc<dyn Transport> = Arc::new(SlowTransport {
            document,
            hits: hits.clone(),
        });
        let installer = Arc::new(RecordingInstaller {
            installed: Mutex::new(Vec::new()),
            fail: false,
        });
        let config = UpdaterConfig {
            manifest_urls: vec![SOURCE.to_string()],
            auto_install: false,
            ..UpdaterConfig::default()
        };

        let controller = UpdateController::builder(host.clone())
            .config(config)
            .fetcher(ManifestFetcher::with_transports(vec![transport]))
            .location(Arc::new(Location { restricted }))
            .installer(installer.clone())
            .build();
        let sink = Arc::new(RecordingSink::default());
        controller.set_window(Some(sink.clone()));

        Fixture {
            controller,
            host,
            sink,
            hits,
            installer,
        }
    }

    fn newer_manifest() -> Value {
        json!({ "version": "1.1.0", "downloads": { "mac": "OGforge-1.1.0.dmg" }, "notes": "Faster forge" })
    }

    #[tokio::test]
    async fn test_unpackaged_build_rejects_without_events() {
        let f = fixture(TestHost::unpackaged(), false, newer_manifest());

        assert_eq!(
            f.controller.enable().await,
            CommandOutcome::Rejected(RejectReason::NotPackaged)
        );
        assert_eq!(
            f.controller.check(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::NotPackaged)
        );
        assert_eq!(
            f.controller.install(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::NotPackaged)
        );
        assert!(f.sink.names().is_empty());
        assert_eq!(f.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_commands_require_enable() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());

        assert_eq!(
            f.controller.download(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::Disabled)
        );
        assert_eq!(
            f.controller.check(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::Disabled)
        );
        assert!(f.sink.names().is_empty());
    }

    #[tokio::test]
    async fn test_enable_runs_initial_check() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());

        assert_eq!(f.controller.enable().await, CommandOutcome::Ok);
        assert!(f.controller.is_enabled());
        assert_eq!(f.sink.names(), vec!["checking", "available"]);

        match f.controller.current_status() {
            Some(UpdateStatus::Available { info }) => {
                assert_eq!(info.latest_version, "1.1.0");
                assert!(info.update_available);
                assert_eq!(
                    info.download_url.as_deref(),
                    Some("https://updates.example/ogforge/OGforge-1.1.0.dmg")
                );
                assert_eq!(info.notes.as_deref(), Some("Faster forge"));
                assert_eq!(info.manifest_url, SOURCE);
            }
            other => panic!("expected available, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_same_version_reports_none() {
        let f = fixture(TestHost::packaged(), false, json!({ "version": "v1.0" }));
        f.controller.enable().await;
        assert_eq!(f.sink.names(), vec!["checking", "none"]);
    }

    #[tokio::test]
    async fn test_missing_version_fails_check() {
        let f = fixture(TestHost::packaged(), false, json!({ "notes": "no version" }));
        assert_eq!(f.controller.enable().await, CommandOutcome::Ok);
        assert_eq!(
            f.controller.check(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::CheckFailed)
        );
        assert_eq!(f.sink.names(), vec!["checking", "error", "checking", "error"]);
    }

    #[tokio::test]
    async fn test_concurrent_checks_coalesce() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        f.controller.enable().await;
        f.sink.events.lock().unwrap().clear();
        f.hits.store(0, Ordering::SeqCst);

        let (a, b) = tokio::join!(
            f.controller.check(CommandOptions::default()),
            f.controller.check(CommandOptions::default())
        );

        assert_eq!(a, CommandOutcome::Ok);
        assert_eq!(a, b);
        assert_eq!(f.hits.load(Ordering::SeqCst), 1);
        assert_eq!(f.sink.names(), vec!["checking", "available"]);

        // Sequential checks are not coalesced
        f.controller.check(CommandOptions::default()).await;
        assert_eq!(f.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_abandoned_check_is_finished_by_next_caller() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        f.controller.enable().await;
        assert!(f.controller.inner.checks.is_idle());
        f.sink.events.lock().unwrap().clear();
        f.hits.store(0, Ordering::SeqCst);

        // Give up on a check while its fetch is still sleeping
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            f.controller.check(CommandOptions::default()),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(!f.controller.inner.checks.is_idle());

        assert_eq!(f.controller.check(CommandOptions::default()).await, CommandOutcome::Ok);
        assert_eq!(f.hits.load(Ordering::SeqCst), 1);
        assert!(f.controller.inner.checks.is_idle());

        // Once finished, the next call fetches again instead of reusing the old outcome
        f.controller.check(CommandOptions::default()).await;
        assert_eq!(f.hits.load(Ordering::SeqCst), 2);
        assert_eq!(f.sink.names(), vec!["checking", "available", "checking", "available"]);
    }

    #[tokio::test]
    async fn test_restricted_location_without_prompt_needs_install() {
        let f = fixture(TestHost::packaged(), true, newer_manifest());

        // enable prompts and the test host accepts, which relaunches
        assert_eq!(f.controller.enable().await, CommandOutcome::Terminal);
        assert_eq!(f.host.exits.load(Ordering::SeqCst), 1);
        assert_eq!(f.sink.names(), vec!["relaunch"]);
        assert!(!f.controller.is_enabled());

        assert_eq!(
            f.controller.install(CommandOptions::silent()).await,
            CommandOutcome::Rejected(RejectReason::NeedsInstall)
        );
        assert_eq!(f.sink.names(), vec!["relaunch", "needs_install"]);
        assert_eq!(f.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_download_without_available_update() {
        let f = fixture(TestHost::packaged(), false, json!({ "version": "0.9.0" }));
        f.controller.enable().await;

        assert_eq!(
            f.controller.download(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::DownloadFailed)
        );
        assert_eq!(f.sink.names(), vec!["checking", "none", "error"]);
    }

    #[tokio::test]
    async fn test_install_without_download() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        assert_eq!(
            f.controller.install(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::InstallFailed)
        );
        assert!(f.installer.installed.lock().unwrap().is_empty());
        assert_eq!(f.host.exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_install_hands_off_downloaded_artifact() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        let artifact = PathBuf::from("/tmp/OGforge-1.1.0.dmg");
        *lock(&f.controller.inner.downloaded) = Some(artifact.clone());

        assert_eq!(
            f.controller.install(CommandOptions::default()).await,
            CommandOutcome::Terminal
        );
        assert_eq!(*f.installer.installed.lock().unwrap(), vec![artifact]);
        assert_eq!(f.host.exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_install_reports_error() {
        let host = TestHost::packaged();
        let installer = Arc::new(RecordingInstaller {
            installed: Mutex::new(Vec::new()),
            fail: true,
        });
        let controller = UpdateController::builder(host.clone())
            .location(Arc::new(Location { restricted: false }))
            .installer(installer)
            .build();
        let sink = Arc::new(RecordingSink::default());
        controller.set_window(Some(sink.clone()));
        *lock(&controller.inner.downloaded) = Some(PathBuf::from("/tmp/OGforge.exe"));

        assert_eq!(
            controller.install(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::InstallFailed)
        );
        assert_eq!(sink.names(), vec!["error"]);
        assert_eq!(host.exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_destroyed_or_missing_window_is_silent() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        f.sink.destroyed.store(true, Ordering::SeqCst);
        f.controller.enable().await;
        assert!(f.sink.names().is_empty());

        f.controller.set_window(None);
        assert_eq!(
            f.controller.check(CommandOptions::default()).await,
            CommandOutcome::Ok
        );
        assert!(matches!(
            f.controller.current_status(),
            Some(UpdateStatus::Available { .. })
        ));
    }

    #[tokio::test]
    async fn test_open_download_only_http() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());

        assert!(f.controller.open_download("https://updates.example/OGforge.dmg"));
        assert!(!f.controller.open_download("file:///etc/passwd"));
        assert!(!f.controller.open_download("not a url"));
        assert_eq!(
            *f.host.opened.lock().unwrap(),
            vec!["https://updates.example/OGforge.dmg".to_string()]
        );
    }

    fn auto_install_fixture() -> (UpdateController, Arc<TestHost>, Arc<RecordingInstaller>) {
        let host = TestHost::packaged();
        let installer = Arc::new(RecordingInstaller {
            installed: Mutex::new(Vec::new()),
            fail: false,
        });
        let config = UpdaterConfig {
            auto_install_delay_ms: 20,
            ..UpdaterConfig::default()
        };
        let controller = UpdateController::builder(host.clone())
            .config(config)
            .location(Arc::new(Location { restricted: false }))
            .installer(installer.clone())
            .build();
        *lock(&controller.inner.downloaded) = Some(PathBuf::from("/tmp/OGforge-1.1.0.AppImage"));
        (controller, host, installer)
    }

    #[tokio::test]
    async fn test_auto_install_runs_after_delay() {
        let (controller, host, installer) = auto_install_fixture();
        controller.inner.schedule_auto_install();

        assert!(installer.installed.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(installer.installed.lock().unwrap().len(), 1);
        assert_eq!(host.exits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_auto_install() {
        let (controller, host, installer) = auto_install_fixture();
        controller.inner.schedule_auto_install();
        controller.shutdown();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(installer.installed.lock().unwrap().is_empty());
        assert_eq!(host.exits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_disables() {
        let f = fixture(TestHost::packaged(), false, newer_manifest());
        f.controller.enable().await;
        f.controller.shutdown();

        assert!(!f.controller.is_enabled());
        assert_eq!(
            f.controller.check(CommandOptions::default()).await,
            CommandOutcome::Rejected(RejectReason::Disabled)
        );
    }
}
