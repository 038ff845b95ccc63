//! Update Commands
//!
//! The command surface a UI shell invokes, plus the status bridge that
//! forwards controller events to its subscribers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::engine::updater::{
    CommandOptions, CommandResponse, StatusSink, UpdateController, UpdateStatus,
};

/// Enable the updater and run the initial check
pub async fn update_enable(controller: &UpdateController) -> CommandResponse {
    controller.enable().await.response()
}

pub async fn update_check(
    controller: &UpdateController,
    options: Option<CommandOptions>,
) -> CommandResponse {
    controller.check(options.unwrap_or_default()).await.response()
}

pub async fn update_download(
    controller: &UpdateController,
    options: Option<CommandOptions>,
) -> CommandResponse {
    controller.download(options.unwrap_or_default()).await.response()
}

/// Install the downloaded update. Does not return under a real host.
pub async fn update_install(
    controller: &UpdateController,
    options: Option<CommandOptions>,
) -> CommandResponse {
    controller.install(options.unwrap_or_default()).await.response()
}

/// Open a download page; `false` when the URL is not http(s) or could not be opened
pub fn update_open_download(controller: &UpdateController, url: &str) -> bool {
    controller.open_download(url)
}

pub fn app_get_version(controller: &UpdateController) -> String {
    controller.app_version()
}

struct BridgeState {
    subscribers: Mutex<HashMap<u64, UnboundedSender<UpdateStatus>>>,
    next_id: AtomicU64,
    destroyed: AtomicBool,
}

impl BridgeState {
    fn remove(&self, id: u64) {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Window-side end of the status stream. Clones share subscribers.
#[derive(Clone)]
pub struct StatusBridge {
    state: Arc<BridgeState>,
}

impl StatusBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(BridgeState {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                destroyed: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> StatusSubscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        if !self.is_destroyed() {
            self.state
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id, tx);
        }
        StatusSubscription {
            id,
            state: Arc::downgrade(&self.state),
            rx,
        }
    }

    /// Mark the window as gone and end every subscription
    pub fn destroy(&self) {
        self.state.destroyed.store(true, Ordering::SeqCst);
        self.state
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.state
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Default for StatusBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusSink for StatusBridge {
    fn is_destroyed(&self) -> bool {
        self.state.destroyed.load(Ordering::SeqCst)
    }

    fn deliver(&self, status: &UpdateStatus) {
        let mut subscribers = self
            .state
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|_, tx| tx.send(status.clone()).is_ok());
    }
}

/// Receives statuses in emission order until dropped or unsubscribed
pub struct StatusSubscription {
    id: u64,
    state: Weak<BridgeState>,
    rx: UnboundedReceiver<UpdateStatus>,
}

impl StatusSubscription {
    /// Next status; `None` once the bridge is destroyed
    pub async fn next(&mut self) -> Option<UpdateStatus> {
        self.rx.recv().await
    }

    pub fn try_next(&mut self) -> Option<UpdateStatus> {
        self.rx.try_recv().ok()
    }

    pub fn unsubscribe(self) {}
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(state) = self.state.upgrade() {
            state.remove(self.id);
        }
    }
}
