//! Change notification contract and a manually driven implementation.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;

use super::WatchError;
use crate::types::WatchedPath;

/// Invoked with the changed path, on a notification thread.
pub type ChangeCallback = Arc<dyn Fn(&Path) + Send + Sync>;

/// Handle returned by [`ChangeNotifier::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Source of on-disk change notifications for single files.
///
/// `subscribe` must return without waiting for a change; callbacks are
/// delivered later from a thread owned by the notifier, possibly
/// concurrently with other calls into the notifier.
pub trait ChangeNotifier: Send + Sync {
    fn subscribe(
        &self,
        path: &WatchedPath,
        callback: ChangeCallback,
    ) -> Result<SubscriptionId, WatchError>;

    /// Unknown or already removed ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}

/// Notifier whose changes are triggered explicitly.
///
/// `trigger` runs the matching callbacks on the calling thread, which lets
/// tests fire from as many threads as they like.
#[derive(Default)]
pub struct ManualChangeNotifier {
    subscriptions: Mutex<HashMap<SubscriptionId, (WatchedPath, ChangeCallback)>>,
    next_id: AtomicU64,
    unsubscribed: AtomicUsize,
    failing: AtomicBool,
}

impl ManualChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an on-disk change. Returns the number of callbacks invoked.
    pub fn trigger(&self, path: impl AsRef<Path>) -> usize {
        let target = WatchedPath::new(path.as_ref());
        let callbacks: Vec<ChangeCallback> = self
            .subscriptions
            .lock()
            .values()
            .filter(|(watched, _)| *watched == target)
            .map(|(_, callback)| callback.clone())
            .collect();

        for callback in &callbacks {
            callback(target.as_path());
        }
        callbacks.len()
    }

    pub fn is_subscribed(&self, path: impl AsRef<Path>) -> bool {
        let target = WatchedPath::new(path.as_ref());
        self.subscriptions
            .lock()
            .values()
            .any(|(watched, _)| *watched == target)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Number of `unsubscribe` calls that removed a live subscription.
    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    /// Make subsequent `subscribe` calls fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl ChangeNotifier for ManualChangeNotifier {
    fn subscribe(
        &self,
        path: &WatchedPath,
        callback: ChangeCallback,
    ) -> Result<SubscriptionId, WatchError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(WatchError::PathWatchFailed {
                path: path.as_path().to_path_buf(),
                reason: "subscriptions disabled".to_string(),
            });
        }

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions
            .lock()
            .insert(id, (path.clone(), callback));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        if self.subscriptions.lock().remove(&id).is_some() {
            self.unsubscribed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
