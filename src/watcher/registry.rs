//! Registry of live watches, one per path.
//!
//! The registry itself is not synchronized. It lives next to the load-time
//! ledger inside the tracker's single lock, so every check-then-insert and
//! every removal happens under that lock. Subscribing and unsubscribing with
//! the notifier happen outside it, through [`Watch::arm`] and
//! [`Watch::dispose`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::WatchError;
use super::notifier::{ChangeCallback, ChangeNotifier, SubscriptionId};
use crate::types::WatchedPath;

/// Generation number distinguishing successive watches on the same path.
pub type WatchGeneration = u64;

#[derive(Debug, Default)]
struct WatchState {
    disposed: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
}

/// An active (or about to be armed) subscription for one path.
///
/// Clones share state: disposing any clone disposes the watch.
#[derive(Debug, Clone)]
pub struct Watch {
    path: WatchedPath,
    generation: WatchGeneration,
    state: Arc<WatchState>,
}

impl Watch {
    fn new(path: WatchedPath, generation: WatchGeneration) -> Self {
        Self {
            path,
            generation,
            state: Arc::new(WatchState::default()),
        }
    }

    pub fn path(&self) -> &WatchedPath {
        &self.path
    }

    pub fn generation(&self) -> WatchGeneration {
        self.generation
    }

    pub fn is_disposed(&self) -> bool {
        self.state.disposed.load(Ordering::SeqCst)
    }

    /// Subscribe with the notifier.
    ///
    /// Returns `Ok(false)` if the watch was disposed before the subscription
    /// could be attached; the subscription is released again in that case.
    pub fn arm(
        &self,
        notifier: &dyn ChangeNotifier,
        callback: ChangeCallback,
    ) -> Result<bool, WatchError> {
        let id = notifier.subscribe(&self.path, callback)?;

        let mut slot = self.state.subscription.lock();
        if self.is_disposed() {
            drop(slot);
            notifier.unsubscribe(id);
            return Ok(false);
        }
        *slot = Some(id);
        Ok(true)
    }

    /// Release the subscription. Returns `true` only for the call that
    /// actually disposed the watch.
    pub fn dispose(&self, notifier: &dyn ChangeNotifier) -> bool {
        if self.state.disposed.swap(true, Ordering::SeqCst) {
            return false;
        }

        // A concurrent `arm` either sees the flag and unsubscribes itself,
        // or has already stored its id here.
        let subscription = self.state.subscription.lock().take();
        if let Some(id) = subscription {
            notifier.unsubscribe(id);
        }
        true
    }
}

/// Map from path to its single live watch.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    watches: HashMap<WatchedPath, Watch>,
    next_generation: WatchGeneration,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh watch for `path` unless one exists.
    ///
    /// Returns the new watch, which the caller must arm, or `None` when the
    /// path is already watched.
    pub fn insert_if_absent(&mut self, path: &WatchedPath) -> Option<Watch> {
        if self.watches.contains_key(path) {
            return None;
        }

        self.next_generation += 1;
        let watch = Watch::new(path.clone(), self.next_generation);
        self.watches.insert(path.clone(), watch.clone());
        Some(watch)
    }

    /// Remove the watch for `path`. The caller disposes the returned watch.
    pub fn remove(&mut self, path: &WatchedPath) -> Option<Watch> {
        self.watches.remove(path)
    }

    /// Remove the watch for `path` only if it is the given generation.
    ///
    /// Late callbacks of a retired watch must not remove its successor.
    pub fn remove_generation(
        &mut self,
        path: &WatchedPath,
        generation: WatchGeneration,
    ) -> Option<Watch> {
        match self.watches.get(path) {
            Some(watch) if watch.generation == generation => self.watches.remove(path),
            _ => None,
        }
    }

    pub fn contains(&self, path: &WatchedPath) -> bool {
        self.watches.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &WatchedPath> {
        self.watches.keys()
    }

    /// Remove every watch. The caller disposes them.
    pub fn drain(&mut self) -> Vec<Watch> {
        self.watches.drain().map(|(_, watch)| watch).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::watcher::ManualChangeNotifier;

    #[test]
    fn test_insert_if_absent_is_idempotent() {
        let mut registry = WatchRegistry::new();
        let path = WatchedPath::new("/a/A.dll");

        assert!(registry.insert_if_absent(&path).is_some());
        assert!(registry.insert_if_absent(&path).is_none());
        assert!(
            registry
                .insert_if_absent(&WatchedPath::new("/A/a.DLL"))
                .is_none()
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove_generation_spares_successor() {
        let mut registry = WatchRegistry::new();
        let path = WatchedPath::new("/a/A.dll");

        let first = registry.insert_if_absent(&path).unwrap();
        registry.remove(&path).unwrap();
        let second = registry.insert_if_absent(&path).unwrap();
        assert_ne!(first.generation(), second.generation());

        assert!(
            registry
                .remove_generation(&path, first.generation())
                .is_none()
        );
        assert!(registry.contains(&path));
        assert!(
            registry
                .remove_generation(&path, second.generation())
                .is_some()
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_arm_then_dispose_unsubscribes_once() {
        let notifier = ManualChangeNotifier::new();
        let mut registry = WatchRegistry::new();
        let watch = registry
            .insert_if_absent(&WatchedPath::new("/a/A.dll"))
            .unwrap();

        assert!(watch.arm(&notifier, Arc::new(|_| {})).unwrap());
        assert!(notifier.is_subscribed("/a/A.dll"));

        assert!(watch.dispose(&notifier));
        assert!(!watch.dispose(&notifier));
        assert!(watch.is_disposed());
        assert_eq!(notifier.unsubscribe_count(), 1);
        assert_eq!(notifier.subscription_count(), 0);
    }

    #[test]
    fn test_arm_after_dispose_releases_subscription() {
        let notifier = ManualChangeNotifier::new();
        let mut registry = WatchRegistry::new();
        let watch = registry
            .insert_if_absent(&WatchedPath::new("/a/A.dll"))
            .unwrap();

        assert!(watch.dispose(&notifier));
        assert!(!watch.arm(&notifier, Arc::new(|_| {})).unwrap());
        assert_eq!(notifier.subscription_count(), 0);
    }

    #[test]
    fn test_drain_empties_registry() {
        let mut registry = WatchRegistry::new();
        registry.insert_if_absent(&WatchedPath::new("/a/A.dll"));
        registry.insert_if_absent(&WatchedPath::new("/a/B.dll"));

        let drained = registry.drain();
        assert_eq!(drained.len(), 2);
        assert!(registry.is_empty());
    }
}
