//! `notify`-backed change notifier.
//!
//! One OS watch is installed per parent directory (non-recursive) and
//! reference counted across the files subscribed in it. Raw events are
//! forwarded over a channel to a dispatch thread, which routes them to the
//! callbacks of the exact files that changed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, unbounded};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;

use super::WatchError;
use super::notifier::{ChangeCallback, ChangeNotifier, SubscriptionId};
use crate::config::WatcherConfig;
use crate::types::WatchedPath;

/// Subscriptions, keyed both ways.
#[derive(Default)]
struct Routes {
    by_id: HashMap<SubscriptionId, (WatchedPath, ChangeCallback)>,
    by_path: HashMap<WatchedPath, Vec<SubscriptionId>>,
}

impl Routes {
    fn callbacks_for(&self, path: &WatchedPath) -> Vec<ChangeCallback> {
        self.by_path
            .get(path)
            .into_iter()
            .flatten()
            .filter_map(|id| self.by_id.get(id).map(|(_, cb)| cb.clone()))
            .collect()
    }

    fn remove(&mut self, id: SubscriptionId) -> Option<WatchedPath> {
        let (path, _) = self.by_id.remove(&id)?;
        if let Some(ids) = self.by_path.get_mut(&path) {
            ids.retain(|other| *other != id);
            if ids.is_empty() {
                self.by_path.remove(&path);
            }
        }
        Some(path)
    }
}

/// The OS watcher plus per-directory reference counts.
struct DirWatches {
    watcher: Box<dyn Watcher + Send>,
    dirs: HashMap<PathBuf, usize>,
}

/// Change notifier backed by the platform file watcher.
pub struct FsChangeNotifier {
    routes: Arc<Mutex<Routes>>,
    // Lock order: `watches` before `routes`. The dispatch thread only takes
    // `routes`, and never while running callbacks.
    watches: Mutex<Option<DirWatches>>,
    next_id: AtomicU64,
    dispatcher: Option<JoinHandle<()>>,
}

impl FsChangeNotifier {
    /// Create a notifier using the platform's recommended watcher.
    pub fn new() -> Result<Self, WatchError> {
        Self::with_config(&WatcherConfig::default())
    }

    /// Create a notifier; a configured poll interval selects the polling
    /// watcher for file systems without native change events.
    pub fn with_config(config: &WatcherConfig) -> Result<Self, WatchError> {
        // Unbounded so the OS watcher thread never blocks: callbacks call
        // `unwatch`, which waits on that thread.
        let (tx, rx) = unbounded::<notify::Result<Event>>();
        let handler = move |res: notify::Result<Event>| {
            let _ = tx.send(res);
        };

        let watcher: Box<dyn Watcher + Send> = match config.poll_interval_ms {
            Some(ms) => {
                let poll_config =
                    notify::Config::default().with_poll_interval(Duration::from_millis(ms));
                Box::new(notify::PollWatcher::new(handler, poll_config)?)
            }
            None => Box::new(notify::recommended_watcher(handler)?),
        };

        let routes = Arc::new(Mutex::new(Routes::default()));
        let dispatch_routes = routes.clone();
        let dispatcher = std::thread::Builder::new()
            .name("stalewatch-dispatch".to_string())
            .spawn(move || dispatch_loop(rx, dispatch_routes))
            .map_err(|e| WatchError::InitFailed {
                reason: format!("failed to spawn dispatch thread: {e}"),
            })?;

        Ok(Self {
            routes,
            watches: Mutex::new(Some(DirWatches {
                watcher,
                dirs: HashMap::new(),
            })),
            next_id: AtomicU64::new(0),
            dispatcher: Some(dispatcher),
        })
    }

    /// Number of directories with an active OS watch.
    pub fn watched_dir_count(&self) -> usize {
        self.watches
            .lock()
            .as_ref()
            .map(|w| w.dirs.len())
            .unwrap_or(0)
    }

    pub fn subscription_count(&self) -> usize {
        self.routes.lock().by_id.len()
    }
}

impl ChangeNotifier for FsChangeNotifier {
    fn subscribe(
        &self,
        path: &WatchedPath,
        callback: ChangeCallback,
    ) -> Result<SubscriptionId, WatchError> {
        let dir = path.parent_dir();
        let mut guard = self.watches.lock();
        let watches = guard.as_mut().ok_or(WatchError::ShutDown)?;

        let count = watches.dirs.get(&dir).copied().unwrap_or(0);
        if count == 0 {
            watches
                .watcher
                .watch(&dir, RecursiveMode::NonRecursive)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: dir.clone(),
                    reason: e.to_string(),
                })?;
            crate::debug_event!("notifier", "watching", "{}", dir.display());
        }
        watches.dirs.insert(dir, count + 1);

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut routes = self.routes.lock();
        routes.by_id.insert(id, (path.clone(), callback));
        routes.by_path.entry(path.clone()).or_default().push(id);

        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        let mut guard = self.watches.lock();
        let Some(path) = self.routes.lock().remove(id) else {
            return;
        };
        let Some(watches) = guard.as_mut() else {
            return;
        };

        let dir = path.parent_dir();
        match watches.dirs.get_mut(&dir) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                watches.dirs.remove(&dir);
                if let Err(e) = watches.watcher.unwatch(&dir) {
                    // Directory may already be gone
                    crate::debug_event!("notifier", "unwatch failed", "{}: {e}", dir.display());
                } else {
                    crate::debug_event!("notifier", "unwatched", "{}", dir.display());
                }
            }
            None => {}
        }
    }
}

impl Drop for FsChangeNotifier {
    fn drop(&mut self) {
        // Dropping the OS watcher drops the channel sender, ending the loop.
        self.watches.lock().take();

        if let Some(handle) = self.dispatcher.take() {
            // The last owner may be a callback running on the dispatch thread.
            if handle.thread().id() != std::thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

fn dispatch_loop(rx: Receiver<notify::Result<Event>>, routes: Arc<Mutex<Routes>>) {
    for res in rx.iter() {
        match res {
            Ok(event) => dispatch_event(&event, &routes),
            Err(e) => {
                let error = WatchError::EventError {
                    details: e.to_string(),
                };
                tracing::error!("[notifier] {error}");
            }
        }
    }
    crate::debug_event!("notifier", "dispatch stopped");
}

fn is_change(kind: &EventKind) -> bool {
    !matches!(kind, EventKind::Access(_))
}

fn dispatch_event(event: &Event, routes: &Mutex<Routes>) {
    if !is_change(&event.kind) {
        return;
    }

    for path in &event.paths {
        let watched = WatchedPath::new(path);
        let callbacks = routes.lock().callbacks_for(&watched);
        if callbacks.is_empty() {
            tracing::trace!("[notifier] unmatched {:?} {}", event.kind, path.display());
            continue;
        }

        crate::debug_event!("notifier", "changed", "{:?} {}", event.kind, path.display());
        for callback in callbacks {
            callback(path);
        }
    }
}
