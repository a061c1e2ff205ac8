//! The staleness tracker: load ingestion, watch lifecycle and checks.
//!
//! All mutation of the watch registry and the load-time ledger goes through
//! one lock. The lock is never held while calling the notifier, the loader,
//! the diagnostic sink or the project directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::SystemTime;

use parking_lot::Mutex;

use super::ledger::LoadTimeLedger;
use super::reporter::{StalenessReporter, assess};
use super::resolver::{IndirectionResolver, Resolution};
use crate::config::{Settings, StalenessConfig};
use crate::host::{
    AssemblyLoader, DiagnosticSink, LoadEvent, LoadSubscriptionId, ProjectDirectory,
};
use crate::timestamp::{FsTimestamps, TimestampSource};
use crate::types::{ProjectId, Staleness, WatchedPath};
use crate::watcher::{
    ChangeCallback, ChangeNotifier, Watch, WatchError, WatchGeneration, WatchRegistry,
};

/// State guarded by the tracker lock.
#[derive(Debug, Default)]
struct TrackerState {
    watches: WatchRegistry,
    ledger: LoadTimeLedger,
}

/// Snapshot of tracker bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerStats {
    /// Paths with a live watch.
    pub watched: usize,
    /// Paths with a recorded load time.
    pub loaded: usize,
}

struct TrackerInner {
    state: Mutex<TrackerState>,
    loader: Arc<dyn AssemblyLoader>,
    notifier: Arc<dyn ChangeNotifier>,
    timestamps: Arc<dyn TimestampSource>,
    reporter: StalenessReporter,
    resolver: IndirectionResolver,
}

impl TrackerInner {
    fn on_assembly_loaded(self: &Arc<Self>, path: &Path, requesting_path: Option<&Path>) {
        let path = WatchedPath::new(path);
        match requesting_path {
            Some(requesting) => {
                crate::log_event!("tracker", "loaded", "{path} (for {})", requesting.display())
            }
            None => crate::log_event!("tracker", "loaded", "{path}"),
        }

        let loaded_at = self.timestamps.effective_timestamp(path.as_path());

        let new_watch = {
            let mut state = self.state.lock();
            match loaded_at {
                Some(loaded_at) => {
                    state.ledger.record_load(path.clone(), loaded_at);
                }
                None => crate::debug_event!("tracker", "no timestamp at load", "{path}"),
            }
            state.watches.insert_if_absent(&path)
        };

        if let Some(watch) = new_watch {
            self.arm(watch);
        }
    }

    fn ensure_watch(self: &Arc<Self>, path: &WatchedPath) -> bool {
        let new_watch = self.state.lock().watches.insert_if_absent(path);
        match new_watch {
            Some(watch) => self.arm(watch),
            None => {
                crate::debug_event!("registry", "already watching", "{path}");
                false
            }
        }
    }

    /// Subscribe a freshly inserted watch. On failure the entry is dropped
    /// so a later load can try again.
    fn arm(self: &Arc<Self>, watch: Watch) -> bool {
        let callback = self.fire_callback(&watch);
        match watch.arm(self.notifier.as_ref(), callback) {
            Ok(true) => {
                crate::debug_event!("registry", "watching", "{}", watch.path());
                true
            }
            Ok(false) => {
                crate::debug_event!("registry", "retired before armed", "{}", watch.path());
                false
            }
            Err(e) => {
                tracing::warn!("[registry] cannot watch {}: {e}", watch.path());
                let removed = self
                    .state
                    .lock()
                    .watches
                    .remove_generation(watch.path(), watch.generation());
                if let Some(removed) = removed {
                    removed.dispose(self.notifier.as_ref());
                }
                false
            }
        }
    }

    fn fire_callback(self: &Arc<Self>, watch: &Watch) -> ChangeCallback {
        let inner: Weak<Self> = Arc::downgrade(self);
        let guard = watch.clone();
        Arc::new(move |_changed: &Path| {
            // Disposed watches may still see an in-flight event.
            if guard.is_disposed() {
                return;
            }
            if let Some(inner) = inner.upgrade() {
                inner.fire(guard.path(), Some(guard.generation()));
            }
        })
    }

    /// Retire the watch for `path` and report it to every dependent project.
    fn fire(&self, path: &WatchedPath, generation: Option<WatchGeneration>) -> usize {
        let removed = {
            let mut state = self.state.lock();
            match generation {
                Some(generation) => state.watches.remove_generation(path, generation),
                None => state.watches.remove(path),
            }
        };

        let Some(watch) = removed else {
            crate::debug_event!("tracker", "fire ignored, not watched", "{path}");
            return 0;
        };
        // Unsubscribe first so a racing second event finds nothing to run.
        watch.dispose(self.notifier.as_ref());

        let Resolution { root, .. } = self.resolver.resolve(self.loader.as_ref(), path);
        crate::log_event!("tracker", "changed on disk", "{path} (root {root})");

        self.reporter.raise_for_dependents(&root, path)
    }

    fn remove_and_dispose(&self, path: &WatchedPath) -> bool {
        let removed = self.state.lock().watches.remove(path);
        match removed {
            Some(watch) => watch.dispose(self.notifier.as_ref()),
            None => false,
        }
    }

    fn check_if_stale(&self, project: &ProjectId, path: &WatchedPath) -> Staleness {
        let Some(loaded_at) = self.state.lock().ledger.load_time(path) else {
            return Staleness::NoInformation;
        };

        let on_disk = self.timestamps.effective_timestamp(path.as_path());
        let staleness = assess(loaded_at, on_disk);
        match staleness {
            Staleness::Stale { .. } => self.reporter.raise(project, path),
            Staleness::NoInformation => {
                crate::debug_event!("tracker", "timestamp unreadable", "{path}")
            }
            Staleness::Fresh => {}
        }
        staleness
    }
}

/// Detects analyzer binaries that changed on disk after being loaded.
///
/// Subscribes to the loader's load events for its whole lifetime. Every
/// loaded path gets one change watch; the first change retires the watch and
/// raises a diagnostic for each project referencing the analyzer. Loading
/// the same path again arms a new watch.
///
/// # Example
/// ```ignore
/// let tracker = StalenessTracker::builder()
///     .loader(loader)
///     .notifier(Arc::new(FsChangeNotifier::new()?))
///     .diagnostics(sink)
///     .projects(projects)
///     .build()?;
///
/// if tracker.check_if_stale(&project, analyzer_path).is_stale() {
///     // diagnostic already raised
/// }
/// ```
pub struct StalenessTracker {
    inner: Arc<TrackerInner>,
    load_subscription: Option<LoadSubscriptionId>,
}

impl StalenessTracker {
    pub fn builder() -> StalenessTrackerBuilder {
        StalenessTrackerBuilder::new()
    }

    /// Record a load of `path` and make sure it is watched.
    ///
    /// Called by the loader subscription; exposed for hosts that deliver
    /// load events themselves.
    pub fn on_assembly_loaded(&self, path: impl AsRef<Path>, requesting_path: Option<&Path>) {
        self.inner
            .on_assembly_loaded(path.as_ref(), requesting_path);
    }

    /// Compare the recorded load time of `path` with the file on disk,
    /// raising a diagnostic for `project` when they differ.
    pub fn check_if_stale(&self, project: &ProjectId, path: impl AsRef<Path>) -> Staleness {
        self.inner
            .check_if_stale(project, &WatchedPath::new(path.as_ref()))
    }

    /// Handle a change of `path`: retire its watch and raise diagnostics for
    /// every project referencing the resolved root.
    ///
    /// Returns the number of diagnostics raised; `0` if `path` was not
    /// watched (already fired or removed).
    pub fn on_watch_fired(&self, path: impl AsRef<Path>) -> usize {
        self.inner.fire(&WatchedPath::new(path.as_ref()), None)
    }

    /// Install a watch for `path` unless one exists. Returns whether a new
    /// watch was armed.
    pub fn ensure_watch(&self, path: impl AsRef<Path>) -> bool {
        self.inner.ensure_watch(&WatchedPath::new(path.as_ref()))
    }

    /// Remove and dispose the watch for `path`, if any.
    pub fn remove_and_dispose(&self, path: impl AsRef<Path>) -> bool {
        self.inner
            .remove_and_dispose(&WatchedPath::new(path.as_ref()))
    }

    /// Withdraw the staleness diagnostic for `project` and `path`.
    pub fn remove_analyzer_already_loaded_diagnostics(
        &self,
        project: &ProjectId,
        path: impl AsRef<Path>,
    ) {
        self.inner
            .reporter
            .withdraw(project, &WatchedPath::new(path.as_ref()));
    }

    /// Root of the indirection chain starting at `path`.
    pub fn resolve_root(&self, path: impl AsRef<Path>) -> WatchedPath {
        self.inner
            .resolver
            .resolve(self.inner.loader.as_ref(), &WatchedPath::new(path.as_ref()))
            .root
    }

    pub fn load_time(&self, path: impl AsRef<Path>) -> Option<SystemTime> {
        self.inner
            .state
            .lock()
            .ledger
            .load_time(&WatchedPath::new(path.as_ref()))
    }

    pub fn has_watch(&self, path: impl AsRef<Path>) -> bool {
        self.inner
            .state
            .lock()
            .watches
            .contains(&WatchedPath::new(path.as_ref()))
    }

    pub fn watch_count(&self) -> usize {
        self.inner.state.lock().watches.len()
    }

    /// Paths currently watched.
    pub fn tracked_paths(&self) -> Vec<PathBuf> {
        self.inner
            .state
            .lock()
            .watches
            .paths()
            .map(|p| p.as_path().to_path_buf())
            .collect()
    }

    pub fn stats(&self) -> TrackerStats {
        let state = self.inner.state.lock();
        TrackerStats {
            watched: state.watches.len(),
            loaded: state.ledger.len(),
        }
    }
}

impl Drop for StalenessTracker {
    fn drop(&mut self) {
        if let Some(id) = self.load_subscription.take() {
            self.inner.loader.unsubscribe_loads(id);
        }

        let remaining = self.inner.state.lock().watches.drain();
        let count = remaining.len();
        for watch in remaining {
            watch.dispose(self.inner.notifier.as_ref());
        }
        crate::debug_event!("tracker", "shut down", "{count} watches disposed");
    }
}

/// Builder for constructing a [`StalenessTracker`].
pub struct StalenessTrackerBuilder {
    loader: Option<Arc<dyn AssemblyLoader>>,
    notifier: Option<Arc<dyn ChangeNotifier>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    projects: Option<Arc<dyn ProjectDirectory>>,
    timestamps: Arc<dyn TimestampSource>,
    config: StalenessConfig,
}

impl StalenessTrackerBuilder {
    pub fn new() -> Self {
        Self {
            loader: None,
            notifier: None,
            diagnostics: None,
            projects: None,
            timestamps: Arc::new(FsTimestamps),
            config: StalenessConfig::default(),
        }
    }

    /// Set the plugin loader whose load events are tracked.
    pub fn loader(mut self, loader: Arc<dyn AssemblyLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Set the change notifier used for watches.
    pub fn notifier(mut self, notifier: Arc<dyn ChangeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Set the diagnostic aggregator.
    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Set the project directory.
    pub fn projects(mut self, projects: Arc<dyn ProjectDirectory>) -> Self {
        self.projects = Some(projects);
        self
    }

    /// Replace the file system timestamp source.
    pub fn timestamps(mut self, timestamps: Arc<dyn TimestampSource>) -> Self {
        self.timestamps = timestamps;
        self
    }

    pub fn config(mut self, config: StalenessConfig) -> Self {
        self.config = config;
        self
    }

    pub fn settings(self, settings: &Settings) -> Self {
        self.config(settings.staleness.clone())
    }

    /// Build the tracker and subscribe it to the loader's load events.
    pub fn build(self) -> Result<StalenessTracker, WatchError> {
        let loader = self.loader.ok_or_else(|| WatchError::InitFailed {
            reason: "Loader is required".to_string(),
        })?;
        let notifier = self.notifier.ok_or_else(|| WatchError::InitFailed {
            reason: "Notifier is required".to_string(),
        })?;
        let diagnostics = self.diagnostics.ok_or_else(|| WatchError::InitFailed {
            reason: "Diagnostic sink is required".to_string(),
        })?;
        let projects = self.projects.ok_or_else(|| WatchError::InitFailed {
            reason: "Project directory is required".to_string(),
        })?;

        let inner = Arc::new(TrackerInner {
            state: Mutex::new(TrackerState::default()),
            loader: loader.clone(),
            notifier,
            timestamps: self.timestamps,
            reporter: StalenessReporter::new(diagnostics, projects, &self.config),
            resolver: IndirectionResolver::new(self.config.max_indirection_hops),
        });

        let weak = Arc::downgrade(&inner);
        let load_subscription = loader.subscribe_loads(Arc::new(move |event: &LoadEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_assembly_loaded(&event.path, event.requesting_path.as_deref());
            }
        }));

        crate::debug_event!(
            "tracker",
            "started",
            "max {} indirection hops",
            self.config.max_indirection_hops
        );

        Ok(StalenessTracker {
            inner,
            load_subscription: Some(load_subscription),
        })
    }
}

impl Default for StalenessTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
