//! In-memory collaborators.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::Sender;
use parking_lot::{Mutex, RwLock};

use super::{
    AssemblyLoader, DiagnosticSink, LoadEvent, LoadHandler, LoadSubscriptionId, ProjectDirectory,
};
use crate::types::{Diagnostic, DiagnosticKey, ProjectId, WatchedPath};

/// Loader driven by explicit `load` calls.
///
/// Records the requesting path of every load so indirection queries can be
/// answered, and fans events out to subscribers on the calling thread.
#[derive(Default)]
pub struct ManualAssemblyLoader {
    links: RwLock<HashMap<WatchedPath, PathBuf>>,
    subscribers: Mutex<Vec<(LoadSubscriptionId, LoadHandler)>>,
    next_id: AtomicU64,
}

impl ManualAssemblyLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `path` is loaded on behalf of `requesting_path`.
    pub fn link(&self, path: impl AsRef<Path>, requesting_path: impl Into<PathBuf>) {
        self.links
            .write()
            .insert(WatchedPath::new(path), requesting_path.into());
    }

    /// Report a load to every subscriber.
    pub fn load(&self, event: LoadEvent) {
        if let Some(requesting) = &event.requesting_path {
            self.link(&event.path, requesting.clone());
        }

        // Handlers run outside the lock so they may subscribe or unsubscribe.
        let handlers: Vec<LoadHandler> = self
            .subscribers
            .lock()
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();

        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl AssemblyLoader for ManualAssemblyLoader {
    fn subscribe_loads(&self, handler: LoadHandler) -> LoadSubscriptionId {
        let id = LoadSubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.lock().push((id, handler));
        id
    }

    fn unsubscribe_loads(&self, id: LoadSubscriptionId) {
        self.subscribers.lock().retain(|(sub, _)| *sub != id);
    }

    fn requesting_path_of(&self, path: &Path) -> Option<PathBuf> {
        self.links.read().get(&WatchedPath::new(path)).cloned()
    }
}

/// Aggregator that keeps the current diagnostics in a map.
#[derive(Debug, Default)]
pub struct InMemoryDiagnostics {
    active: Mutex<HashMap<(ProjectId, DiagnosticKey), Diagnostic>>,
    raised: AtomicUsize,
}

impl InMemoryDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics_for(&self, project: &ProjectId) -> Vec<Diagnostic> {
        self.active
            .lock()
            .values()
            .filter(|d| &d.project == project)
            .cloned()
            .collect()
    }

    pub fn contains(&self, project: &ProjectId, key: &DiagnosticKey) -> bool {
        self.active
            .lock()
            .contains_key(&(project.clone(), key.clone()))
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `raise` calls received, including replacements.
    pub fn raise_count(&self) -> usize {
        self.raised.load(Ordering::SeqCst)
    }
}

impl DiagnosticSink for InMemoryDiagnostics {
    fn raise(&self, diagnostic: Diagnostic) {
        self.raised.fetch_add(1, Ordering::SeqCst);
        self.active.lock().insert(
            (diagnostic.project.clone(), diagnostic.key.clone()),
            diagnostic,
        );
    }

    fn withdraw(&self, project: &ProjectId, key: &DiagnosticKey) {
        self.active.lock().remove(&(project.clone(), key.clone()));
    }
}

/// Diagnostic traffic forwarded by [`ChannelDiagnosticSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticEvent {
    Raised(Diagnostic),
    Withdrawn { project: ProjectId, key: DiagnosticKey },
}

/// Forwards every raise and withdraw over a channel.
#[derive(Debug, Clone)]
pub struct ChannelDiagnosticSink {
    sender: Sender<DiagnosticEvent>,
}

impl ChannelDiagnosticSink {
    pub fn new(sender: Sender<DiagnosticEvent>) -> Self {
        Self { sender }
    }
}

impl DiagnosticSink for ChannelDiagnosticSink {
    fn raise(&self, diagnostic: Diagnostic) {
        if self.sender.send(DiagnosticEvent::Raised(diagnostic)).is_err() {
            crate::debug_event!("diagnostics", "dropped", "receiver gone");
        }
    }

    fn withdraw(&self, project: &ProjectId, key: &DiagnosticKey) {
        let event = DiagnosticEvent::Withdrawn {
            project: project.clone(),
            key: key.clone(),
        };
        if self.sender.send(event).is_err() {
            crate::debug_event!("diagnostics", "dropped", "receiver gone");
        }
    }
}

/// Fixed mapping from analyzer path to referencing projects.
#[derive(Debug, Default)]
pub struct StaticProjectDirectory {
    references: RwLock<HashMap<WatchedPath, BTreeSet<ProjectId>>>,
}

impl StaticProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_reference(&self, project: impl Into<ProjectId>, analyzer: impl AsRef<Path>) {
        self.references
            .write()
            .entry(WatchedPath::new(analyzer))
            .or_default()
            .insert(project.into());
    }
}

impl ProjectDirectory for StaticProjectDirectory {
    fn projects_referencing_analyzer(&self, path: &Path) -> Vec<ProjectId> {
        self.references
            .read()
            .get(&WatchedPath::new(path))
            .map(|projects| projects.iter().cloned().collect())
            .unwrap_or_default()
    }
}
