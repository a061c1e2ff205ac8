//! Collaborators the tracker depends on but does not own.
//!
//! The plugin loader, the diagnostic aggregator and the project directory
//! live in the host process. The tracker only sees them through these
//! traits, injected at construction time.
//!
//! In-memory implementations are provided in [`memory`] for tests and for
//! the `stalewatch` binary.

pub mod memory;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{Diagnostic, DiagnosticKey, ProjectId};

pub use memory::{
    ChannelDiagnosticSink, DiagnosticEvent, InMemoryDiagnostics, ManualAssemblyLoader,
    StaticProjectDirectory,
};

/// A plugin binary was loaded into the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEvent {
    /// Path of the file that was actually loaded.
    pub path: PathBuf,
    /// Path whose request caused the load (shadow copy source, redirect).
    pub requesting_path: Option<PathBuf>,
}

impl LoadEvent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            requesting_path: None,
        }
    }

    pub fn requested_by(mut self, requesting_path: impl Into<PathBuf>) -> Self {
        self.requesting_path = Some(requesting_path.into());
        self
    }
}

/// Callback invoked for every load event, on the loader's thread.
pub type LoadHandler = Arc<dyn Fn(&LoadEvent) + Send + Sync>;

/// Handle returned by [`AssemblyLoader::subscribe_loads`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoadSubscriptionId(pub u64);

/// The plugin loading mechanism.
pub trait AssemblyLoader: Send + Sync {
    /// Start receiving load events.
    fn subscribe_loads(&self, handler: LoadHandler) -> LoadSubscriptionId;

    /// Stop receiving load events. Unknown ids are ignored.
    fn unsubscribe_loads(&self, id: LoadSubscriptionId);

    /// The path whose request caused `path` to be loaded, if any.
    fn requesting_path_of(&self, path: &Path) -> Option<PathBuf>;
}

/// The diagnostic aggregator.
///
/// `raise` replaces any diagnostic with the same project and key.
pub trait DiagnosticSink: Send + Sync {
    fn raise(&self, diagnostic: Diagnostic);

    fn withdraw(&self, project: &ProjectId, key: &DiagnosticKey);
}

/// Knows which projects reference which analyzer files.
pub trait ProjectDirectory: Send + Sync {
    fn projects_referencing_analyzer(&self, path: &Path) -> Vec<ProjectId>;
}
