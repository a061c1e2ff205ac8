//! Core identifiers shared by the watcher and staleness modules.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// Normalized absolute path of a watched analyzer file.
///
/// Equality and hashing ignore ASCII and Unicode case, matching the
/// file systems analyzers are usually loaded from. The original spelling is
/// kept for display and for stat calls.
#[derive(Clone)]
pub struct WatchedPath {
    path: Arc<PathBuf>,
    folded: Arc<[u8]>,
}

impl WatchedPath {
    /// Normalize `path`: relative paths are joined onto the current
    /// directory, `.` and `..` components are resolved lexically.
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };

        let normalized = normalize_lexically(&absolute);
        let folded = fold_case(&normalized);

        Self {
            path: Arc::new(normalized),
            folded,
        }
    }

    pub fn as_path(&self) -> &Path {
        &self.path
    }

    /// Parent directory, or the path itself for a root.
    pub fn parent_dir(&self) -> PathBuf {
        self.path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.path.as_ref().clone())
    }

    /// Compare against an arbitrary path with the same case folding.
    pub fn matches(&self, other: &Path) -> bool {
        *self == WatchedPath::new(other)
    }
}

/// Case-folded comparison key. Non-UTF-8 paths keep their raw bytes with
/// ASCII folding only, so distinct invalid names never collide.
fn fold_case(path: &Path) -> Arc<[u8]> {
    match path.to_str() {
        Some(s) => s.to_lowercase().into_bytes().into(),
        None => path.as_os_str().as_encoded_bytes().to_ascii_lowercase().into(),
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                // Never pop past the root or prefix.
                if !matches!(
                    out.components().next_back(),
                    None | Some(Component::RootDir) | Some(Component::Prefix(_))
                ) {
                    out.pop();
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

impl PartialEq for WatchedPath {
    fn eq(&self, other: &Self) -> bool {
        self.folded == other.folded
    }
}

impl Eq for WatchedPath {}

impl Hash for WatchedPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded.hash(state);
    }
}

impl fmt::Debug for WatchedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatchedPath({})", self.path.display())
    }
}

impl fmt::Display for WatchedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

impl From<&Path> for WatchedPath {
    fn from(path: &Path) -> Self {
        Self::new(path)
    }
}

impl From<PathBuf> for WatchedPath {
    fn from(path: PathBuf) -> Self {
        Self::new(path)
    }
}

impl From<&str> for WatchedPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Identifier of a consuming project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProjectId(Arc<str>);

impl ProjectId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Key of a staleness diagnostic: fixed error id plus the analyzer path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiagnosticKey {
    pub error_id: Arc<str>,
    pub path: WatchedPath,
}

impl DiagnosticKey {
    pub fn new(error_id: impl Into<Arc<str>>, path: WatchedPath) -> Self {
        Self {
            error_id: error_id.into(),
            path,
        }
    }
}

impl fmt::Display for DiagnosticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.error_id, self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    #[default]
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(s)
    }
}

/// A diagnostic handed to the aggregator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub project: ProjectId,
    pub key: DiagnosticKey,
    pub severity: Severity,
    pub message: String,
}

/// Result of an eager staleness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Staleness {
    /// Never observed as loaded, or the current timestamp cannot be read.
    NoInformation,
    /// On-disk timestamp matches the one recorded at load time.
    Fresh,
    /// On-disk timestamp differs; a diagnostic was raised.
    Stale {
        loaded_at: SystemTime,
        on_disk: SystemTime,
    },
}

impl Staleness {
    pub fn is_stale(&self) -> bool {
        matches!(self, Staleness::Stale { .. })
    }
}
