//! Stale analyzer detection for processes that load plugin binaries.
//!
//! A process that has loaded an analyzer binary keeps running that code
//! even after the file changes on disk. [`StalenessTracker`] records the
//! timestamp of every loaded analyzer, watches each file once, and raises a
//! warning diagnostic for every project that references an analyzer whose
//! file no longer matches what was loaded.

pub mod cli;
pub mod config;
pub mod host;
pub mod logging;
pub mod staleness;
pub mod timestamp;
pub mod types;
pub mod watcher;

pub use config::Settings;
pub use host::{AssemblyLoader, DiagnosticSink, LoadEvent, ProjectDirectory};
pub use staleness::{StalenessTracker, StalenessTrackerBuilder, TrackerStats};
pub use timestamp::{FsTimestamps, TimestampSource, effective_timestamp};
pub use types::{Diagnostic, DiagnosticKey, ProjectId, Severity, Staleness, WatchedPath};
pub use watcher::{ChangeNotifier, FsChangeNotifier, ManualChangeNotifier, WatchError};
