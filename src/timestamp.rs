//! Effective last-touched timestamps for analyzer files.
//!
//! The effective timestamp is the later of creation time and last-write
//! time. Copy operations can move creation time past the write time, so
//! neither alone is a reliable signal. Any stat failure yields `None`.

use std::path::Path;
use std::time::SystemTime;

/// Source of effective timestamps.
///
/// The tracker uses [`FsTimestamps`] by default; tests substitute a
/// scripted source.
pub trait TimestampSource: Send + Sync {
    /// Effective timestamp of `path`, or `None` when it cannot be read.
    fn effective_timestamp(&self, path: &Path) -> Option<SystemTime>;
}

/// Reads timestamps from the file system.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsTimestamps;

impl TimestampSource for FsTimestamps {
    fn effective_timestamp(&self, path: &Path) -> Option<SystemTime> {
        effective_timestamp(path)
    }
}

/// Later of creation and last-write time, `None` if the file can't be statted.
///
/// Platforms without creation time support fall back to the write time.
pub fn effective_timestamp(path: &Path) -> Option<SystemTime> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) => {
            crate::debug_event!("timestamp", "unreadable", "{}: {e}", path.display());
            return None;
        }
    };

    let modified = metadata.modified().ok();
    let created = metadata.created().ok();

    match (created, modified) {
        (Some(c), Some(m)) => Some(c.max(m)),
        (c, m) => c.or(m),
    }
}
