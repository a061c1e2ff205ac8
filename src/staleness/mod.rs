//! Stale analyzer detection.
//!
//! Records when each analyzer was loaded, watches it for changes, and raises
//! a diagnostic for every project referencing an analyzer whose file no
//! longer matches what the process loaded.

mod ledger;
mod reporter;
mod resolver;
mod tracker;

pub use ledger::LoadTimeLedger;
pub use reporter::{StalenessReporter, assess};
pub use resolver::{IndirectionResolver, Resolution, Truncation};
pub use tracker::{StalenessTracker, StalenessTrackerBuilder, TrackerStats};
