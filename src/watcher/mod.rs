//! Per-file change watches for loaded analyzer binaries.
//!
//! # Architecture
//!
//! ```text
//! StalenessTracker
//!   - WatchRegistry (one Watch per path, under the tracker lock)
//!         |
//!    Watch::arm / Watch::dispose
//!         |
//!   dyn ChangeNotifier
//!    +----------------+--------------------+
//!    |                                     |
//! FsChangeNotifier                 ManualChangeNotifier
//!   notify watcher per dir           explicit trigger()
//!   -> channel -> dispatch thread
//! ```

mod error;
mod fs_notifier;
mod notifier;
mod registry;

pub use error::WatchError;
pub use fs_notifier::FsChangeNotifier;
pub use notifier::{ChangeCallback, ChangeNotifier, ManualChangeNotifier, SubscriptionId};
pub use registry::{Watch, WatchGeneration, WatchRegistry};
