//! Indirection resolver.
//!
//! A loaded analyzer can be a shadow copy or redirect of the file the user
//! actually edits. The loader knows which path requested each load; walking
//! those links backwards yields the root path projects reference.

use std::collections::HashSet;

use crate::host::AssemblyLoader;
use crate::types::WatchedPath;

/// Why a walk stopped before reaching a path with no requesting link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Truncation {
    HopLimit,
    Cycle,
}

/// Outcome of walking an indirection chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Last path reached.
    pub root: WatchedPath,
    /// Links followed.
    pub hops: usize,
    pub truncated: Option<Truncation>,
}

/// Follows requesting-path links up to a fixed number of hops.
#[derive(Debug, Clone, Copy)]
pub struct IndirectionResolver {
    max_hops: usize,
}

impl IndirectionResolver {
    pub fn new(max_hops: usize) -> Self {
        Self { max_hops }
    }

    /// Walk from `path` to its root.
    ///
    /// Never fails: a chain longer than the hop limit, or one that revisits a
    /// path, stops at the last path reached.
    pub fn resolve(&self, loader: &dyn AssemblyLoader, path: &WatchedPath) -> Resolution {
        let mut current = path.clone();
        let mut visited = HashSet::from([current.clone()]);
        let mut hops = 0;

        loop {
            let Some(next) = loader.requesting_path_of(current.as_path()) else {
                return Resolution {
                    root: current,
                    hops,
                    truncated: None,
                };
            };

            let truncated = if hops == self.max_hops {
                Some(Truncation::HopLimit)
            } else {
                let next = WatchedPath::new(next);
                if visited.insert(next.clone()) {
                    current = next;
                    hops += 1;
                    continue;
                }
                Some(Truncation::Cycle)
            };

            tracing::warn!(
                "[resolver] indirection chain from {path} truncated after {hops} hops ({truncated:?})"
            );
            return Resolution {
                root: current,
                hops,
                truncated,
            };
        }
    }
}

impl Default for IndirectionResolver {
    fn default() -> Self {
        Self::new(64)
    }
}
