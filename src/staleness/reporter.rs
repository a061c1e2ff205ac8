//! Staleness decisions and diagnostic delivery.

use std::sync::Arc;
use std::time::SystemTime;

use crate::config::StalenessConfig;
use crate::host::{DiagnosticSink, ProjectDirectory};
use crate::types::{Diagnostic, DiagnosticKey, ProjectId, Severity, Staleness, WatchedPath};

/// Compare a recorded load time against the current on-disk timestamp.
///
/// Any difference counts, in either direction. An unreadable timestamp is
/// never reported as stale.
pub fn assess(loaded_at: SystemTime, on_disk: Option<SystemTime>) -> Staleness {
    match on_disk {
        None => Staleness::NoInformation,
        Some(on_disk) if on_disk == loaded_at => Staleness::Fresh,
        Some(on_disk) => Staleness::Stale { loaded_at, on_disk },
    }
}

/// Raises and withdraws staleness diagnostics through the aggregator.
pub struct StalenessReporter {
    diagnostics: Arc<dyn DiagnosticSink>,
    projects: Arc<dyn ProjectDirectory>,
    error_id: Arc<str>,
    severity: Severity,
}

impl StalenessReporter {
    pub fn new(
        diagnostics: Arc<dyn DiagnosticSink>,
        projects: Arc<dyn ProjectDirectory>,
        config: &StalenessConfig,
    ) -> Self {
        Self {
            diagnostics,
            projects,
            error_id: config.diagnostic_id.as_str().into(),
            severity: config.severity,
        }
    }

    pub fn key(&self, path: &WatchedPath) -> DiagnosticKey {
        DiagnosticKey::new(self.error_id.clone(), path.clone())
    }

    fn message(path: &WatchedPath) -> String {
        format!(
            "Analyzer assembly '{path}' has changed. Diagnostics may be incorrect until the host process is restarted."
        )
    }

    /// Raise (or replace) the diagnostic for `project` and `path`.
    pub fn raise(&self, project: &ProjectId, path: &WatchedPath) {
        tracing::warn!("[reporter] analyzer changed on disk: {path} (project {project})");
        self.diagnostics.raise(Diagnostic {
            project: project.clone(),
            key: self.key(path),
            severity: self.severity,
            message: Self::message(path),
        });
    }

    /// Raise for every project referencing `root`, keyed by `loaded`.
    ///
    /// Returns the number of diagnostics raised.
    pub fn raise_for_dependents(&self, root: &WatchedPath, loaded: &WatchedPath) -> usize {
        let projects = self.projects.projects_referencing_analyzer(root.as_path());
        if projects.is_empty() {
            crate::debug_event!("reporter", "no dependents", "{root}");
            return 0;
        }

        for project in &projects {
            self.raise(project, loaded);
        }
        projects.len()
    }

    pub fn withdraw(&self, project: &ProjectId, path: &WatchedPath) {
        crate::debug_event!("reporter", "withdraw", "{path} (project {project})");
        self.diagnostics.withdraw(project, &self.key(path));
    }
}
