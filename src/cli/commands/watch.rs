//! Watch command - load files as analyzers and report staleness.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::config::Settings;
use crate::host::{
    ChannelDiagnosticSink, DiagnosticEvent, LoadEvent, ManualAssemblyLoader,
    StaticProjectDirectory,
};
use crate::staleness::StalenessTracker;
use crate::types::WatchedPath;
use crate::watcher::FsChangeNotifier;

pub async fn run_watch(
    files: Vec<PathBuf>,
    projects: Vec<String>,
    via: Vec<(PathBuf, PathBuf)>,
    settings: &Settings,
) -> anyhow::Result<()> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let loader = Arc::new(ManualAssemblyLoader::new());
    let directory = Arc::new(StaticProjectDirectory::new());
    let notifier = Arc::new(FsChangeNotifier::with_config(&settings.watcher)?);

    let tracker = StalenessTracker::builder()
        .settings(settings)
        .loader(loader.clone())
        .notifier(notifier)
        .diagnostics(Arc::new(ChannelDiagnosticSink::new(tx)))
        .projects(directory.clone())
        .build()?;

    let sources: HashMap<WatchedPath, PathBuf> = via
        .into_iter()
        .map(|(copy, source)| (WatchedPath::new(copy), source))
        .collect();

    let pending = load_files(&tracker, &loader, &directory, &files, &projects, &sources);

    if pending.is_empty() {
        anyhow::bail!("none of the given files could be watched");
    }
    println!(
        "Watching {} analyzer file(s). Press Ctrl-C to stop.",
        pending.len()
    );

    // Ends once every pending watch fired, or when the tracker (and its
    // sender) is dropped.
    let printer = tokio::task::spawn_blocking(move || report_until_fired(&rx, pending));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("Stopped.");
        }
        fired = printer => {
            println!("All {} watched file(s) changed on disk.", fired?);
        }
    }

    drop(tracker);
    Ok(())
}

/// Load every file, returning the paths still watched after their load.
///
/// A file that changes before the check has fired already and is not
/// waited for.
fn load_files(
    tracker: &StalenessTracker,
    loader: &ManualAssemblyLoader,
    directory: &StaticProjectDirectory,
    files: &[PathBuf],
    projects: &[String],
    sources: &HashMap<WatchedPath, PathBuf>,
) -> HashSet<WatchedPath> {
    let mut pending = HashSet::new();
    for file in files {
        let mut event = LoadEvent::new(file);
        let mut root = file.clone();
        if let Some(source) = sources.get(&WatchedPath::new(file)) {
            event = event.requested_by(source);
            root = source.clone();
        }
        for project in projects {
            directory.add_reference(project.as_str(), &root);
        }
        loader.load(event);
        if tracker.has_watch(file) {
            pending.insert(WatchedPath::new(file));
        }
    }
    pending
}

/// Print raised diagnostics until every pending path fired or the channel
/// closes. Returns the number of pending paths that fired.
fn report_until_fired(rx: &Receiver<DiagnosticEvent>, mut pending: HashSet<WatchedPath>) -> usize {
    let mut fired = 0;
    for event in rx.iter() {
        if let DiagnosticEvent::Raised(diagnostic) = event {
            println!(
                "{} [{}] {}: {}",
                diagnostic.severity, diagnostic.key.error_id, diagnostic.project, diagnostic.message
            );
            if pending.remove(&diagnostic.key.path) {
                fired += 1;
            }
            if pending.is_empty() {
                break;
            }
        }
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{AssemblyLoader, InMemoryDiagnostics};
    use crate::types::{Diagnostic, DiagnosticKey, ProjectId, Severity};
    use crate::watcher::ManualChangeNotifier;

    fn raised(project: &str, path: &str) -> DiagnosticEvent {
        DiagnosticEvent::Raised(Diagnostic {
            project: ProjectId::from(project),
            key: DiagnosticKey::new("IDE1004", WatchedPath::new(path)),
            severity: Severity::Warning,
            message: String::new(),
        })
    }

    #[test]
    fn test_file_changed_during_load_is_not_pending() {
        let loader = Arc::new(ManualAssemblyLoader::new());
        let notifier = Arc::new(ManualChangeNotifier::new());
        let directory = Arc::new(StaticProjectDirectory::new());
        let tracker = StalenessTracker::builder()
            .loader(loader.clone())
            .notifier(notifier.clone())
            .diagnostics(Arc::new(InMemoryDiagnostics::new()))
            .projects(directory.clone())
            .build()
            .unwrap();

        // Runs after the tracker's own handler, so B fires before the check
        let trigger = notifier.clone();
        loader.subscribe_loads(Arc::new(move |event: &LoadEvent| {
            if event.path.ends_with("B.dll") {
                trigger.trigger(&event.path);
            }
        }));

        let files = vec![PathBuf::from("/w/A.dll"), PathBuf::from("/w/B.dll")];
        let pending = load_files(
            &tracker,
            &loader,
            &directory,
            &files,
            &["app".to_string()],
            &HashMap::new(),
        );

        assert_eq!(pending, HashSet::from([WatchedPath::new("/w/A.dll")]));
        assert!(tracker.has_watch("/w/A.dll"));
    }

    #[test]
    fn test_report_waits_for_every_pending_path() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pending = HashSet::from([WatchedPath::new("/w/A.dll"), WatchedPath::new("/w/B.dll")]);

        tx.send(raised("app", "/w/C.dll")).unwrap();
        tx.send(raised("app", "/w/A.dll")).unwrap();
        tx.send(raised("tests", "/w/A.dll")).unwrap();
        tx.send(raised("app", "/w/B.dll")).unwrap();
        tx.send(raised("app", "/w/D.dll")).unwrap();

        assert_eq!(report_until_fired(&rx, pending), 2);
        // Stopped right after the last pending path
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn test_report_ends_when_channel_closes() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let pending = HashSet::from([WatchedPath::new("/w/A.dll"), WatchedPath::new("/w/B.dll")]);

        tx.send(raised("app", "/w/A.dll")).unwrap();
        drop(tx);

        assert_eq!(report_until_fired(&rx, pending), 1);
    }
}
