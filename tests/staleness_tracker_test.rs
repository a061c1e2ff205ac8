//! End-to-end tracker scenarios against real files.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime};

use stalewatch::host::{InMemoryDiagnostics, ManualAssemblyLoader, StaticProjectDirectory};
use stalewatch::{
    DiagnosticKey, LoadEvent, ManualChangeNotifier, ProjectId, Staleness, StalenessTracker,
    WatchedPath,
};
use tempfile::TempDir;

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    loader: Arc<ManualAssemblyLoader>,
    notifier: Arc<ManualChangeNotifier>,
    diagnostics: Arc<InMemoryDiagnostics>,
    projects: Arc<StaticProjectDirectory>,
    tracker: StalenessTracker,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let root = dir.path().to_path_buf();
    let loader = Arc::new(ManualAssemblyLoader::new());
    let notifier = Arc::new(ManualChangeNotifier::new());
    let diagnostics = Arc::new(InMemoryDiagnostics::new());
    let projects = Arc::new(StaticProjectDirectory::new());

    let tracker = StalenessTracker::builder()
        .loader(loader.clone())
        .notifier(notifier.clone())
        .diagnostics(diagnostics.clone())
        .projects(projects.clone())
        .build()
        .unwrap();

    Fixture {
        _dir: dir,
        root,
        loader,
        notifier,
        diagnostics,
        projects,
        tracker,
    }
}

fn write_analyzer(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"analyzer v1").unwrap();
}

/// Move the last-write time an hour ahead of anything the file system set.
fn touch_future(path: &Path) {
    let secs = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))
        .unwrap();
}

fn key(path: &Path) -> DiagnosticKey {
    DiagnosticKey::new("IDE1004", WatchedPath::new(path))
}

#[test]
fn test_rewritten_analyzer_is_reported_stale() {
    let f = fixture();
    let analyzer = f.root.join("A.dll");
    write_analyzer(&analyzer);
    let project = ProjectId::from("app");
    f.projects.add_reference("app", &analyzer);

    f.loader.load(LoadEvent::new(&analyzer));
    assert!(f.tracker.has_watch(&analyzer));
    assert_eq!(f.tracker.check_if_stale(&project, &analyzer), Staleness::Fresh);
    assert!(f.diagnostics.is_empty());

    touch_future(&analyzer);

    assert!(f.tracker.check_if_stale(&project, &analyzer).is_stale());
    assert!(f.diagnostics.contains(&project, &key(&analyzer)));

    // Change event: retires the watch and raises through the directory
    assert_eq!(f.notifier.trigger(&analyzer), 1);
    assert!(!f.tracker.has_watch(&analyzer));
    // Same key replaces the eager diagnostic
    assert_eq!(f.diagnostics.len(), 1);
}

#[test]
fn test_deleted_analyzer_has_no_information() {
    let f = fixture();
    let analyzer = f.root.join("A.dll");
    write_analyzer(&analyzer);

    f.loader.load(LoadEvent::new(&analyzer));
    fs::remove_file(&analyzer).unwrap();

    assert_eq!(
        f.tracker
            .check_if_stale(&ProjectId::from("app"), &analyzer),
        Staleness::NoInformation
    );
    assert!(f.diagnostics.is_empty());
}

#[test]
fn test_missing_file_at_load_is_still_watched() {
    let f = fixture();
    let analyzer = f.root.join("never-written.dll");

    f.loader.load(LoadEvent::new(&analyzer));

    assert!(f.tracker.has_watch(&analyzer));
    assert_eq!(f.tracker.load_time(&analyzer), None);
}

#[test]
fn test_shadow_copy_reports_source_dependents() {
    let f = fixture();
    let source = f.root.join("src").join("B.dll");
    let shadow = f.root.join("shadow").join("B.dll");
    write_analyzer(&source);
    write_analyzer(&shadow);
    f.projects.add_reference("app", &source);
    f.projects.add_reference("tests", &source);

    f.loader.load(LoadEvent::new(&shadow).requested_by(&source));
    assert_eq!(f.tracker.resolve_root(&shadow), WatchedPath::new(&source));

    f.notifier.trigger(&shadow);

    // Keyed by the loaded path, delivered to projects of the root
    assert!(f.diagnostics.contains(&ProjectId::from("app"), &key(&shadow)));
    assert!(f.diagnostics.contains(&ProjectId::from("tests"), &key(&shadow)));
    assert_eq!(f.diagnostics.len(), 2);
}

#[test]
fn test_reload_after_change_rearms() {
    let f = fixture();
    let analyzer = f.root.join("A.dll");
    write_analyzer(&analyzer);
    f.projects.add_reference("app", &analyzer);

    f.loader.load(LoadEvent::new(&analyzer));
    f.notifier.trigger(&analyzer);
    assert!(!f.tracker.has_watch(&analyzer));
    assert_eq!(f.diagnostics.raise_count(), 1);

    // Fired watches ignore further events
    assert_eq!(f.notifier.trigger(&analyzer), 0);
    assert_eq!(f.diagnostics.raise_count(), 1);

    touch_future(&analyzer);
    f.loader.load(LoadEvent::new(&analyzer));
    assert!(f.tracker.has_watch(&analyzer));
    assert_eq!(
        f.tracker
            .check_if_stale(&ProjectId::from("app"), &analyzer),
        Staleness::Fresh
    );

    f.tracker
        .remove_analyzer_already_loaded_diagnostics(&ProjectId::from("app"), &analyzer);
    assert!(f.diagnostics.is_empty());
}

#[test]
fn test_concurrent_fire_and_remove_dispose_once() {
    for _ in 0..50 {
        let f = fixture();
        let analyzer = f.root.join("A.dll");
        f.projects.add_reference("app", &analyzer);
        f.loader.load(LoadEvent::new(&analyzer));

        let tracker = &f.tracker;
        let notifier = &f.notifier;
        let analyzer = &analyzer;
        thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(move || {
                    notifier.trigger(analyzer);
                });
                s.spawn(move || {
                    tracker.on_watch_fired(analyzer);
                });
            }
            s.spawn(move || {
                tracker.remove_and_dispose(analyzer);
            });
        });

        assert_eq!(f.notifier.unsubscribe_count(), 1);
        assert_eq!(f.notifier.subscription_count(), 0);
        assert!(!f.tracker.has_watch(analyzer));
        // Either a fire won (one diagnostic) or the removal did (none)
        assert!(f.diagnostics.raise_count() <= 1);
    }
}

#[test]
fn test_concurrent_loads_watch_each_path_once() {
    let f = fixture();
    let paths: Vec<PathBuf> = (0..16).map(|i| f.root.join(format!("{i}.dll"))).collect();

    let loader = &f.loader;
    thread::scope(|s| {
        for _ in 0..4 {
            let paths = &paths;
            s.spawn(move || {
                for path in paths {
                    loader.load(LoadEvent::new(path));
                }
            });
        }
    });

    assert_eq!(f.tracker.watch_count(), 16);
    assert_eq!(f.notifier.subscription_count(), 16);
}

#[test]
fn test_drop_releases_everything() {
    let f = fixture();
    for name in ["A.dll", "B.dll"] {
        f.loader.load(LoadEvent::new(f.root.join(name)));
    }
    assert_eq!(f.loader.subscriber_count(), 1);

    let Fixture {
        tracker,
        loader,
        notifier,
        ..
    } = f;
    drop(tracker);

    assert_eq!(loader.subscriber_count(), 0);
    assert_eq!(notifier.subscription_count(), 0);
    assert_eq!(notifier.unsubscribe_count(), 2);
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_are_tracked_separately() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let f = fixture();
    let a = f.root.join(OsStr::from_bytes(b"\xffa.dll"));
    let b = f.root.join(OsStr::from_bytes(b"\xfea.dll"));
    write_analyzer(&a);
    write_analyzer(&b);
    touch_future(&b);

    f.loader.load(LoadEvent::new(&a));
    f.loader.load(LoadEvent::new(&b));

    assert_eq!(f.tracker.watch_count(), 2);
    assert_ne!(f.tracker.load_time(&a), f.tracker.load_time(&b));
    assert_eq!(
        f.tracker.check_if_stale(&ProjectId::from("app"), &a),
        Staleness::Fresh
    );
    assert!(f.diagnostics.is_empty());
}
