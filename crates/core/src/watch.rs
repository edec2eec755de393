use crate::error::RenameError;
use crate::path_info::absolute_path;
use crate::planner::{ProcessResult, RenameStatus};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};

pub const DEFAULT_WATCH_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// One filesystem change as seen by a watch session. `entry` is what the
/// path resolved to when the event was taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub timestamp: SystemTime,
    pub entry: Option<EntryKind>,
}

impl ChangeEvent {
    pub fn observe(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entry = fs::metadata(&path).ok().map(|meta| {
            if meta.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            }
        });
        Self {
            kind,
            path,
            timestamp: SystemTime::now(),
            entry,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    Inactive,
    Directory,
    OwnTarget,
    OwnSource,
    Vanished,
    Unhandled,
}

#[derive(Debug)]
pub enum Outcome {
    Ignored(IgnoreReason),
    Processed(Result<ProcessResult, RenameError>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
    Stopped,
}

/// Loop guard for one watched directory. Paths this session moved away
/// from sit in `source_paths`, paths it moved onto sit in `target_paths`,
/// until the matching notification arrives or the entry outlives the TTL.
#[derive(Debug)]
pub struct WatchSession {
    state: SessionState,
    ttl: Duration,
    source_paths: HashMap<PathBuf, SystemTime>,
    target_paths: HashMap<PathBuf, SystemTime>,
}

impl Default for WatchSession {
    fn default() -> Self {
        Self::new(DEFAULT_WATCH_TTL)
    }
}

impl WatchSession {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: SessionState::Idle,
            ttl,
            source_paths: HashMap::new(),
            target_paths: HashMap::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn start(&mut self) {
        if self.state == SessionState::Idle {
            self.state = SessionState::Watching;
        }
    }

    pub fn stop(&mut self) {
        self.state = SessionState::Stopped;
        self.source_paths.clear();
        self.target_paths.clear();
    }

    pub fn is_pending_source(&self, path: &Path) -> bool {
        self.source_paths.contains_key(path)
    }

    pub fn is_pending_target(&self, path: &Path) -> bool {
        self.target_paths.contains_key(path)
    }

    /// Evaluates one event. `rename` runs only for a create/update of a
    /// file this session did not produce itself, and its target is
    /// registered before this returns. A registered target stays guarded
    /// against creates and updates until it is deleted or idle for the TTL.
    pub fn handle<F>(&mut self, event: &ChangeEvent, rename: F) -> Outcome
    where
        F: FnOnce(&Path) -> Result<ProcessResult, RenameError>,
    {
        if self.state != SessionState::Watching {
            return Outcome::Ignored(IgnoreReason::Inactive);
        }
        self.prune(event.timestamp);

        if event.entry == Some(EntryKind::Directory) {
            return Outcome::Ignored(IgnoreReason::Directory);
        }

        match event.kind {
            ChangeKind::Create | ChangeKind::Update
                if self.target_paths.contains_key(&event.path) =>
            {
                // a moved file can keep receiving writes under its new name
                self.target_paths.insert(event.path.clone(), event.timestamp);
                Outcome::Ignored(IgnoreReason::OwnTarget)
            }
            ChangeKind::Delete => {
                self.target_paths.remove(&event.path);
                if self.source_paths.remove(&event.path).is_some() {
                    Outcome::Ignored(IgnoreReason::OwnSource)
                } else {
                    Outcome::Ignored(IgnoreReason::Unhandled)
                }
            }
            ChangeKind::Create | ChangeKind::Update if event.entry.is_none() => {
                Outcome::Ignored(IgnoreReason::Vanished)
            }
            ChangeKind::Create | ChangeKind::Update => {
                self.source_paths.insert(event.path.clone(), event.timestamp);
                let result = rename(&event.path);
                if let Ok(done) = &result {
                    if done.status == RenameStatus::Renamed && done.changed() {
                        self.target_paths.insert(done.processed.path.clone(), event.timestamp);
                    }
                }
                Outcome::Processed(result)
            }
        }
    }

    fn prune(&mut self, now: SystemTime) {
        let ttl = self.ttl;
        let fresh = |seen: &mut SystemTime| {
            now.duration_since(*seen)
                .map(|age| age <= ttl)
                .unwrap_or(true)
        };
        self.source_paths.retain(|_, seen| fresh(seen));
        self.target_paths.retain(|_, seen| fresh(seen));
    }
}

/// Translates one backend notification into session events. Rename pairs
/// arrive as separate `From`/`To` halves as well, so `Both` is dropped.
pub fn changes_from_event(event: &Event) -> Vec<ChangeEvent> {
    event
        .paths
        .iter()
        .filter_map(|path| {
            let kind = match event.kind {
                EventKind::Create(_) => ChangeKind::Create,
                EventKind::Modify(ModifyKind::Name(RenameMode::To)) => ChangeKind::Create,
                EventKind::Modify(ModifyKind::Name(RenameMode::From)) => ChangeKind::Delete,
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => return None,
                EventKind::Modify(ModifyKind::Name(_)) => {
                    if path.exists() {
                        ChangeKind::Create
                    } else {
                        ChangeKind::Delete
                    }
                }
                EventKind::Modify(_) => ChangeKind::Update,
                EventKind::Remove(_) => ChangeKind::Delete,
                _ => return None,
            };
            Some(ChangeEvent::observe(kind, path.clone()))
        })
        .collect()
}

enum WatchMessage {
    Notify(notify::Result<Event>),
    Stop,
}

/// A running watch. Stopping (or dropping) ends event delivery and waits
/// for the worker; a rename already underway still completes.
pub struct WatchHandle {
    root: PathBuf,
    control: Sender<WatchMessage>,
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle")
            .field("root", &self.root)
            .field("running", &self.worker.is_some())
            .finish()
    }
}

impl WatchHandle {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.watcher.take());
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = self.control.send(WatchMessage::Stop);
        if worker.join().is_err() {
            tracing::error!("監視スレッドが異常終了しました: {}", self.root.display());
        }
        tracing::info!("監視を停止しました: {}", self.root.display());
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Watches `dir` recursively, renaming each externally added or modified
/// file with `rename` and reporting every result to `sink`. Backend errors
/// are reported as [`RenameError::Watch`] and do not end the session.
pub fn watch<R, S>(
    dir: &Path,
    ttl: Duration,
    rename: R,
    sink: S,
) -> Result<WatchHandle, RenameError>
where
    R: FnMut(&Path) -> Result<ProcessResult, RenameError> + Send + 'static,
    S: FnMut(Result<ProcessResult, RenameError>) + Send + 'static,
{
    let requested = absolute_path(dir);
    if !requested.is_dir() {
        return Err(RenameError::NotADirectory(requested));
    }
    let root = fs::canonicalize(&requested).map_err(|err| RenameError::io(&requested, err))?;

    let (tx, rx) = mpsc::channel::<WatchMessage>();
    let notify_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        let _ = notify_tx.send(WatchMessage::Notify(res));
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    let mut session = WatchSession::new(ttl);
    session.start();
    let worker = thread::spawn(move || run_worker(rx, session, rename, sink));
    tracing::info!("監視を開始しました: {}", root.display());

    Ok(WatchHandle {
        root,
        control: tx,
        watcher: Some(watcher),
        worker: Some(worker),
    })
}

fn run_worker<R, S>(
    rx: Receiver<WatchMessage>,
    mut session: WatchSession,
    mut rename: R,
    mut sink: S,
) where
    R: FnMut(&Path) -> Result<ProcessResult, RenameError>,
    S: FnMut(Result<ProcessResult, RenameError>),
{
    while let Ok(message) = rx.recv() {
        let event = match message {
            WatchMessage::Stop => break,
            WatchMessage::Notify(Ok(event)) => event,
            WatchMessage::Notify(Err(err)) => {
                tracing::error!("ファイル監視エラー: {err}");
                sink(Err(RenameError::Watch(err)));
                continue;
            }
        };

        for change in changes_from_event(&event) {
            match session.handle(&change, |path| rename(path)) {
                Outcome::Ignored(reason) => {
                    tracing::debug!(
                        "{:?} {} を無視: {reason:?}",
                        change.kind,
                        change.path.display()
                    );
                }
                Outcome::Processed(result) => {
                    if let Err(err) = &result {
                        tracing::warn!("{err}");
                    }
                    sink(result);
                }
            }
        }
    }
    session.stop();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::rename_file;
    use crate::config::RenamerConfig;
    use crate::template::Template;
    use crate::test_support::{touch, FixedExif};
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use serde_json::json;
    use std::cell::Cell;
    use std::io::Write;
    use tempfile::tempdir;

    fn exif() -> FixedExif {
        FixedExif::with_exif(&[("DateTimeOriginal", json!(1_388_570_400))])
    }

    fn event(
        kind: ChangeKind,
        path: &Path,
        entry: Option<EntryKind>,
        at: SystemTime,
    ) -> ChangeEvent {
        ChangeEvent {
            kind,
            path: path.to_path_buf(),
            timestamp: at,
            entry,
        }
    }

    fn rename_with(
        config: &RenamerConfig,
    ) -> impl Fn(&Path) -> Result<ProcessResult, RenameError> + '_ {
        move |path: &Path| rename_file(path, &Template::from("x_{{file}}"), config, &exif())
    }

    fn collect_results(
        rx: &mpsc::Receiver<Result<ProcessResult, RenameError>>,
    ) -> Vec<Result<ProcessResult, RenameError>> {
        let mut results = vec![rx.recv_timeout(Duration::from_secs(10)).expect("first result")];
        while let Ok(result) = rx.recv_timeout(Duration::from_millis(1500)) {
            results.push(result);
        }
        results
    }

    #[test]
    fn own_rename_notifications_do_not_trigger_again() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        let target = temp.path().join("x_a.jpg");
        touch(&photo);

        let config = RenamerConfig::default();
        let rename = rename_with(&config);
        let calls = Cell::new(0);
        let counted = |path: &Path| {
            calls.set(calls.get() + 1);
            rename(path)
        };
        let now = SystemTime::now();
        let mut session = WatchSession::default();
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Create, &photo, Some(EntryKind::File), now),
            counted,
        );
        match outcome {
            Outcome::Processed(Ok(result)) => assert_eq!(result.processed.path, target),
            other => panic!("expected a rename, got {other:?}"),
        }
        assert!(session.is_pending_source(&photo));
        assert!(session.is_pending_target(&target));

        let followups = [
            (event(ChangeKind::Update, &photo, None, now), IgnoreReason::Vanished),
            (event(ChangeKind::Delete, &photo, None, now), IgnoreReason::OwnSource),
            (
                event(ChangeKind::Create, &target, Some(EntryKind::File), now),
                IgnoreReason::OwnTarget,
            ),
        ];
        for (change, expected) in followups {
            match session.handle(&change, |path: &Path| {
                calls.set(calls.get() + 1);
                rename(path)
            }) {
                Outcome::Ignored(reason) => assert_eq!(reason, expected),
                other => panic!("expected {expected:?}, got {other:?}"),
            }
        }

        assert_eq!(calls.get(), 1);
        assert!(!session.is_pending_source(&photo));
        assert!(session.is_pending_target(&target));
        assert!(target.exists());
    }

    #[test]
    fn own_target_updates_are_ignored_while_being_written() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        let target = temp.path().join("x_a.jpg");
        touch(&photo);

        let config = RenamerConfig::default();
        let rename = rename_with(&config);
        let calls = Cell::new(0);
        let counted = |path: &Path| {
            calls.set(calls.get() + 1);
            rename(path)
        };
        let start = SystemTime::now();
        let mut session = WatchSession::new(Duration::from_secs(30));
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Create, &photo, Some(EntryKind::File), start),
            &counted,
        );
        assert!(matches!(outcome, Outcome::Processed(Ok(_))));

        // each write lands well inside the TTL of the previous one
        let steps = [
            (ChangeKind::Create, 1),
            (ChangeKind::Update, 20),
            (ChangeKind::Update, 40),
            (ChangeKind::Update, 60),
        ];
        for (kind, secs) in steps {
            let at = start + Duration::from_secs(secs);
            let outcome =
                session.handle(&event(kind, &target, Some(EntryKind::File), at), &counted);
            assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::OwnTarget)));
        }

        assert_eq!(calls.get(), 1);
        assert!(target.exists());
        assert!(session.is_pending_target(&target));

        let outcome = session.handle(
            &event(ChangeKind::Delete, &target, None, start + Duration::from_secs(61)),
            &counted,
        );
        assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::Unhandled)));
        assert!(!session.is_pending_target(&target));
    }

    #[test]
    fn directories_are_never_renamed() {
        let temp = tempdir().expect("tempdir");
        let mut session = WatchSession::default();
        session.start();

        let outcome = session.handle(
            &event(
                ChangeKind::Create,
                temp.path(),
                Some(EntryKind::Directory),
                SystemTime::now(),
            ),
            |_: &Path| panic!("directory must not be renamed"),
        );
        assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::Directory)));
    }

    #[test]
    fn events_outside_watching_are_ignored() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        touch(&photo);
        let change = event(ChangeKind::Create, &photo, Some(EntryKind::File), SystemTime::now());

        let mut session = WatchSession::default();
        assert_eq!(session.state(), SessionState::Idle);
        let outcome = session.handle(&change, |_: &Path| panic!("idle session"));
        assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::Inactive)));

        session.start();
        session.stop();
        session.start();
        assert_eq!(session.state(), SessionState::Stopped);
        let outcome = session.handle(&change, |_: &Path| panic!("stopped session"));
        assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::Inactive)));
        assert!(photo.exists());
    }

    #[test]
    fn foreign_deletes_are_ignored() {
        let temp = tempdir().expect("tempdir");
        let mut session = WatchSession::default();
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Delete, &temp.path().join("gone.jpg"), None, SystemTime::now()),
            |_: &Path| panic!("delete must not rename"),
        );
        assert!(matches!(outcome, Outcome::Ignored(IgnoreReason::Unhandled)));
    }

    #[test]
    fn failed_renames_are_reported_and_the_session_continues() {
        let temp = tempdir().expect("tempdir");
        let notes = temp.path().join("notes.txt");
        let photo = temp.path().join("b.jpg");
        touch(&notes);
        touch(&photo);

        let config = RenamerConfig::default();
        let rename = rename_with(&config);
        let now = SystemTime::now();
        let mut session = WatchSession::default();
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Create, &notes, Some(EntryKind::File), now),
            &rename,
        );
        assert!(matches!(
            outcome,
            Outcome::Processed(Err(RenameError::UnsupportedExtension(_)))
        ));

        let outcome = session.handle(
            &event(ChangeKind::Update, &photo, Some(EntryKind::File), now),
            &rename,
        );
        assert!(matches!(outcome, Outcome::Processed(Ok(_))));
        assert_eq!(session.state(), SessionState::Watching);
    }

    #[test]
    fn stale_targets_expire_after_the_ttl() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        let target = temp.path().join("x_a.jpg");
        touch(&photo);

        let config = RenamerConfig::default();
        let rename = rename_with(&config);
        let start = SystemTime::now();
        let mut session = WatchSession::new(Duration::from_secs(30));
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Create, &photo, Some(EntryKind::File), start),
            &rename,
        );
        assert!(matches!(outcome, Outcome::Processed(Ok(_))));
        assert!(session.is_pending_target(&target));

        let later = start + Duration::from_secs(31);
        let outcome = session.handle(
            &event(ChangeKind::Create, &target, Some(EntryKind::File), later),
            &rename,
        );
        match outcome {
            Outcome::Processed(Ok(result)) => {
                assert_eq!(result.processed.path, temp.path().join("x_x_a.jpg"))
            }
            other => panic!("expected a fresh rename, got {other:?}"),
        }
        assert!(!session.is_pending_source(&photo));
    }

    #[test]
    fn dry_run_registers_no_target() {
        let temp = tempdir().expect("tempdir");
        let photo = temp.path().join("a.jpg");
        touch(&photo);

        let config = RenamerConfig {
            dryrun: true,
            ..RenamerConfig::default()
        };
        let rename = rename_with(&config);
        let mut session = WatchSession::default();
        session.start();

        let outcome = session.handle(
            &event(ChangeKind::Create, &photo, Some(EntryKind::File), SystemTime::now()),
            &rename,
        );
        assert!(matches!(outcome, Outcome::Processed(Ok(_))));
        assert!(!session.is_pending_target(&temp.path().join("x_a.jpg")));
        assert!(photo.exists());
    }

    #[test]
    fn backend_events_map_to_change_kinds() {
        let temp = tempdir().expect("tempdir");
        let file = temp.path().join("a.jpg");
        touch(&file);
        let gone = temp.path().join("gone.jpg");

        let kinds = |kind: EventKind, path: &Path| -> Vec<(ChangeKind, Option<EntryKind>)> {
            let event = Event::new(kind).add_path(path.to_path_buf());
            changes_from_event(&event)
                .into_iter()
                .map(|change| (change.kind, change.entry))
                .collect()
        };

        assert_eq!(
            kinds(EventKind::Create(CreateKind::File), &file),
            vec![(ChangeKind::Create, Some(EntryKind::File))]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &file),
            vec![(ChangeKind::Create, Some(EntryKind::File))]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &gone),
            vec![(ChangeKind::Delete, None)]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Name(RenameMode::Any)), &gone),
            vec![(ChangeKind::Delete, None)]
        );
        assert_eq!(
            kinds(EventKind::Modify(ModifyKind::Data(DataChange::Any)), &file),
            vec![(ChangeKind::Update, Some(EntryKind::File))]
        );
        assert_eq!(
            kinds(EventKind::Remove(RemoveKind::File), &gone),
            vec![(ChangeKind::Delete, None)]
        );
        assert_eq!(
            kinds(EventKind::Create(CreateKind::Folder), temp.path()),
            vec![(ChangeKind::Create, Some(EntryKind::Directory))]
        );
        assert!(kinds(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &file).is_empty());
        assert!(kinds(EventKind::Any, &file).is_empty());
    }

    #[test]
    fn watching_a_missing_directory_fails() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("NOPE");
        let err = watch(&missing, DEFAULT_WATCH_TTL, |_: &Path| unreachable!(), |_| {})
            .expect_err("missing dir");
        assert!(matches!(err, RenameError::NotADirectory(_)));
    }

    #[test]
    fn dropped_file_is_renamed_exactly_once() {
        let watched = tempdir().expect("watched dir");
        let staging = tempdir().expect("staging dir");
        let staged = staging.path().join("a.jpg");
        touch(&staged);

        let (tx, rx) = mpsc::channel();
        let config = RenamerConfig::default();
        let handle = watch(
            watched.path(),
            DEFAULT_WATCH_TTL,
            move |path: &Path| rename_file(path, &Template::from("x_{{file}}"), &config, &exif()),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .expect("start watch");
        let root = handle.root().to_path_buf();

        fs::rename(&staged, root.join("a.jpg")).expect("drop file");

        let first = rx
            .recv_timeout(Duration::from_secs(10))
            .expect("one result")
            .expect("rename succeeds");
        assert_eq!(first.processed.path, root.join("x_a.jpg"));
        assert!(rx.recv_timeout(Duration::from_millis(1500)).is_err());

        handle.stop();
        assert!(root.join("x_a.jpg").exists());
        assert!(!root.join("a.jpg").exists());
    }

    #[test]
    fn file_written_in_chunks_is_renamed_exactly_once() {
        let watched = tempdir().expect("watched dir");
        let (tx, rx) = mpsc::channel();
        let config = RenamerConfig::default();
        let template = Template::from("{{dir}}/processed:{{file}}");
        let handle = watch(
            watched.path(),
            DEFAULT_WATCH_TTL,
            move |path: &Path| rename_file(path, &template, &config, &exif()),
            move |result| {
                let _ = tx.send(result);
            },
        )
        .expect("start watch");
        let root = handle.root().to_path_buf();

        let mut file = fs::File::create(root.join("a.jpg")).expect("create photo");
        for _ in 0..5 {
            file.write_all(&[0u8; 4096]).expect("write chunk");
            thread::sleep(Duration::from_millis(20));
        }
        drop(file);

        let results = collect_results(&rx);
        assert_eq!(results.len(), 1, "results: {results:?}");
        let result = results[0].as_ref().expect("rename succeeds");
        assert_eq!(result.processed.path, root.join("processed").join("a.jpg"));

        handle.stop();
        let moved = root.join("processed").join("a.jpg");
        assert_eq!(fs::metadata(&moved).expect("moved photo").len(), 5 * 4096);
    }
}
