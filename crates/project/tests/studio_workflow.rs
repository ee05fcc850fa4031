use std::cell::Cell;
use std::fs;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use cipherstudio_project::{
    read_snapshot, FileKind, ProjectListStore, StoreError, Studio, DEFAULT_AUTOSAVE_DELAY,
};
use cipherstudio_storage::{FileStorage, Storage, StorageError};
use tempfile::tempdir;

#[test]
fn edits_survive_a_restart_after_autosave() {
    let temp = tempdir().expect("tempdir");
    let now = Instant::now();

    let (project_id, util_id) = {
        let mut studio = Studio::start(FileStorage::new(temp.path()), DEFAULT_AUTOSAVE_DELAY);
        let src = studio.create_folder("src", None, now);
        let util = studio.create_file("util.tsx", Some(&src), now);
        studio.update_file_content(&util, "export const answer = 42;", now);
        let committed = studio.tick(now + DEFAULT_AUTOSAVE_DELAY);
        assert_eq!(committed.len(), 1);
        assert!(committed[0].is_ok());
        (studio.project().id.clone(), util)
    };

    let studio = Studio::start(FileStorage::new(temp.path()), DEFAULT_AUTOSAVE_DELAY);
    assert_eq!(studio.project().id, project_id);
    let util = studio.project().files.find(&util_id).expect("util persisted");
    assert_eq!(util.kind, FileKind::File);
    assert_eq!(util.content, "export const answer = 42;");
    assert_eq!(
        studio.project().files.path_of(&util_id).as_deref(),
        Some("src/util.tsx")
    );
}

#[test]
fn edits_inside_the_window_are_not_yet_durable() {
    let temp = tempdir().expect("tempdir");
    let now = Instant::now();
    let mut studio = Studio::start(FileStorage::new(temp.path()), Duration::from_millis(500));
    let id = studio.create_file("draft.tsx", None, now);

    assert!(studio.tick(now + Duration::from_millis(499)).is_empty());
    let store = ProjectListStore::new(FileStorage::new(temp.path()));
    let stored = store.get(&studio.project().id).expect("default project stored");
    assert!(!stored.files.contains(&id));

    studio.flush();
    let stored = store.get(&studio.project().id).expect("project stored");
    assert!(stored.files.contains(&id));
}

#[test]
fn save_now_and_import_round_trip_through_a_snapshot() {
    let temp = tempdir().expect("tempdir");
    let downloads = temp.path().join("downloads");
    fs::create_dir_all(&downloads).expect("downloads dir");
    let now = Instant::now();

    let mut studio = Studio::start(FileStorage::new(temp.path().join("data")), DEFAULT_AUTOSAVE_DELAY);
    studio.create_file("styles.css", None, now);
    let snapshot = studio.save_now(&downloads).expect("save now");
    assert!(!studio.autosave().is_pending(&studio.project().id));
    let name = snapshot.file_name().and_then(|n| n.to_str()).expect("file name");
    assert!(name.starts_with("Untitled-Project-saved-"));

    let saved = read_snapshot(&snapshot).expect("snapshot parses");
    assert_eq!(saved.files, studio.project().files);

    let mut other = Studio::start(FileStorage::new(temp.path().join("other")), DEFAULT_AUTOSAVE_DELAY);
    let before = other.project().id.clone();
    let notes = other.create_file("notes.md", None, now);
    other.update_file_content(&notes, "keep me", now);
    let files_before = other.project().files.clone();
    assert!(other.import(b"{\"broken\":", now).is_err());
    assert_eq!(other.project().id, before);
    assert_eq!(other.session().selected_id(), Some(&notes));
    assert_eq!(other.project().files, files_before);
    assert_eq!(
        other.session().selected_file().map(|f| f.content.as_str()),
        Some("keep me")
    );

    let bytes = fs::read(&snapshot).expect("read snapshot");
    other.import(&bytes, now).expect("import");
    assert_eq!(other.project().id, saved.id);
    assert_eq!(other.session().selected_file().map(|f| f.name.as_str()), Some("App.tsx"));
    assert!(other.autosave().is_pending(&saved.id));
}

/// File storage whose writes fail while the shared switch is on.
struct Unwritable {
    inner: FileStorage,
    failing: Rc<Cell<bool>>,
}

impl Storage for Unwritable {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failing.get() {
            return Err(StorageError::Write {
                path: key.into(),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "read-only volume"),
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}

#[test]
fn edits_outlive_a_period_of_failed_writes() {
    let temp = tempdir().expect("tempdir");
    let failing = Rc::new(Cell::new(false));
    let storage = Unwritable {
        inner: FileStorage::new(temp.path()),
        failing: Rc::clone(&failing),
    };
    let mut studio = Studio::start(storage, DEFAULT_AUTOSAVE_DELAY);
    let project_id = studio.project().id.clone();
    let now = Instant::now();

    failing.set(true);
    let file = studio.create_file("offline.tsx", None, now);
    studio.update_file_content(&file, "written offline", now);
    let results = studio.tick(now + DEFAULT_AUTOSAVE_DELAY);
    assert!(matches!(results.as_slice(), [Err(StoreError::Storage(_))]));
    assert!(matches!(
        studio.save_now(temp.path().join("downloads")),
        Err(StoreError::Storage(_))
    ));
    assert!(studio.new_project().is_err());
    assert_eq!(studio.project().id, project_id);
    assert!(studio.autosave().is_pending(&project_id));

    failing.set(false);
    assert!(studio.flush().iter().all(Result::is_ok));

    let reopened = Studio::start(FileStorage::new(temp.path()), DEFAULT_AUTOSAVE_DELAY);
    assert_eq!(reopened.project().id, project_id);
    let stored = reopened.project().files.find(&file).expect("file persisted");
    assert_eq!(stored.content, "written offline");
}
