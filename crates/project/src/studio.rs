use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use cipherstudio_storage::Storage;

use crate::autosave::Autosave;
use crate::project::{Project, ProjectId};
use crate::session::{EditorSession, SessionError};
use crate::store::{import_snapshot, write_snapshot, ProjectListStore, SnapshotKind, StoreError};
use crate::tree::{FileId, ProjectTreeDiff};

/// Ties the open session to the durable project list.
/// 將目前的編輯工作階段與持久化專案清單串接。
///
/// Tree edits apply synchronously to the session and re-arm the project's
/// autosave timer; the durable list catches up when [`Studio::tick`] sees the
/// debounce window elapse. The in-memory project stays authoritative even
/// when a write fails.
#[derive(Debug)]
pub struct Studio<S: Storage> {
    store: ProjectListStore<S>,
    session: EditorSession,
    autosave: Autosave,
}

impl<S: Storage> Studio<S> {
    /// Opens the first stored project, or creates and stores a default one.
    /// 開啟第一個已儲存的專案；若沒有則建立預設專案。
    pub fn start(storage: S, autosave_delay: Duration) -> Self {
        let mut store = ProjectListStore::new(storage);
        let project = match store.list_all().into_iter().next() {
            Some(project) => project,
            None => create_default(&mut store),
        };
        Self {
            store,
            session: EditorSession::open(project),
            autosave: Autosave::new(autosave_delay),
        }
    }

    pub fn session(&self) -> &EditorSession {
        &self.session
    }

    pub fn project(&self) -> &Project {
        self.session.project()
    }

    pub fn store(&self) -> &ProjectListStore<S> {
        &self.store
    }

    pub fn autosave(&self) -> &Autosave {
        &self.autosave
    }

    pub fn projects(&self) -> Vec<Project> {
        self.store.list_all()
    }

    pub fn create_file(&mut self, name: &str, parent: Option<&FileId>, now: Instant) -> FileId {
        let id = self.session.create_file(name, parent);
        self.touch(now);
        id
    }

    pub fn create_folder(&mut self, name: &str, parent: Option<&FileId>, now: Instant) -> FileId {
        let id = self.session.create_folder(name, parent);
        self.touch(now);
        id
    }

    pub fn delete_file(&mut self, id: &FileId, now: Instant) -> ProjectTreeDiff {
        let diff = self.session.delete(id);
        if !diff.is_empty() {
            self.touch(now);
        }
        diff
    }

    pub fn rename_file(&mut self, id: &FileId, name: &str, now: Instant) -> bool {
        let changed = self.session.rename(id, name);
        if changed {
            self.touch(now);
        }
        changed
    }

    pub fn update_file_content(&mut self, id: &FileId, content: &str, now: Instant) -> bool {
        let changed = self.session.update_content(id, content);
        if changed {
            self.touch(now);
        }
        changed
    }

    pub fn select_file(&mut self, id: &FileId) -> Result<(), SessionError> {
        self.session.select(id)
    }

    /// Commits autosaves whose debounce window has elapsed.
    /// 寫入已到期的自動儲存。
    pub fn tick(&mut self, now: Instant) -> Vec<Result<Project, StoreError>> {
        let results = self.autosave.poll(&mut self.store, now);
        self.absorb(&results);
        results
    }

    /// Commits every pending autosave right away.
    pub fn flush(&mut self) -> Vec<Result<Project, StoreError>> {
        let results = self.autosave.flush(&mut self.store);
        self.absorb(&results);
        results
    }

    /// Saves immediately and writes a downloadable snapshot into `snapshot_dir`.
    /// 立即儲存並於指定資料夾寫入可下載的快照。
    ///
    /// The pending autosave is only dropped once the write succeeds.
    pub fn save_now(&mut self, snapshot_dir: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        let saved = self.store.save(self.session.project())?;
        self.autosave.cancel(&saved.id);
        self.session.mark_saved(saved.updated_at);
        tracing::info!(project = %saved.id, "project saved");
        write_snapshot(snapshot_dir, &saved, SnapshotKind::Save)
    }

    /// Writes the open project as an export artifact into `dir`.
    pub fn export_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, StoreError> {
        write_snapshot(dir, self.session.project(), SnapshotKind::Export)
    }

    /// Replaces the open project with an imported one.
    /// 以匯入的專案取代目前開啟的專案。
    ///
    /// A payload that fails to parse, or a failed flush of pending edits,
    /// leaves the open project and its selection untouched.
    pub fn import(&mut self, bytes: &[u8], now: Instant) -> Result<(), StoreError> {
        let project = import_snapshot(bytes)?;
        self.flush_before_switch()?;
        tracing::info!(project = %project.id, "project imported");
        self.session = EditorSession::open(project);
        self.touch(now);
        Ok(())
    }

    /// Creates, stores and opens a fresh default project.
    pub fn new_project(&mut self) -> Result<&Project, StoreError> {
        self.flush_before_switch()?;
        let project = create_default(&mut self.store);
        self.session = EditorSession::open(project);
        Ok(self.session.project())
    }

    pub fn open_project(&mut self, id: &ProjectId) -> Result<(), StoreError> {
        self.flush_before_switch()?;
        let project = self
            .store
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.session = EditorSession::open(project);
        Ok(())
    }

    /// Opens the most recently appended project, if any.
    pub fn load_latest(&mut self) -> Result<bool, StoreError> {
        self.flush_before_switch()?;
        match self.store.list_all().pop() {
            Some(project) => {
                self.session = EditorSession::open(project);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Deletes a stored project. Deleting the open one opens a fresh default.
    /// 刪除專案；若刪除的是目前開啟的專案則建立新的預設專案。
    pub fn delete_project(&mut self, id: &ProjectId) -> Result<bool, StoreError> {
        self.autosave.cancel(id);
        let removed = self.store.remove(id)?;
        if self.project().id == *id {
            let project = create_default(&mut self.store);
            self.session = EditorSession::open(project);
        }
        Ok(removed)
    }

    /// Pending writes must land before the open session is replaced; on
    /// failure they stay armed and the session is kept.
    fn flush_before_switch(&mut self) -> Result<(), StoreError> {
        match self.flush().into_iter().find_map(Result::err) {
            Some(err) => {
                tracing::warn!(project = %self.project().id, error = %err, "pending edits not saved, staying on project");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn touch(&mut self, now: Instant) {
        self.autosave.schedule(self.session.project(), now);
    }

    fn absorb(&mut self, results: &[Result<Project, StoreError>]) {
        let current = self.session.project().id.clone();
        for saved in results.iter().flatten() {
            if saved.id == current {
                self.session.mark_saved(saved.updated_at);
            }
        }
    }
}

fn create_default<S: Storage>(store: &mut ProjectListStore<S>) -> Project {
    let project = Project::new_default();
    if let Err(err) = store.append(&project) {
        tracing::warn!(project = %project.id, error = %err, "failed to store new project");
    }
    tracing::info!(project = %project.id, "created default project");
    project
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;
    use crate::store::{export_snapshot, PROJECTS_KEY};
    use crate::testing::FlakyStorage;
    use cipherstudio_storage::MemoryStorage;

    const DELAY: Duration = Duration::from_millis(1000);

    #[test]
    fn start_creates_and_stores_a_default_project() {
        let studio = Studio::start(MemoryStorage::new(), DELAY);
        assert_eq!(studio.projects().len(), 1);
        assert_eq!(studio.session().selected_file().unwrap().name, "App.tsx");
    }

    #[test]
    fn start_opens_the_first_stored_project() {
        let mut store = ProjectListStore::new(MemoryStorage::new());
        let first = Project::new_default();
        store.append(&first).unwrap();
        store.append(&Project::new("second")).unwrap();
        let studio = Studio::start(store.into_storage(), DELAY);
        assert_eq!(studio.project().id, first.id);
    }

    #[test]
    fn edits_reach_storage_after_the_debounce_window() {
        let mut studio = Studio::start(MemoryStorage::new(), DELAY);
        let writes_before = studio.store().storage().write_count();
        let now = Instant::now();
        let id = studio.create_file("util.tsx", None, now);
        studio.update_file_content(&id, "export const x = 1;", now + Duration::from_millis(200));

        assert!(studio.tick(now + Duration::from_millis(900)).is_empty());
        let committed = studio.tick(now + Duration::from_millis(1200));
        assert_eq!(committed.len(), 1);
        assert_eq!(studio.store().storage().write_count(), writes_before + 1);

        let stored = studio.store().get(&studio.project().id).unwrap();
        assert_eq!(stored.files.find(&id).unwrap().content, "export const x = 1;");
        assert_eq!(stored.updated_at, studio.project().updated_at);
    }

    #[test]
    fn deleting_the_open_project_opens_a_fresh_default() {
        let mut studio = Studio::start(MemoryStorage::new(), DELAY);
        let original = studio.project().id.clone();
        assert!(studio.delete_project(&original).unwrap());
        assert_ne!(studio.project().id, original);
        assert_eq!(studio.projects().len(), 1);
        assert!(studio.session().selected_file().is_some());
    }

    #[test]
    fn open_unknown_project_fails_without_switching() {
        let mut studio = Studio::start(MemoryStorage::new(), DELAY);
        let current = studio.project().id.clone();
        let missing = ProjectId::from_string("missing");
        assert!(matches!(studio.open_project(&missing), Err(StoreError::NotFound(_))));
        assert_eq!(studio.project().id, current);
    }

    #[test]
    fn switching_projects_flushes_pending_edits() {
        let mut studio = Studio::start(MemoryStorage::new(), DELAY);
        let first = studio.project().id.clone();
        let now = Instant::now();
        let id = studio.create_file("keep.tsx", None, now);
        studio.new_project().unwrap();
        assert!(studio.store().get(&first).unwrap().files.contains(&id));
        assert!(studio.load_latest().unwrap());
        assert_ne!(studio.project().id, first);
    }

    #[test]
    fn start_sets_aside_a_corrupt_project_list() {
        let mut storage = MemoryStorage::new();
        storage.set(PROJECTS_KEY, "not a project list").unwrap();
        let studio = Studio::start(storage, DELAY);
        assert_eq!(studio.projects().len(), 1);
        let backup = studio.store().storage().get(&studio.store().corrupt_key()).unwrap();
        assert_eq!(backup.as_deref(), Some("not a project list"));
    }

    fn flaky_studio() -> (Studio<FlakyStorage>, Rc<Cell<bool>>) {
        let storage = FlakyStorage::new();
        let failing = storage.switch();
        (Studio::start(storage, DELAY), failing)
    }

    fn stored_content<S: Storage>(studio: &Studio<S>, file: &FileId) -> Option<String> {
        let stored = studio.store().get(&studio.project().id)?;
        stored.files.find(file).map(|node| node.content.clone())
    }

    #[test]
    fn failed_save_now_keeps_the_pending_autosave() {
        let (mut studio, failing) = flaky_studio();
        let snapshots = tempfile::tempdir().unwrap();
        let now = Instant::now();
        let file = studio.create_file("draft.tsx", None, now);
        studio.update_file_content(&file, "draft", now);

        failing.set(true);
        assert!(matches!(studio.save_now(snapshots.path()), Err(StoreError::Storage(_))));
        assert!(studio.autosave().is_pending(&studio.project().id));

        failing.set(false);
        assert!(studio.flush().iter().all(Result::is_ok));
        assert_eq!(stored_content(&studio, &file).as_deref(), Some("draft"));
    }

    #[test]
    fn failed_tick_retries_on_a_later_tick() {
        let (mut studio, failing) = flaky_studio();
        let now = Instant::now();
        let file = studio.create_file("later.tsx", None, now);

        failing.set(true);
        let results = studio.tick(now + DELAY);
        assert!(!results.is_empty() && results.iter().all(Result::is_err));
        assert!(studio.autosave().is_pending(&studio.project().id));
        assert_eq!(stored_content(&studio, &file), None);

        failing.set(false);
        assert!(studio.tick(now + DELAY * 2).iter().all(Result::is_ok));
        assert_eq!(stored_content(&studio, &file).as_deref(), Some(""));
    }

    #[test]
    fn switching_after_a_failed_flush_keeps_the_open_project() {
        let (mut studio, failing) = flaky_studio();
        let original = studio.project().id.clone();
        let now = Instant::now();
        let file = studio.create_file("keep.tsx", None, now);
        studio.update_file_content(&file, "unsaved", now);
        let selected = studio.session().selected_id().cloned();
        let snapshot = export_snapshot(&Project::new("incoming")).unwrap();

        failing.set(true);
        assert!(studio.load_latest().is_err());
        assert!(studio.new_project().is_err());
        assert!(studio.open_project(&original).is_err());
        assert!(studio.import(snapshot.as_bytes(), now).is_err());

        assert_eq!(studio.project().id, original);
        assert_eq!(studio.session().selected_id().cloned(), selected);
        assert_eq!(studio.project().files.find(&file).unwrap().content, "unsaved");
        assert!(studio.autosave().is_pending(&original));
        assert_eq!(studio.projects().len(), 1);

        failing.set(false);
        assert!(studio.load_latest().unwrap());
        assert_eq!(stored_content(&studio, &file).as_deref(), Some("unsaved"));
    }
}
