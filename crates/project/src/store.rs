use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SubsecRound, Utc};
use cipherstudio_storage::{write_atomic, Storage, StorageError};
use thiserror::Error;

use crate::project::{Project, ProjectId};

/// Storage key of the durable project list.
pub const PROJECTS_KEY: &str = "cipher-studio-projects";

/// Errors emitted by [`ProjectListStore`] and the snapshot helpers.
/// [`ProjectListStore`] 與快照函式可能拋出的錯誤。
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("project storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to serialize project data: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("invalid project payload: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to write snapshot {path}: {source}")]
    Snapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read snapshot {path}: {source}")]
    ReadSnapshot {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("project {0} not found")]
    NotFound(ProjectId),
}

/// The durable, ordered list of projects, kept as a single record.
/// 以單一紀錄保存的有序專案清單。
///
/// Every write re-reads the whole list, merges by project id and writes the
/// whole list back. Two independent writers interleaving read and write lose
/// one of the updates; the later write wins.
#[derive(Debug)]
pub struct ProjectListStore<S> {
    storage: S,
    key: String,
}

impl<S: Storage> ProjectListStore<S> {
    pub fn new(storage: S) -> Self {
        Self::with_key(storage, PROJECTS_KEY)
    }

    pub fn with_key(storage: S, key: impl Into<String>) -> Self {
        Self {
            storage,
            key: key.into(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Returns every stored project; unreadable or corrupt data reads as empty.
    /// 回傳所有專案；無法讀取或損毀的資料視為空清單。
    pub fn list_all(&self) -> Vec<Project> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "project list unreadable, treating as empty");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(projects) => projects,
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "project list corrupt, treating as empty");
                Vec::new()
            }
        }
    }

    /// Key under which an unparseable list is set aside before being replaced.
    pub fn corrupt_key(&self) -> String {
        format!("{}.corrupt", self.key)
    }

    /// Loads the list ahead of a rewrite. A record that no longer parses is
    /// copied to [`corrupt_key`](Self::corrupt_key) first; if that copy fails
    /// the rewrite is refused.
    fn list_for_rewrite(&mut self) -> Result<Vec<Project>, StoreError> {
        let raw = match self.storage.get(&self.key) {
            Ok(Some(raw)) => raw,
            _ => return Ok(self.list_all()),
        };
        match serde_json::from_str(&raw) {
            Ok(projects) => Ok(projects),
            Err(err) => {
                let backup = self.corrupt_key();
                self.storage.set(&backup, &raw)?;
                tracing::warn!(key = %self.key, backup = %backup, error = %err, "project list corrupt, previous record set aside");
                Ok(Vec::new())
            }
        }
    }

    pub fn get(&self, id: &ProjectId) -> Option<Project> {
        self.list_all().into_iter().find(|project| project.id == *id)
    }

    /// Merges `project` into the list by id, stamping `updatedAt` with now.
    /// 以識別碼合併專案並將 `updatedAt` 設為現在時間。
    pub fn save(&mut self, project: &Project) -> Result<Project, StoreError> {
        self.save_at(project, Utc::now())
    }

    /// Merge-by-id with an explicit timestamp.
    ///
    /// An existing entry keeps its position, id, creation time and entry point;
    /// only `name`, `files` and `updatedAt` are replaced. An unknown id is
    /// appended.
    pub fn save_at(&mut self, project: &Project, updated_at: DateTime<Utc>) -> Result<Project, StoreError> {
        let updated_at = updated_at.trunc_subsecs(3);
        let mut projects = self.list_for_rewrite()?;
        let saved = match projects.iter_mut().find(|entry| entry.id == project.id) {
            Some(entry) => {
                entry.name = project.name.clone();
                entry.files = project.files.clone();
                entry.updated_at = updated_at;
                entry.clone()
            }
            None => {
                let mut entry = project.clone();
                entry.updated_at = updated_at;
                projects.push(entry.clone());
                entry
            }
        };
        self.write_all(&projects)?;
        tracing::debug!(project = %saved.id, total = projects.len(), "project saved");
        Ok(saved)
    }

    /// Appends a project exactly as given, without touching `updatedAt`.
    pub fn append(&mut self, project: &Project) -> Result<(), StoreError> {
        let mut projects = self.list_for_rewrite()?;
        projects.retain(|entry| entry.id != project.id);
        projects.push(project.clone());
        self.write_all(&projects)
    }

    /// Removes a project; returns whether an entry was dropped.
    /// 移除專案並回傳是否確實刪除。
    pub fn remove(&mut self, id: &ProjectId) -> Result<bool, StoreError> {
        let mut projects = self.list_all();
        let before = projects.len();
        projects.retain(|entry| entry.id != *id);
        if projects.len() == before {
            return Ok(false);
        }
        self.write_all(&projects)?;
        tracing::info!(project = %id, "project removed");
        Ok(true)
    }

    pub fn write_all(&mut self, projects: &[Project]) -> Result<(), StoreError> {
        let payload = serde_json::to_string(projects).map_err(StoreError::Serialize)?;
        self.storage.set(&self.key, &payload)?;
        Ok(())
    }
}

/// Serialises a project into the transportable JSON artifact.
/// 將專案序列化為可攜帶的 JSON。
pub fn export_snapshot(project: &Project) -> Result<String, StoreError> {
    serde_json::to_string_pretty(project).map_err(StoreError::Serialize)
}

/// Parses a project from a JSON artifact; nothing is merged.
/// 從 JSON 解析專案，不進行任何合併。
pub fn import_snapshot(bytes: &[u8]) -> Result<Project, StoreError> {
    serde_json::from_slice(bytes).map_err(StoreError::Parse)
}

/// Reads and parses a snapshot file.
pub fn read_snapshot(path: impl AsRef<Path>) -> Result<Project, StoreError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| StoreError::ReadSnapshot {
        path: path.to_path_buf(),
        source,
    })?;
    import_snapshot(&bytes)
}

/// Which flavor of snapshot file to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotKind {
    Export,
    Save,
}

/// Writes a point-in-time snapshot into `dir`, returning the file path.
/// 將當下的專案快照寫入指定資料夾並回傳檔案路徑。
pub fn write_snapshot(dir: impl AsRef<Path>, project: &Project, kind: SnapshotKind) -> Result<PathBuf, StoreError> {
    let millis = Utc::now().timestamp_millis();
    let file_name = match kind {
        SnapshotKind::Export => format!("{}-{millis}.json", project.slug()),
        SnapshotKind::Save => format!("{}-saved-{millis}.json", project.slug()),
    };
    let path = dir.as_ref().join(file_name);
    let payload = export_snapshot(project)?;
    write_atomic(&path, payload.as_bytes()).map_err(|source| StoreError::Snapshot {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
