use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::project::Project;
use crate::tree::{FileId, FileNode, FileNodeDraft, ProjectTree, ProjectTreeDiff};

/// Errors raised by selection changes.
/// 變更選取時可能發生的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("node {0} not found")]
    NotFound(FileId),
    #[error("node {0} is a folder and cannot be selected")]
    NotAFile(FileId),
}

/// The open project plus the selected file.
/// 目前開啟的專案與選取中的檔案。
///
/// The session owns the project's tree while it is open. The selection is
/// only an id into that tree and is revalidated after every delete.
#[derive(Debug, Clone)]
pub struct EditorSession {
    project: Project,
    selected: Option<FileId>,
    revision: u64,
}

impl EditorSession {
    /// Opens a project and selects its first file.
    /// 開啟專案並選取第一個檔案。
    pub fn open(project: Project) -> Self {
        let selected = project.files.find_first_file().map(|node| node.id.clone());
        tracing::debug!(project = %project.id, selected = ?selected, "session opened");
        Self {
            project,
            selected,
            revision: 0,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    pub fn into_project(self) -> Project {
        self.project
    }

    /// Counter bumped by every effective tree mutation.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn selected_id(&self) -> Option<&FileId> {
        self.selected.as_ref()
    }

    /// The selected file, resolved against the current tree.
    /// 依目前的樹解析出選取的檔案。
    pub fn selected_file(&self) -> Option<&FileNode> {
        self.selected
            .as_ref()
            .and_then(|id| self.project.files.find(id))
    }

    pub fn select(&mut self, id: &FileId) -> Result<(), SessionError> {
        match self.project.files.find(id) {
            Some(node) if node.is_file() => {
                self.selected = Some(id.clone());
                Ok(())
            }
            Some(_) => Err(SessionError::NotAFile(id.clone())),
            None => Err(SessionError::NotFound(id.clone())),
        }
    }

    /// Creates an empty file and selects it.
    /// 建立空白檔案並選取。
    pub fn create_file(&mut self, name: impl Into<String>, parent: Option<&FileId>) -> FileId {
        let draft = FileNodeDraft::file(name, "");
        let id = draft.id().clone();
        self.insert(parent, draft);
        self.selected = Some(id.clone());
        id
    }

    pub fn create_folder(&mut self, name: impl Into<String>, parent: Option<&FileId>) -> FileId {
        let draft = FileNodeDraft::folder(name);
        let id = draft.id().clone();
        self.insert(parent, draft);
        id
    }

    pub fn insert(&mut self, parent: Option<&FileId>, draft: FileNodeDraft) -> ProjectTreeDiff {
        let (files, diff) = self.project.files.insert(parent, draft);
        self.apply(files, &diff);
        diff
    }

    /// Deletes a node and repoints the selection when it was removed.
    /// 刪除節點；若選取的檔案被移除則改選第一個剩餘檔案。
    pub fn delete(&mut self, id: &FileId) -> ProjectTreeDiff {
        let (files, diff) = self.project.files.remove(id);
        self.apply(files, &diff);
        let selection_removed = self
            .selected
            .as_ref()
            .is_some_and(|selected| diff.removed.contains(selected));
        if selection_removed {
            self.selected = self
                .project
                .files
                .find_first_file()
                .map(|node| node.id.clone());
            tracing::debug!(selected = ?self.selected, "selection repointed after delete");
        }
        diff
    }

    pub fn rename(&mut self, id: &FileId, name: impl Into<String>) -> bool {
        let (files, diff) = self.project.files.rename(id, name);
        self.apply(files, &diff)
    }

    pub fn update_content(&mut self, id: &FileId, content: impl Into<String>) -> bool {
        let (files, diff) = self.project.files.update_content(id, content);
        self.apply(files, &diff)
    }

    /// Records the timestamp of a successful durable write.
    pub fn mark_saved(&mut self, updated_at: DateTime<Utc>) {
        self.project.updated_at = updated_at;
    }

    fn apply(&mut self, files: ProjectTree, diff: &ProjectTreeDiff) -> bool {
        if diff.is_empty() {
            return false;
        }
        self.project.files = files;
        self.revision = self.revision.wrapping_add(1);
        true
    }
}
