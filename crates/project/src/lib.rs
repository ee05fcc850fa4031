//! Project tree, editor session and persistence primitives for CipherStudio.
//! 管理 CipherStudio 專案樹、編輯工作階段與持久化的核心模組。

mod serde_time;
#[cfg(test)]
mod testing;

pub mod autosave;
pub mod project;
pub mod session;
pub mod store;
pub mod studio;
pub mod tree;

pub use autosave::{Autosave, Deferred, DEFAULT_AUTOSAVE_DELAY};
pub use project::{Project, ProjectId, DEFAULT_ENTRY_POINT, DEFAULT_PROJECT_NAME};
pub use session::{EditorSession, SessionError};
pub use store::{
    export_snapshot, import_snapshot, read_snapshot, write_snapshot, ProjectListStore,
    SnapshotKind, StoreError, PROJECTS_KEY,
};
pub use studio::Studio;
pub use tree::{
    FileId, FileKind, FileNode, FileNodeDraft, Preorder, ProjectFile, ProjectTree,
    ProjectTreeDiff, ProjectTreeError,
};
