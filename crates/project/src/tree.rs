use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier assigned to each node in the project tree.
/// 專案樹中每個節點的唯一識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FileId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Whether a node is a leaf file or a folder.
/// 節點類型：檔案或資料夾。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// Immutable node stored inside the tree arena.
/// 儲存在樹狀 arena 中的不可變節點。
///
/// Only folders carry children; the child list holds ids, never nodes, so a
/// mutation rebuilds the touched node and leaves every other node shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileNode {
    pub id: FileId,
    pub name: String,
    pub kind: FileKind,
    pub content: String,
    children: Vec<FileId>,
    parent: Option<FileId>,
}

impl FileNode {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    /// Ordered child ids; always empty for files.
    pub fn children(&self) -> &[FileId] {
        &self.children
    }

    pub fn parent(&self) -> Option<&FileId> {
        self.parent.as_ref()
    }
}

/// Helper to construct a new node before it is placed in a tree.
/// 協助在插入前建立新節點。
#[derive(Debug, Clone)]
pub struct FileNodeDraft {
    id: FileId,
    name: String,
    kind: FileKind,
    content: String,
}

impl FileNodeDraft {
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            kind: FileKind::File,
            content: content.into(),
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            kind: FileKind::Folder,
            content: String::new(),
        }
    }

    pub fn with_id(mut self, id: FileId) -> Self {
        self.id = id;
        self
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    fn build(self, parent: Option<FileId>) -> FileNode {
        FileNode {
            id: self.id,
            name: self.name,
            kind: self.kind,
            content: self.content,
            children: Vec::new(),
            parent,
        }
    }
}

/// Captures differences after a tree mutation.
/// 紀錄樹狀結構變動後的差異。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectTreeDiff {
    pub added: Vec<FileId>,
    pub removed: Vec<FileId>,
    pub updated: Vec<FileId>,
}

impl ProjectTreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }
}

/// Errors raised while building a tree from its nested serialized shape.
/// 由巢狀序列化格式建立專案樹時的錯誤。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProjectTreeError {
    #[error("node id {0} appears more than once")]
    DuplicateId(FileId),
    #[error("file node {0} cannot have children")]
    FileWithChildren(FileId),
}

/// The ordered forest of a project, stored as an arena addressed by id.
/// 以識別碼定址的 arena 保存的專案樹（有序森林）。
///
/// Every operation takes `&self` and returns a new tree. Nodes sit behind
/// `Arc`, so the previous tree and the new one share every node the edit did
/// not touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<ProjectFile>", into = "Vec<ProjectFile>")]
pub struct ProjectTree {
    roots: Vec<FileId>,
    nodes: HashMap<FileId, Arc<FileNode>>,
}

impl ProjectTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of nodes (files and folders).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[FileId] {
        &self.roots
    }

    /// Finds a node by identifier.
    /// 依識別碼尋找節點。
    pub fn find(&self, id: &FileId) -> Option<&FileNode> {
        self.nodes.get(id).map(|node| &**node)
    }

    pub fn contains(&self, id: &FileId) -> bool {
        self.nodes.contains_key(id)
    }

    /// Depth-first, pre-order traversal yielding `(depth, node)`.
    /// 深度優先前序走訪，回傳 `(深度, 節點)`。
    pub fn iter(&self) -> Preorder<'_> {
        Preorder {
            tree: self,
            stack: self.roots.iter().rev().map(|id| (0, id)).collect(),
        }
    }

    /// File nodes in traversal order.
    pub fn files(&self) -> impl Iterator<Item = &FileNode> {
        self.iter().map(|(_, node)| node).filter(|node| node.is_file())
    }

    /// Returns the first file in pre-order, used for default selection.
    /// 回傳前序走訪中的第一個檔案，作為預設選取。
    pub fn find_first_file(&self) -> Option<&FileNode> {
        self.files().next()
    }

    /// Slash-joined names from the root down to `id`.
    pub fn path_of(&self, id: &FileId) -> Option<String> {
        let mut segments = Vec::new();
        let mut cursor = self.find(id);
        while let Some(node) = cursor {
            segments.push(node.name.as_str());
            cursor = node.parent.as_ref().and_then(|parent| self.find(parent));
        }
        if segments.is_empty() {
            return None;
        }
        segments.reverse();
        Some(segments.join("/"))
    }

    /// Inserts a node under `parent_id`, or at the root.
    /// 在指定資料夾下插入節點；未指定時加入根層。
    ///
    /// A parent id that is missing or names a file falls back to appending at
    /// the root. A draft whose id already exists leaves the tree unchanged.
    pub fn insert(&self, parent_id: Option<&FileId>, draft: FileNodeDraft) -> (Self, ProjectTreeDiff) {
        let mut diff = ProjectTreeDiff::default();
        if self.contains(&draft.id) {
            tracing::warn!(id = %draft.id, "insert skipped, id already present");
            return (self.clone(), diff);
        }

        let parent = parent_id
            .and_then(|id| self.nodes.get(id))
            .filter(|node| node.is_folder());
        if parent.is_none() {
            if let Some(requested) = parent_id {
                tracing::debug!(parent = %requested, "parent is not a folder, inserting at root");
            }
        }

        let mut next = self.clone();
        let node = draft.build(parent.map(|node| node.id.clone()));
        let id = node.id.clone();
        match parent {
            Some(parent) => {
                let mut updated = FileNode::clone(parent);
                updated.children.push(id.clone());
                diff.updated.push(updated.id.clone());
                next.nodes.insert(updated.id.clone(), Arc::new(updated));
            }
            None => next.roots.push(id.clone()),
        }
        next.nodes.insert(id.clone(), Arc::new(node));
        diff.added.push(id);
        (next, diff)
    }

    /// Removes a node and its whole subtree.
    /// 移除節點及其整個子樹。
    pub fn remove(&self, id: &FileId) -> (Self, ProjectTreeDiff) {
        let mut diff = ProjectTreeDiff::default();
        let Some(target) = self.nodes.get(id) else {
            return (self.clone(), diff);
        };

        let mut next = self.clone();
        match target.parent.as_ref().and_then(|parent| self.nodes.get(parent)) {
            Some(parent) => {
                let mut updated = FileNode::clone(parent);
                updated.children.retain(|child| child != id);
                diff.updated.push(updated.id.clone());
                next.nodes.insert(updated.id.clone(), Arc::new(updated));
            }
            None => next.roots.retain(|root| root != id),
        }

        let mut stack = vec![id.clone()];
        while let Some(current) = stack.pop() {
            if let Some(node) = next.nodes.remove(&current) {
                stack.extend(node.children.iter().rev().cloned());
                diff.removed.push(current);
            }
        }
        (next, diff)
    }

    /// Replaces the display name of a node. Sibling names may repeat.
    /// 更新節點名稱；同層名稱允許重複。
    pub fn rename(&self, id: &FileId, name: impl Into<String>) -> (Self, ProjectTreeDiff) {
        let name = name.into();
        self.rebuild_node(id, |node| node.name = name)
    }

    /// Replaces the content of a file node; folders are left untouched.
    /// 更新檔案內容；資料夾不受影響。
    pub fn update_content(&self, id: &FileId, content: impl Into<String>) -> (Self, ProjectTreeDiff) {
        match self.find(id) {
            Some(node) if node.is_file() => {
                let content = content.into();
                self.rebuild_node(id, |node| node.content = content)
            }
            _ => (self.clone(), ProjectTreeDiff::default()),
        }
    }

    fn rebuild_node<F>(&self, id: &FileId, edit: F) -> (Self, ProjectTreeDiff)
    where
        F: FnOnce(&mut FileNode),
    {
        let mut diff = ProjectTreeDiff::default();
        let Some(node) = self.nodes.get(id) else {
            return (self.clone(), diff);
        };
        let mut updated = FileNode::clone(node);
        edit(&mut updated);
        let mut next = self.clone();
        next.nodes.insert(id.clone(), Arc::new(updated));
        diff.updated.push(id.clone());
        (next, diff)
    }

    /// Builds a tree from the nested serialized shape.
    /// 由巢狀結構建立專案樹。
    ///
    /// A node's `parentId` is taken from where it is nested, not from the
    /// stored field.
    pub fn from_files(files: Vec<ProjectFile>) -> Result<Self, ProjectTreeError> {
        let mut tree = Self::default();
        for file in files {
            let id = file.id.clone();
            tree.adopt(file, None)?;
            tree.roots.push(id);
        }
        Ok(tree)
    }

    fn adopt(&mut self, file: ProjectFile, parent: Option<FileId>) -> Result<(), ProjectTreeError> {
        if self.nodes.contains_key(&file.id) {
            return Err(ProjectTreeError::DuplicateId(file.id));
        }
        let children = file.children.unwrap_or_default();
        if file.kind == FileKind::File && !children.is_empty() {
            return Err(ProjectTreeError::FileWithChildren(file.id));
        }

        let child_ids = children.iter().map(|child| child.id.clone()).collect();
        let node = FileNode {
            id: file.id.clone(),
            name: file.name,
            kind: file.kind,
            content: match file.kind {
                FileKind::File => file.content,
                FileKind::Folder => String::new(),
            },
            children: child_ids,
            parent,
        };
        self.nodes.insert(file.id.clone(), Arc::new(node));
        for child in children {
            self.adopt(child, Some(file.id.clone()))?;
        }
        Ok(())
    }

    /// Converts the arena back into the nested serialized shape.
    /// 將 arena 轉回巢狀序列化結構。
    pub fn to_files(&self) -> Vec<ProjectFile> {
        self.roots.iter().filter_map(|id| self.nested(id)).collect()
    }

    fn nested(&self, id: &FileId) -> Option<ProjectFile> {
        let node = self.find(id)?;
        let children = match node.kind {
            FileKind::File => None,
            FileKind::Folder => Some(
                node.children
                    .iter()
                    .filter_map(|child| self.nested(child))
                    .collect(),
            ),
        };
        Some(ProjectFile {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            content: node.content.clone(),
            children,
            parent_id: node.parent.clone(),
        })
    }
}

impl TryFrom<Vec<ProjectFile>> for ProjectTree {
    type Error = ProjectTreeError;

    fn try_from(files: Vec<ProjectFile>) -> Result<Self, Self::Error> {
        Self::from_files(files)
    }
}

impl From<ProjectTree> for Vec<ProjectFile> {
    fn from(tree: ProjectTree) -> Self {
        tree.to_files()
    }
}

/// Pre-order iterator over a [`ProjectTree`].
pub struct Preorder<'a> {
    tree: &'a ProjectTree,
    stack: Vec<(usize, &'a FileId)>,
}

impl<'a> Iterator for Preorder<'a> {
    type Item = (usize, &'a FileNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((depth, id)) = self.stack.pop() {
            let Some(node) = self.tree.nodes.get(id) else {
                continue;
            };
            let node: &'a FileNode = node;
            self.stack
                .extend(node.children.iter().rev().map(|child| (depth + 1, child)));
            return Some((depth, node));
        }
        None
    }
}

/// Nested node shape used by the durable store and export artifacts.
/// 持久化與匯出檔案使用的巢狀節點格式。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: FileId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<ProjectFile>>,
    /// Id of the enclosing folder. Written from the nesting on output; the
    /// nesting wins over a stored value on input.
    #[serde(rename = "parentId", default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<FileId>,
}
