use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::serde_time;
use crate::tree::{FileNodeDraft, ProjectTree};

pub const DEFAULT_PROJECT_NAME: &str = "Untitled Project";
pub const DEFAULT_ENTRY_POINT: &str = "App.tsx";

const WELCOME_COMPONENT: &str = r#"export default function App() {
  return (
    <div style={{ padding: '20px', fontFamily: 'sans-serif' }}>
      <h1>Welcome to CipherStudio</h1>
      <p>Edit this file to see changes in the preview!</p>
    </div>
  );
}"#;

/// Stable identifier of a project inside the durable project list.
/// 專案在持久化清單中的穩定識別碼。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(String);

impl ProjectId {
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

impl Default for ProjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named project: its file forest plus bookkeeping.
/// 專案：檔案樹與相關中繼資料。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub files: ProjectTree,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<String>,
    #[serde(with = "serde_time")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "serde_time")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Creates an empty project.
    /// 建立空白專案。
    pub fn new(name: impl Into<String>) -> Self {
        // Stored timestamps carry millisecond precision.
        let now = Utc::now().trunc_subsecs(3);
        Self {
            id: ProjectId::new(),
            name: name.into(),
            files: ProjectTree::new(),
            entry_point: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the starter project with a single `App.tsx` entry file.
    /// 建立含單一 `App.tsx` 進入點的預設專案。
    pub fn new_default() -> Self {
        let mut project = Self::new(DEFAULT_PROJECT_NAME);
        let (files, _) = project
            .files
            .insert(None, FileNodeDraft::file(DEFAULT_ENTRY_POINT, WELCOME_COMPONENT));
        project.files = files;
        project.entry_point = Some(DEFAULT_ENTRY_POINT.to_string());
        project
    }

    /// Name with whitespace runs replaced by dashes, for snapshot file names.
    pub fn slug(&self) -> String {
        let slug = self.name.split_whitespace().collect::<Vec<_>>().join("-");
        if slug.is_empty() {
            "project".to_string()
        } else {
            slug
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_project_has_a_single_entry_file() {
        let project = Project::new_default();
        assert_eq!(project.entry_point.as_deref(), Some(DEFAULT_ENTRY_POINT));
        assert_eq!(project.files.len(), 1);
        let entry = project.files.find_first_file().unwrap();
        assert_eq!(entry.name, DEFAULT_ENTRY_POINT);
        assert!(entry.content.contains("export default function App"));
    }

    #[test]
    fn serializes_with_the_storage_field_names() {
        let project = Project::new_default();
        let json = serde_json::to_value(&project).unwrap();
        assert_eq!(json["entryPoint"], DEFAULT_ENTRY_POINT);
        assert_eq!(json["files"][0]["type"], "file");
        let created = json["createdAt"].as_str().unwrap();
        assert!(created.ends_with('Z'));
        assert_eq!(created.len(), "2024-01-01T00:00:00.000Z".len());
    }

    #[test]
    fn accepts_projects_written_by_the_browser_build() {
        let raw = r#"{
            "id": "1718000000000",
            "name": "My Demo",
            "files": [{"id": "1", "name": "App.tsx", "type": "file", "content": "x"}],
            "entryPoint": "App.tsx",
            "createdAt": "2024-06-10T06:13:20.000Z",
            "updatedAt": "2024-06-10T06:13:21.500Z"
        }"#;
        let project: Project = serde_json::from_str(raw).unwrap();
        assert_eq!(project.id.as_str(), "1718000000000");
        assert_eq!(project.slug(), "My-Demo");
        assert_eq!(project.updated_at.timestamp_millis() - project.created_at.timestamp_millis(), 1500);
    }
}
