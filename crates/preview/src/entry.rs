use cipherstudio_project::{FileNode, ProjectTree};

/// File-name conventions used to pick the entry file and stylesheets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRules {
    pub source_extension: String,
    pub stylesheet_extension: String,
}

impl Default for EntryRules {
    fn default() -> Self {
        Self {
            source_extension: ".tsx".to_string(),
            stylesheet_extension: ".css".to_string(),
        }
    }
}

impl EntryRules {
    pub fn is_stylesheet(&self, node: &FileNode) -> bool {
        node.name.ends_with(&self.stylesheet_extension)
    }

    pub fn is_source(&self, node: &FileNode) -> bool {
        node.name.ends_with(&self.source_extension)
    }
}

/// Picks the entry file in pre-order across the whole tree.
/// 依前序走訪整棵樹挑選進入點檔案。
///
/// Order of preference: the file named `entry_point`, the first file with
/// the source extension, the first file that is not a stylesheet.
pub fn select_entry<'a>(
    tree: &'a ProjectTree,
    entry_point: Option<&str>,
    rules: &EntryRules,
) -> Option<&'a FileNode> {
    let declared = entry_point.and_then(|name| tree.files().find(|node| node.name == name));
    declared
        .or_else(|| tree.files().find(|node| rules.is_source(node)))
        .or_else(|| tree.files().find(|node| !rules.is_stylesheet(node)))
}

/// Concatenates every stylesheet's content in tree order.
pub fn collect_stylesheets(tree: &ProjectTree, rules: &EntryRules) -> String {
    tree.files()
        .filter(|node| rules.is_stylesheet(node))
        .map(|node| node.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
