use std::io;
use std::path::{Path, PathBuf};

use cipherstudio_storage::write_atomic;
use thiserror::Error;

use crate::document::PreviewDocument;

/// Isolation flags for the preview frame.
/// 預覽框架的隔離旗標。
///
/// Scripts are always allowed. Same-origin access is only needed so the frame
/// can read its generated document; top-level navigation, popups and forms
/// are never granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxPolicy {
    pub allow_same_origin: bool,
}

impl Default for SandboxPolicy {
    fn default() -> Self {
        Self {
            allow_same_origin: true,
        }
    }
}

impl SandboxPolicy {
    /// Value of the frame's `sandbox` attribute.
    pub fn attribute(&self) -> String {
        let mut flags = vec!["allow-scripts"];
        if self.allow_same_origin {
            flags.push("allow-same-origin");
        }
        flags.join(" ")
    }
}

/// Identifies one run so late completion signals from an abandoned context
/// can be told apart from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunTicket(pub(crate) u64);

impl RunTicket {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("failed to write preview document {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("execution context unavailable: {0}")]
    Unavailable(String),
}

/// An isolated, disposable place a preview document is loaded into.
/// （載入預覽文件的隔離且可拋棄的執行環境。）
///
/// Loading replaces whatever the context showed before. The host reports
/// completion back through the pipeline with the ticket it was given here.
pub trait ExecutionContext {
    fn load(
        &mut self,
        document: &PreviewDocument,
        policy: &SandboxPolicy,
        ticket: RunTicket,
    ) -> Result<(), ExecutionError>;
}

/// Writes the document to a file a browser can open.
/// 將預覽文件寫成可供瀏覽器開啟的檔案。
#[derive(Debug, Clone)]
pub struct FileContext {
    path: PathBuf,
    last_ticket: Option<RunTicket>,
}

impl FileContext {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            last_ticket: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn last_ticket(&self) -> Option<RunTicket> {
        self.last_ticket
    }
}

impl ExecutionContext for FileContext {
    fn load(
        &mut self,
        document: &PreviewDocument,
        policy: &SandboxPolicy,
        ticket: RunTicket,
    ) -> Result<(), ExecutionError> {
        write_atomic(&self.path, document.html().as_bytes()).map_err(|source| {
            ExecutionError::Write {
                path: self.path.clone(),
                source,
            }
        })?;
        self.last_ticket = Some(ticket);
        tracing::debug!(
            path = %self.path.display(),
            ticket = ticket.value(),
            sandbox = %policy.attribute(),
            "preview document written"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_never_grants_navigation() {
        let attribute = SandboxPolicy::default().attribute();
        assert_eq!(attribute, "allow-scripts allow-same-origin");
        assert!(!attribute.contains("top-navigation"));
        let strict = SandboxPolicy {
            allow_same_origin: false,
        };
        assert_eq!(strict.attribute(), "allow-scripts");
    }
}
