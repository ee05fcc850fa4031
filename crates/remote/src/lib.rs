//! Outbound integrations: identity exchange and repository export.
//! 對外整合：身分交換與儲存庫匯出。

pub mod github;
pub mod identity;

use thiserror::Error;

pub use github::{
    export_files, export_project, ExportReport, GitHubClient, Repository, RepositoryRequest,
    SourceHost, UploadFile, GITHUB_API,
};
pub use identity::{
    CallbackParams, GoogleProfile, GoogleProvider, IdentityError, IdentityProvider,
    IdentityService, OAuthConfig,
};

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("failed to encode request: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("api base cannot carry a path: {0}")]
    InvalidBase(String),
    /// Provider rejected the call; `message` is shown as-is.
    #[error("{message}")]
    Provider { status: u16, message: String },
}
