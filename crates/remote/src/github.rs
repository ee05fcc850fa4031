use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cipherstudio_project::Project;
use reqwest::blocking::{Client, Response};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::RemoteError;

pub const GITHUB_API: &str = "https://api.github.com";
const USER_AGENT: &str = "cipherstudio";
const ACCEPT: &str = "application/vnd.github.v3+json";
const BRANCH: &str = "main";

/// Body of the create-repository call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryRequest {
    pub name: String,
    pub description: String,
    pub private: bool,
}

impl RepositoryRequest {
    /// Repository named after the project, lowercase with dashes.
    /// 以專案名稱（小寫、以破折號分隔）建立儲存庫設定。
    pub fn for_project(project: &Project) -> Self {
        Self {
            name: project.slug().to_lowercase(),
            description: format!("Exported from CipherStudio: {}", project.name),
            private: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Repository {
    pub full_name: String,
    pub html_url: String,
}

/// One file to upload, addressed by its slash-separated path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub path: String,
    pub content: String,
}

/// A source-hosting provider's repository and content API.
/// （原始碼託管服務的儲存庫與內容 API。）
pub trait SourceHost {
    fn create_repository(&self, request: &RepositoryRequest) -> Result<Repository, RemoteError>;
    fn upload_file(&self, repository: &Repository, file: &UploadFile) -> Result<(), RemoteError>;
}

/// Blocking GitHub REST client authenticated with a personal token.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: Client,
    api_base: Url,
    token: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_api_base(token, GITHUB_API)
    }

    pub fn with_api_base(token: impl Into<String>, api_base: &str) -> Result<Self, RemoteError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            http,
            api_base: Url::parse(api_base)?,
            token: token.into(),
        })
    }

    fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, RemoteError> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| RemoteError::InvalidBase(self.api_base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl SourceHost for GitHubClient {
    fn create_repository(&self, request: &RepositoryRequest) -> Result<Repository, RemoteError> {
        let url = self.endpoint(["user", "repos"])?;
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .json(request)
            .send()?;
        let response = check(response, "Failed to create repository")?;
        Ok(response.json()?)
    }

    fn upload_file(&self, repository: &Repository, file: &UploadFile) -> Result<(), RemoteError> {
        let segments = ["repos"]
            .into_iter()
            .chain(repository.full_name.split('/'))
            .chain(["contents"])
            .chain(file.path.split('/'));
        let url = self.endpoint(segments)?;
        let body = json!({
            "message": format!("Add {}", file.path),
            "content": STANDARD.encode(file.content.as_bytes()),
            "branch": BRANCH,
        });
        let response = self
            .http
            .put(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", ACCEPT)
            .json(&body)
            .send()?;
        check(response, &format!("Failed to upload {}", file.path))?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct ProviderMessage {
    message: Option<String>,
}

// Non-success responses surface the provider's `message` verbatim.
fn check(response: Response, fallback: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response
        .json::<ProviderMessage>()
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| fallback.to_string());
    Err(RemoteError::Provider {
        status: status.as_u16(),
        message,
    })
}

/// Outcome of a completed export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    pub repository: Repository,
    pub uploaded: Vec<String>,
}

/// Project files by path, followed by the generated manifest and readme.
/// 專案檔案（依路徑）以及產生的 package.json 與 README。
pub fn export_files(project: &Project, repository_name: &str) -> Result<Vec<UploadFile>, RemoteError> {
    let mut files: Vec<UploadFile> = project
        .files
        .files()
        .filter_map(|node| {
            project.files.path_of(&node.id).map(|path| UploadFile {
                path,
                content: node.content.clone(),
            })
        })
        .collect();

    let listing = files
        .iter()
        .map(|file| format!("- `{}`", file.path))
        .collect::<Vec<_>>()
        .join("\n");
    files.push(UploadFile {
        path: "package.json".to_string(),
        content: package_manifest(repository_name)?,
    });
    files.push(UploadFile {
        path: "README.md".to_string(),
        content: readme(&project.name, &listing),
    });
    Ok(files)
}

fn package_manifest(name: &str) -> Result<String, RemoteError> {
    let manifest = json!({
        "name": name,
        "version": "0.1.0",
        "private": true,
        "scripts": {
            "dev": "next dev",
            "build": "next build",
            "start": "next start",
            "lint": "next lint",
        },
        "dependencies": {
            "next": "14.0.0",
            "react": "^18.0.0",
            "react-dom": "^18.0.0",
        },
    });
    Ok(serde_json::to_string_pretty(&manifest)?)
}

fn readme(project_name: &str, listing: &str) -> String {
    format!(
        "# {project_name}\n\n\
         This project was exported from CipherStudio.\n\n\
         ## Getting Started\n\n\
         1. Install dependencies:\n   ```bash\n   npm install\n   ```\n\n\
         2. Run the development server:\n   ```bash\n   npm run dev\n   ```\n\n\
         3. Open [http://localhost:3000](http://localhost:3000) in your browser.\n\n\
         ## Files\n\n\
         {listing}\n"
    )
}

/// Creates the repository and uploads every file; the first failure aborts.
/// 建立儲存庫並逐一上傳檔案；任一上傳失敗即中止。
pub fn export_project<H: SourceHost + ?Sized>(
    host: &H,
    project: &Project,
    request: &RepositoryRequest,
) -> Result<ExportReport, RemoteError> {
    let files = export_files(project, &request.name)?;
    let repository = host.create_repository(request)?;
    tracing::info!(repository = %repository.full_name, files = files.len(), "repository created");

    let mut uploaded = Vec::with_capacity(files.len());
    for file in &files {
        if let Err(err) = host.upload_file(&repository, file) {
            tracing::warn!(path = %file.path, error = %err, "upload failed, export aborted");
            return Err(err);
        }
        uploaded.push(file.path.clone());
    }
    Ok(ExportReport {
        repository,
        uploaded,
    })
}
