use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, bail, Context, Result};
use cipherstudio_preview::{FileContext, PreviewConfig, PreviewPipeline};
use cipherstudio_project::{FileId, FileNode, Project, ProjectId, Studio};
use cipherstudio_remote::{
    export_project, CallbackParams, GitHubClient, GoogleProvider, IdentityService, OAuthConfig,
    RepositoryRequest, GITHUB_API,
};
use cipherstudio_settings::{AppStore, PreferencesStore, ThemeKind};
use cipherstudio_storage::{FileStorage, Storage};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const ACTIVE_PROJECT_KEY: &str = "cipher-studio-active-project";
const LOG_ENV: &str = "CIPHERSTUDIO_LOG";

#[derive(Parser)]
#[command(
    name = "cipherstudio-cli",
    about = "Command-line host for CipherStudio projects",
    author,
    version
)]
struct Cli {
    /// 資料目錄；預設為 ./.cipherstudio。 / Data directory (defaults to ./.cipherstudio).
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 管理專案。 / Manage projects.
    #[command(subcommand)]
    Project(ProjectCommand),
    /// 編輯目前專案的檔案樹。 / Edit the active project's file tree.
    #[command(subcommand)]
    File(FileCommand),
    /// 立即儲存並寫出快照。 / Save now and write a snapshot.
    Save(SnapshotArgs),
    /// 匯出目前專案為 JSON。 / Export the active project as JSON.
    Export(SnapshotArgs),
    /// 匯入專案 JSON 並開啟。 / Import a project JSON and open it.
    Import(ImportArgs),
    /// 產生預覽文件。 / Render the preview document.
    Preview(PreviewArgs),
    /// 讀取或切換主題。 / Read or change the theme.
    #[command(subcommand)]
    Theme(ThemeCommand),
    /// 匯入/匯出偏好設定。 / Import or export preferences.
    #[command(subcommand)]
    Preferences(PreferencesCommand),
    /// 登入流程。 / Sign-in flows.
    #[command(subcommand)]
    Auth(AuthCommand),
    /// 匯出到 GitHub。 / Export to GitHub.
    #[command(subcommand)]
    Github(GithubCommand),
}

#[derive(Subcommand)]
enum ProjectCommand {
    /// 建立並開啟新專案。 / Create and open a new project.
    New,
    /// 列出已儲存的專案。 / List stored projects.
    List,
    /// 開啟指定專案。 / Open a project by id.
    Open(ProjectIdArgs),
    /// 刪除指定專案。 / Delete a project by id.
    Delete(ProjectIdArgs),
}

#[derive(Args)]
struct ProjectIdArgs {
    /// 專案 ID。 / Project id.
    #[arg(value_name = "ID")]
    id: String,
}

#[derive(Subcommand)]
enum FileCommand {
    /// 新增檔案。 / Create a file.
    Add(AddFileArgs),
    /// 新增資料夾。 / Create a folder.
    Mkdir(MkdirArgs),
    /// 重新命名節點。 / Rename a node.
    Rename(RenameArgs),
    /// 刪除節點（含子節點）。 / Delete a node and its descendants.
    Rm(PathArgs),
    /// 取代檔案內容。 / Replace a file's content.
    Write(WriteArgs),
    /// 輸出檔案內容。 / Print a file's content.
    Cat(PathArgs),
    /// 顯示檔案樹。 / Print the file tree.
    Tree,
}

#[derive(Args)]
struct AddFileArgs {
    /// 檔案名稱。 / File name.
    #[arg(value_name = "NAME")]
    name: String,
    /// 上層資料夾路徑。 / Parent folder path.
    #[arg(long, value_name = "PATH")]
    parent: Option<String>,
    /// 初始內容。 / Initial content.
    #[arg(long, value_name = "TEXT", default_value = "")]
    content: String,
}

#[derive(Args)]
struct MkdirArgs {
    /// 資料夾名稱。 / Folder name.
    #[arg(value_name = "NAME")]
    name: String,
    /// 上層資料夾路徑。 / Parent folder path.
    #[arg(long, value_name = "PATH")]
    parent: Option<String>,
}

#[derive(Args)]
struct RenameArgs {
    /// 節點路徑。 / Node path.
    #[arg(value_name = "PATH")]
    path: String,
    /// 新名稱。 / New name.
    #[arg(value_name = "NAME")]
    name: String,
}

#[derive(Args)]
struct PathArgs {
    /// 節點路徑（以 / 分隔）。 / Slash-separated node path.
    #[arg(value_name = "PATH")]
    path: String,
}

#[derive(Args)]
struct WriteArgs {
    /// 檔案路徑。 / File path.
    #[arg(value_name = "PATH")]
    path: String,
    /// 新內容；略過時從標準輸入讀取。 / New content; read from stdin when omitted.
    #[arg(long, value_name = "TEXT", conflicts_with = "from")]
    content: Option<String>,
    /// 從檔案讀取內容。 / Read the content from a file.
    #[arg(long, value_name = "FILE")]
    from: Option<PathBuf>,
}

#[derive(Args)]
struct SnapshotArgs {
    /// 輸出資料夾；預設為目前目錄。 / Output directory (defaults to current directory).
    #[arg(long, value_name = "DIR")]
    dir: Option<PathBuf>,
}

#[derive(Args)]
struct ImportArgs {
    /// 專案 JSON 檔案。 / Project JSON file.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Args)]
struct PreviewArgs {
    /// 預覽 HTML 輸出路徑。 / Where to write the preview HTML.
    #[arg(long, value_name = "FILE", conflicts_with = "data_url")]
    output: Option<PathBuf>,
    /// 以 data URL 輸出。 / Print the document as a data URL.
    #[arg(long)]
    data_url: bool,
}

#[derive(Subcommand)]
enum ThemeCommand {
    /// 顯示目前主題。 / Print the current theme.
    Get,
    /// 設定主題。 / Set the theme.
    Set(ThemeSetArgs),
    /// 切換淺色/深色。 / Flip between light and dark.
    Toggle,
}

#[derive(Args)]
struct ThemeSetArgs {
    #[arg(value_enum)]
    theme: ThemeChoice,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThemeChoice {
    Light,
    Dark,
}

impl From<ThemeChoice> for ThemeKind {
    fn from(choice: ThemeChoice) -> Self {
        match choice {
            ThemeChoice::Light => ThemeKind::Light,
            ThemeChoice::Dark => ThemeKind::Dark,
        }
    }
}

#[derive(Subcommand)]
enum PreferencesCommand {
    /// 匯出目前偏好設定。 / Export current preferences.
    Export(PreferencesExportArgs),
    /// 匯入偏好設定 JSON。 / Import preferences from JSON.
    Import(PreferencesImportArgs),
}

#[derive(Args)]
struct PreferencesExportArgs {
    /// 輸出檔案路徑。 / Destination file path.
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args)]
struct PreferencesImportArgs {
    /// 輸入檔案路徑。 / Source preferences JSON.
    #[arg(value_name = "FILE")]
    input: PathBuf,
}

#[derive(Subcommand)]
enum AuthCommand {
    /// 產生 Google 授權網址。 / Print the Google consent URL.
    Url,
    /// 以回呼網址完成登入。 / Complete sign-in from the callback URL.
    Callback(CallbackArgs),
    /// 顯示目前使用者。 / Print the signed-in user.
    Whoami,
    /// 登出。 / Sign out.
    SignOut,
}

#[derive(Args)]
struct CallbackArgs {
    /// 瀏覽器導回的完整網址。 / Full URL the browser was redirected to.
    #[arg(value_name = "URL")]
    url: String,
}

#[derive(Subcommand)]
enum GithubCommand {
    /// 建立儲存庫並上傳目前專案。 / Create a repository and upload the active project.
    Export(GithubExportArgs),
}

#[derive(Args)]
struct GithubExportArgs {
    /// 個人存取權杖。 / Personal access token.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: String,
    /// 儲存庫名稱；預設取自專案名稱。 / Repository name; derived from the project name by default.
    #[arg(long, value_name = "NAME")]
    name: Option<String>,
    /// 設為私有儲存庫。 / Make the repository private.
    #[arg(long)]
    private: bool,
    /// API 位址。 / API base URL.
    #[arg(long, value_name = "URL", default_value = GITHUB_API)]
    api_base: String,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let Cli { data_dir, command } = Cli::parse();
    let data_dir = resolve_data_dir(data_dir)?;
    match command {
        Commands::Project(subcommand) => execute_project_command(subcommand, &data_dir),
        Commands::File(subcommand) => execute_file_command(subcommand, &data_dir),
        Commands::Save(args) => save_project(args, &data_dir),
        Commands::Export(args) => export_active(args, &data_dir),
        Commands::Import(args) => import_project(args, &data_dir),
        Commands::Preview(args) => render_preview(args, &data_dir),
        Commands::Theme(subcommand) => execute_theme_command(subcommand, &data_dir),
        Commands::Preferences(subcommand) => execute_preferences_command(subcommand, &data_dir),
        Commands::Auth(subcommand) => execute_auth_command(subcommand, &data_dir),
        Commands::Github(subcommand) => execute_github_command(subcommand, &data_dir),
    }
}

fn execute_project_command(command: ProjectCommand, data_dir: &Path) -> Result<()> {
    let mut studio = open_studio(data_dir)?;
    match command {
        ProjectCommand::New => {
            let project = studio
                .new_project()
                .context("failed to save pending edits before creating a project")?;
            println!("{}\t{}", project.id, project.name);
        }
        ProjectCommand::List => {
            let active = studio.project().id.clone();
            for project in studio.projects() {
                let marker = if project.id == active { '*' } else { ' ' };
                println!(
                    "{marker} {}\t{}\t{} files",
                    project.id,
                    project.name,
                    project.files.files().count()
                );
            }
            return Ok(());
        }
        ProjectCommand::Open(args) => {
            let id = ProjectId::from_string(args.id);
            studio
                .open_project(&id)
                .with_context(|| format!("failed to open project {id}"))?;
            println!("Opened '{}'", studio.project().name);
        }
        ProjectCommand::Delete(args) => {
            let id = ProjectId::from_string(args.id);
            let removed = studio
                .delete_project(&id)
                .with_context(|| format!("failed to delete project {id}"))?;
            if !removed {
                bail!("project {id} not found");
            }
            println!("Deleted project {id}");
        }
    }
    close_studio(studio)
}

fn execute_file_command(command: FileCommand, data_dir: &Path) -> Result<()> {
    let mut studio = open_studio(data_dir)?;
    let now = Instant::now();
    match command {
        FileCommand::Add(args) => {
            let parent = resolve_parent(studio.project(), args.parent.as_deref())?;
            let id = studio.create_file(&args.name, parent.as_ref(), now);
            if !args.content.is_empty() {
                studio.update_file_content(&id, &args.content, now);
            }
            println!("{}", node_path(studio.project(), &id)?);
        }
        FileCommand::Mkdir(args) => {
            let parent = resolve_parent(studio.project(), args.parent.as_deref())?;
            let id = studio.create_folder(&args.name, parent.as_ref(), now);
            println!("{}", node_path(studio.project(), &id)?);
        }
        FileCommand::Rename(args) => {
            let id = resolve_node(studio.project(), &args.path)?.id.clone();
            studio.rename_file(&id, &args.name, now);
            println!("{}", node_path(studio.project(), &id)?);
        }
        FileCommand::Rm(args) => {
            let id = resolve_node(studio.project(), &args.path)?.id.clone();
            let diff = studio.delete_file(&id, now);
            println!("Removed {} node(s)", diff.removed.len());
        }
        FileCommand::Write(args) => {
            let node = resolve_node(studio.project(), &args.path)?;
            if !node.is_file() {
                bail!("'{}' is a folder", args.path);
            }
            let id = node.id.clone();
            let content = match (args.content, args.from) {
                (Some(content), _) => content,
                (None, Some(path)) => fs::read_to_string(&path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                (None, None) => {
                    let mut buffer = String::new();
                    io::stdin()
                        .read_to_string(&mut buffer)
                        .context("failed to read content from stdin")?;
                    buffer
                }
            };
            studio.update_file_content(&id, &content, now);
        }
        FileCommand::Cat(args) => {
            let node = resolve_node(studio.project(), &args.path)?;
            if !node.is_file() {
                bail!("'{}' is a folder", args.path);
            }
            print!("{}", node.content);
            return Ok(());
        }
        FileCommand::Tree => {
            print_tree(studio.project());
            return Ok(());
        }
    }
    close_studio(studio)
}

fn save_project(args: SnapshotArgs, data_dir: &Path) -> Result<()> {
    let mut studio = open_studio(data_dir)?;
    let dir = resolve_output_dir(args.dir)?;
    let path = studio
        .save_now(&dir)
        .with_context(|| format!("failed to save project into {}", dir.display()))?;
    println!("Saved snapshot to {}", path.display());
    close_studio(studio)
}

fn export_active(args: SnapshotArgs, data_dir: &Path) -> Result<()> {
    let studio = open_studio(data_dir)?;
    let dir = resolve_output_dir(args.dir)?;
    let path = studio
        .export_to(&dir)
        .with_context(|| format!("failed to export project into {}", dir.display()))?;
    println!("Exported project to {}", path.display());
    Ok(())
}

fn import_project(args: ImportArgs, data_dir: &Path) -> Result<()> {
    let mut studio = open_studio(data_dir)?;
    let input = resolve_input_path(&args.input)?;
    let bytes =
        fs::read(&input).with_context(|| format!("failed to read {}", input.display()))?;
    studio
        .import(&bytes, Instant::now())
        .with_context(|| format!("failed to import {}", input.display()))?;
    println!("Imported '{}' ({})", studio.project().name, studio.project().id);
    close_studio(studio)
}

fn render_preview(args: PreviewArgs, data_dir: &Path) -> Result<()> {
    let preferences = load_preferences(data_dir)?;
    let studio = open_studio(data_dir)?;
    let app = AppStore::new(FileStorage::new(data_dir), false);

    let config = PreviewConfig::from_preferences(preferences.preferences());
    let mut pipeline = PreviewPipeline::standard(config, app.theme())
        .context("failed to build the source rewriter")?;
    let output = match args.output {
        Some(path) => resolve_input_path(&path)?,
        None => data_dir.join("preview").join("index.html"),
    };
    let mut context = FileContext::new(&output);
    let ticket = pipeline
        .run(studio.project(), &mut context, Instant::now())
        .context("preview failed")?;
    pipeline.on_context_loaded(ticket);

    if args.data_url {
        let document = pipeline
            .last_document()
            .ok_or_else(|| anyhow!("no preview document was produced"))?;
        println!("{}", document.to_data_url());
    } else {
        println!("{}", context.path().display());
    }
    Ok(())
}

fn execute_theme_command(command: ThemeCommand, data_dir: &Path) -> Result<()> {
    let mut app = AppStore::new(FileStorage::new(data_dir), false);
    match command {
        ThemeCommand::Get => {}
        ThemeCommand::Set(args) => app
            .set_theme(args.theme.into())
            .context("failed to store theme")?,
        ThemeCommand::Toggle => {
            app.toggle_theme().context("failed to store theme")?;
        }
    }
    println!("{}", app.theme());
    Ok(())
}

fn execute_preferences_command(command: PreferencesCommand, data_dir: &Path) -> Result<()> {
    match command {
        PreferencesCommand::Export(args) => export_preferences(args, data_dir),
        PreferencesCommand::Import(args) => import_preferences(args, data_dir),
    }
}

fn export_preferences(args: PreferencesExportArgs, data_dir: &Path) -> Result<()> {
    let store = load_preferences(data_dir)?;
    let output = resolve_input_path(&args.output)?;
    store
        .export_to(&output)
        .with_context(|| format!("failed to export preferences to {}", output.display()))?;
    println!("Exported preferences to {}", output.display());
    Ok(())
}

fn import_preferences(args: PreferencesImportArgs, data_dir: &Path) -> Result<()> {
    let mut store = load_preferences(data_dir)?;
    let input = resolve_input_path(&args.input)?;
    if !input.exists() {
        bail!("preferences file '{}' does not exist", input.display());
    }
    store
        .import_from(&input)
        .with_context(|| format!("failed to import preferences from {}", input.display()))?;
    println!("Imported preferences from {}", input.display());
    Ok(())
}

fn execute_auth_command(command: AuthCommand, data_dir: &Path) -> Result<()> {
    let config = OAuthConfig::from_env();
    let provider = GoogleProvider::new(&config);
    let mut identity = IdentityService::new(config, provider, FileStorage::new(data_dir));
    match command {
        AuthCommand::Url => {
            let url = identity.authorization_url()?;
            println!("{url}");
        }
        AuthCommand::Callback(args) => {
            let params = CallbackParams::from_url(&args.url)?;
            let user = identity.handle_callback(&params)?;
            println!("Signed in as {} <{}>", user.name, user.email);
        }
        AuthCommand::Whoami => match identity.current_user() {
            Some(user) => println!("{} <{}>", user.name, user.email),
            None => println!("Not signed in"),
        },
        AuthCommand::SignOut => {
            identity.sign_out()?;
            println!("Signed out");
        }
    }
    Ok(())
}

fn execute_github_command(command: GithubCommand, data_dir: &Path) -> Result<()> {
    let GithubCommand::Export(args) = command;
    let studio = open_studio(data_dir)?;
    let project = studio.project();
    let mut request = RepositoryRequest::for_project(project);
    if let Some(name) = args.name {
        request.name = name;
    }
    request.private = args.private;

    let client = GitHubClient::with_api_base(args.token, &args.api_base)?;
    let report = export_project(&client, project, &request)?;
    println!(
        "Exported {} file(s) to {}",
        report.uploaded.len(),
        report.repository.html_url
    );
    Ok(())
}

fn load_preferences(data_dir: &Path) -> Result<PreferencesStore> {
    let path = data_dir.join("preferences.json");
    PreferencesStore::load(&path)
        .with_context(|| format!("failed to load preferences from {}", path.display()))
}

/// Opens the studio on the data directory and re-opens the last active project.
/// 開啟資料目錄中的工作室並回到上次使用的專案。
fn open_studio(data_dir: &Path) -> Result<Studio<FileStorage>> {
    let preferences = load_preferences(data_dir)?;
    let storage = FileStorage::new(data_dir);
    let active = storage
        .get(ACTIVE_PROJECT_KEY)
        .context("failed to read the active project")?;
    let mut studio = Studio::start(storage, preferences.preferences().editor.autosave_delay());
    if let Some(id) = active.map(|raw| ProjectId::from_string(raw.trim())) {
        if studio.project().id != id && studio.open_project(&id).is_err() {
            tracing::warn!(project = %id, "active project no longer exists");
        }
    }
    Ok(studio)
}

/// Commits pending edits and remembers which project is open.
fn close_studio(mut studio: Studio<FileStorage>) -> Result<()> {
    for result in studio.flush() {
        result.context("failed to save project")?;
    }
    let mut storage = studio.store().storage().clone();
    storage
        .set(ACTIVE_PROJECT_KEY, studio.project().id.as_str())
        .context("failed to remember the active project")?;
    Ok(())
}

fn resolve_node<'a>(project: &'a Project, path: &str) -> Result<&'a FileNode> {
    let wanted = path.trim_matches('/');
    project
        .files
        .iter()
        .map(|(_, node)| node)
        .find(|node| project.files.path_of(&node.id).as_deref() == Some(wanted))
        .ok_or_else(|| anyhow!("no file or folder at '{path}'"))
}

fn resolve_parent(project: &Project, path: Option<&str>) -> Result<Option<FileId>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let node = resolve_node(project, path)?;
    if !node.is_folder() {
        bail!("'{path}' is not a folder");
    }
    Ok(Some(node.id.clone()))
}

fn node_path(project: &Project, id: &FileId) -> Result<String> {
    project
        .files
        .path_of(id)
        .ok_or_else(|| anyhow!("node {id} is not in the project"))
}

fn print_tree(project: &Project) {
    println!("{}", project.name);
    for (depth, node) in project.files.iter() {
        let indent = "  ".repeat(depth + 1);
        if node.is_folder() {
            println!("{indent}{}/", node.name);
        } else {
            println!("{indent}{}", node.name);
        }
    }
}

fn resolve_data_dir(data_dir: Option<PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(path) => resolve_input_path(&path),
        None => Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(".cipherstudio")),
    }
}

fn resolve_output_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(path) => resolve_input_path(&path),
        None => std::env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
