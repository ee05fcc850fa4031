use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cipherstudio_storage::write_atomic;
use thiserror::Error;

const PREFERENCES_VERSION: u32 = 1;

pub const DEFAULT_REACT_URL: &str = "https://unpkg.com/react@18/umd/react.development.js";
pub const DEFAULT_REACT_DOM_URL: &str = "https://unpkg.com/react-dom@18/umd/react-dom.development.js";
pub const DEFAULT_COMPILER_URL: &str = "https://unpkg.com/@babel/standalone/babel.min.js";

#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("failed to read preferences {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse preferences {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize preferences {path}: {source}")]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write preferences {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Versioned user preferences stored as `preferences.json`.
/// 以 `preferences.json` 保存、具版本號的使用者偏好設定。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub editor: EditorPreferences,
    #[serde(default)]
    pub preview: PreviewPreferences,
}

fn default_version() -> u32 {
    PREFERENCES_VERSION
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            version: PREFERENCES_VERSION,
            editor: EditorPreferences::default(),
            preview: PreviewPreferences::default(),
        }
    }
}

impl Preferences {
    pub fn sanitize(&mut self) {
        if self.version == 0 {
            self.version = PREFERENCES_VERSION;
        }
        self.editor.sanitize();
        self.preview.sanitize();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditorPreferences {
    #[serde(default = "default_autosave_delay")]
    pub autosave_delay_ms: u64,
    #[serde(default = "default_source_extension")]
    pub source_extension: String,
    #[serde(default = "default_stylesheet_extension")]
    pub stylesheet_extension: String,
}

fn default_autosave_delay() -> u64 {
    1000
}

fn default_source_extension() -> String {
    ".tsx".to_string()
}

fn default_stylesheet_extension() -> String {
    ".css".to_string()
}

impl Default for EditorPreferences {
    fn default() -> Self {
        Self {
            autosave_delay_ms: default_autosave_delay(),
            source_extension: default_source_extension(),
            stylesheet_extension: default_stylesheet_extension(),
        }
    }
}

impl EditorPreferences {
    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_delay_ms)
    }

    fn sanitize(&mut self) {
        if self.autosave_delay_ms == 0 {
            self.autosave_delay_ms = default_autosave_delay();
        }
        self.autosave_delay_ms = self.autosave_delay_ms.clamp(100, 60_000);
        normalize_extension(&mut self.source_extension, default_source_extension);
        normalize_extension(&mut self.stylesheet_extension, default_stylesheet_extension);
    }
}

// Accepts "tsx" as well as ".tsx".
fn normalize_extension(value: &mut String, fallback: fn() -> String) {
    let trimmed = value.trim().trim_start_matches('.');
    *value = if trimmed.is_empty() {
        fallback()
    } else {
        format!(".{trimmed}")
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewPreferences {
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,
    #[serde(default = "default_react_url")]
    pub react_url: String,
    #[serde(default = "default_react_dom_url")]
    pub react_dom_url: String,
    #[serde(default = "default_compiler_url")]
    pub compiler_url: String,
}

fn default_load_timeout() -> u64 {
    3000
}

fn default_react_url() -> String {
    DEFAULT_REACT_URL.to_string()
}

fn default_react_dom_url() -> String {
    DEFAULT_REACT_DOM_URL.to_string()
}

fn default_compiler_url() -> String {
    DEFAULT_COMPILER_URL.to_string()
}

impl Default for PreviewPreferences {
    fn default() -> Self {
        Self {
            load_timeout_ms: default_load_timeout(),
            react_url: default_react_url(),
            react_dom_url: default_react_dom_url(),
            compiler_url: default_compiler_url(),
        }
    }
}

impl PreviewPreferences {
    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    fn sanitize(&mut self) {
        if self.load_timeout_ms == 0 {
            self.load_timeout_ms = default_load_timeout();
        }
        self.load_timeout_ms = self.load_timeout_ms.clamp(500, 60_000);
        if self.react_url.trim().is_empty() {
            self.react_url = default_react_url();
        }
        if self.react_dom_url.trim().is_empty() {
            self.react_dom_url = default_react_dom_url();
        }
        if self.compiler_url.trim().is_empty() {
            self.compiler_url = default_compiler_url();
        }
    }
}

#[derive(Debug)]
pub struct PreferencesStore {
    path: PathBuf,
    data: Preferences,
}

impl PreferencesStore {
    pub fn new(path: impl Into<PathBuf>, preferences: Preferences) -> Self {
        Self {
            path: path.into(),
            data: preferences,
        }
    }

    /// Loads preferences; a missing file yields sanitized defaults.
    /// 載入偏好設定；檔案不存在時回傳預設值。
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PreferencesError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            let mut data = Preferences::default();
            data.sanitize();
            return Ok(Self { path, data });
        }

        let data = read_preferences(&path)?;
        tracing::debug!(path = %path.display(), "preferences loaded");
        Ok(Self { path, data })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.data
    }

    pub fn update<F>(&mut self, mut op: F) -> Result<(), PreferencesError>
    where
        F: FnMut(&mut Preferences),
    {
        op(&mut self.data);
        self.data.sanitize();
        self.save()
    }

    pub fn overwrite(&mut self, preferences: Preferences) -> Result<(), PreferencesError> {
        self.data = preferences;
        self.data.sanitize();
        self.save()
    }

    pub fn save(&self) -> Result<(), PreferencesError> {
        write_preferences(&self.path, &self.data)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), PreferencesError> {
        write_preferences(path.as_ref(), &self.data)
    }

    /// Replaces the current preferences with a file, keeping a `.bak` copy.
    /// 以外部檔案取代目前設定，並保留 `.bak` 備份。
    pub fn import_from(&mut self, source: impl AsRef<Path>) -> Result<(), PreferencesError> {
        let data = read_preferences(source.as_ref())?;
        self.backup_existing()?;
        self.data = data;
        self.save()
    }

    fn backup_existing(&self) -> Result<(), PreferencesError> {
        if self.path.exists() {
            let backup = self.path.with_extension("bak");
            fs::copy(&self.path, &backup).map_err(|source| PreferencesError::Write {
                path: backup,
                source,
            })?;
        }
        Ok(())
    }
}

fn read_preferences(path: &Path) -> Result<Preferences, PreferencesError> {
    let contents = fs::read_to_string(path).map_err(|source| PreferencesError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut data: Preferences =
        serde_json::from_str(&contents).map_err(|source| PreferencesError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    data.sanitize();
    Ok(data)
}

fn write_preferences(path: &Path, data: &Preferences) -> Result<(), PreferencesError> {
    let payload =
        serde_json::to_string_pretty(data).map_err(|source| PreferencesError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
    write_atomic(path, payload.as_bytes()).map_err(|source| PreferencesError::Write {
        path: path.to_path_buf(),
        source,
    })
}
