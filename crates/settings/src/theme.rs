use std::fmt;
use std::str::FromStr;

use cipherstudio_storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Storage key of the theme preference record.
pub const THEME_KEY: &str = "cipher-studio-theme";

#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("unknown theme {0:?}, expected \"light\" or \"dark\"")]
    InvalidKind(String),
    #[error("theme storage error: {0}")]
    Storage(#[from] StorageError),
}

/// The two color schemes a preview document can be rendered in.
/// 預覽文件可使用的兩種配色。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThemeKind {
    Dark,
    Light,
}

impl ThemeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ThemeKind::Dark => "dark",
            ThemeKind::Light => "light",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            ThemeKind::Dark => ThemeKind::Light,
            ThemeKind::Light => ThemeKind::Dark,
        }
    }

    /// Persisted value if it is a known theme, else the OS preference.
    /// 優先使用已保存的主題，否則依作業系統偏好決定。
    pub fn resolve(persisted: Option<&str>, system_prefers_dark: bool) -> Self {
        match persisted.map(str::parse::<ThemeKind>) {
            Some(Ok(kind)) => kind,
            _ if system_prefers_dark => ThemeKind::Dark,
            _ => ThemeKind::Light,
        }
    }

    pub fn palette(self) -> ThemePalette {
        match self {
            ThemeKind::Dark => ThemePalette {
                background: "#0f0f0f",
                text: "#e4e4e7",
                error_background: "#1a1a1e",
                error_border: "#ef4444",
                error_title: "#fca5a5",
            },
            ThemeKind::Light => ThemePalette {
                background: "#ffffff",
                text: "#1a1a1e",
                error_background: "#f5f5f5",
                error_border: "#ef4444",
                error_title: "#fca5a5",
            },
        }
    }
}

impl FromStr for ThemeKind {
    type Err = ThemeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "dark" => Ok(ThemeKind::Dark),
            "light" => Ok(ThemeKind::Light),
            other => Err(ThemeError::InvalidKind(other.to_string())),
        }
    }
}

impl fmt::Display for ThemeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Colors embedded into the preview document for one theme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemePalette {
    pub background: &'static str,
    pub text: &'static str,
    pub error_background: &'static str,
    pub error_border: &'static str,
    pub error_title: &'static str,
}

/// Reads and writes the theme preference record.
/// 讀寫主題偏好紀錄。
#[derive(Debug)]
pub struct ThemeStore<S> {
    storage: S,
}

impl<S: Storage> ThemeStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// The stored theme, if the record holds a recognised value.
    pub fn stored(&self) -> Option<ThemeKind> {
        match self.storage.get(THEME_KEY) {
            Ok(Some(raw)) => raw.parse().ok(),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(error = %err, "theme record unreadable");
                None
            }
        }
    }

    pub fn current(&self, system_prefers_dark: bool) -> ThemeKind {
        match self.stored() {
            Some(kind) => kind,
            None => ThemeKind::resolve(None, system_prefers_dark),
        }
    }

    pub fn set(&mut self, kind: ThemeKind) -> Result<(), ThemeError> {
        self.storage.set(THEME_KEY, kind.as_str())?;
        tracing::debug!(theme = %kind, "theme stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherstudio_storage::MemoryStorage;

    #[test]
    fn resolve_prefers_the_persisted_value() {
        assert_eq!(ThemeKind::resolve(Some("light"), true), ThemeKind::Light);
        assert_eq!(ThemeKind::resolve(Some("dark"), false), ThemeKind::Dark);
        assert_eq!(ThemeKind::resolve(Some("sepia"), true), ThemeKind::Dark);
        assert_eq!(ThemeKind::resolve(None, false), ThemeKind::Light);
    }

    #[test]
    fn store_round_trips_the_literal_value() {
        let mut store = ThemeStore::new(MemoryStorage::new());
        assert_eq!(store.current(true), ThemeKind::Dark);
        store.set(ThemeKind::Light).unwrap();
        assert_eq!(store.current(true), ThemeKind::Light);
        let storage = store.into_storage();
        assert_eq!(storage.get(THEME_KEY).unwrap().as_deref(), Some("light"));
    }

    #[test]
    fn palettes_differ_per_theme() {
        assert_eq!(ThemeKind::Dark.palette().background, "#0f0f0f");
        assert_eq!(ThemeKind::Light.palette().text, "#1a1a1e");
        assert_eq!(ThemeKind::Dark.toggled(), ThemeKind::Light);
        assert!("blue".parse::<ThemeKind>().is_err());
    }
}
