//! Preferences, theme and identity records for CipherStudio.
//! CipherStudio 的偏好設定、主題與身分紀錄。

pub mod app_store;
pub mod auth;
pub mod preferences;
pub mod theme;

pub use app_store::{AppEvent, AppStore};
pub use auth::{
    AuthProvider, AuthStore, AuthStoreError, AuthUser, OAUTH_STATE_KEY, USERS_KEY, USER_KEY,
};
pub use preferences::{
    EditorPreferences, Preferences, PreferencesError, PreferencesStore, PreviewPreferences,
    DEFAULT_COMPILER_URL, DEFAULT_REACT_DOM_URL, DEFAULT_REACT_URL,
};
pub use theme::{ThemeError, ThemeKind, ThemePalette, ThemeStore, THEME_KEY};
