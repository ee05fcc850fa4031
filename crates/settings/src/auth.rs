use cipherstudio_storage::{Storage, StorageError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const USER_KEY: &str = "cipher-studio-user";
pub const USERS_KEY: &str = "cipher-studio-users";
pub const OAUTH_STATE_KEY: &str = "google-oauth-state";

#[derive(Debug, Error)]
pub enum AuthStoreError {
    #[error("identity storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("failed to serialize identity record: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Email,
}

/// The signed-in user as stored in the identity record.
/// 身分紀錄中保存的已登入使用者。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    pub provider: AuthProvider,
    pub is_verified: bool,
}

/// Identity records: current user, local accounts and the pending OAuth state.
/// 身分相關紀錄：目前使用者、本機帳號與等待中的 OAuth state。
///
/// The presence of a current user is the only authentication gate.
#[derive(Debug)]
pub struct AuthStore<S> {
    storage: S,
}

impl<S: Storage> AuthStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// The signed-in user; an unreadable record counts as signed out.
    pub fn current_user(&self) -> Option<AuthUser> {
        self.read_json(USER_KEY)
    }

    pub fn is_authenticated(&self) -> bool {
        self.current_user().is_some()
    }

    pub fn set_current_user(&mut self, user: &AuthUser) -> Result<(), AuthStoreError> {
        let payload = serde_json::to_string(user)?;
        self.storage.set(USER_KEY, &payload)?;
        tracing::info!(user = %user.id, provider = ?user.provider, "user signed in");
        Ok(())
    }

    /// Locally registered email accounts, oldest first.
    pub fn registered_users(&self) -> Vec<AuthUser> {
        self.read_json(USERS_KEY).unwrap_or_default()
    }

    pub fn register(&mut self, user: &AuthUser) -> Result<(), AuthStoreError> {
        let mut users = self.registered_users();
        users.push(user.clone());
        let payload = serde_json::to_string(&users)?;
        self.storage.set(USERS_KEY, &payload)?;
        Ok(())
    }

    pub fn pending_state(&self) -> Option<String> {
        match self.storage.get(OAUTH_STATE_KEY) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(error = %err, "oauth state unreadable");
                None
            }
        }
    }

    pub fn set_pending_state(&mut self, state: &str) -> Result<(), AuthStoreError> {
        self.storage.set(OAUTH_STATE_KEY, state)?;
        Ok(())
    }

    pub fn clear_pending_state(&mut self) -> Result<(), AuthStoreError> {
        self.storage.remove(OAUTH_STATE_KEY)?;
        Ok(())
    }

    /// Clears the current user and any pending OAuth state.
    /// 清除目前使用者與等待中的 OAuth state。
    pub fn sign_out(&mut self) -> Result<(), AuthStoreError> {
        self.storage.remove(USER_KEY)?;
        self.storage.remove(OAUTH_STATE_KEY)?;
        tracing::info!("user signed out");
        Ok(())
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.storage.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                tracing::warn!(key, error = %err, "identity record unreadable");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "identity record corrupt");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cipherstudio_storage::MemoryStorage;

    fn sample() -> AuthUser {
        AuthUser {
            id: "email_1".into(),
            email: "ada@example.com".into(),
            name: "Ada".into(),
            picture: None,
            provider: AuthProvider::Email,
            is_verified: false,
        }
    }

    #[test]
    fn user_record_uses_camel_case_fields() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["provider"], "email");
        assert_eq!(json["isVerified"], false);
        assert!(json.get("picture").is_none());
    }

    #[test]
    fn sign_out_clears_user_and_state() {
        let mut store = AuthStore::new(MemoryStorage::new());
        assert!(!store.is_authenticated());
        store.set_current_user(&sample()).unwrap();
        store.set_pending_state("abc").unwrap();
        assert_eq!(store.current_user(), Some(sample()));

        store.sign_out().unwrap();
        assert!(!store.is_authenticated());
        assert!(store.pending_state().is_none());
    }

    #[test]
    fn corrupt_records_read_as_absent() {
        let mut storage = MemoryStorage::new();
        storage.set(USER_KEY, "{").unwrap();
        storage.set(USERS_KEY, "[1, 2]").unwrap();
        let store = AuthStore::new(storage);
        assert!(store.current_user().is_none());
        assert!(store.registered_users().is_empty());
    }
}
