//! Named-record storage shared by the project list, theme and identity records.
//! 專案清單、主題與身分紀錄共用的具名紀錄儲存層。

mod file;
mod memory;

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use file::{write_atomic, FileStorage};
pub use memory::MemoryStorage;

/// A key/value store holding whole textual records.  
/// 以鍵值方式保存完整文字紀錄的儲存介面。
///
/// Records are read and written as a unit; there is no partial update and no
/// locking, so two writers interleaving read and write can lose an update.
pub trait Storage {
    /// Returns the record stored under `key`, or `Ok(None)` when absent.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the record stored under `key`.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Deletes the record; deleting an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Errors raised by storage backends.  
/// 儲存後端可能發生的錯誤。
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid record key {0:?}")]
    InvalidKey(String),
    #[error("failed to read record {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write record {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub(crate) fn validate_key(key: &str) -> Result<(), StorageError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidKey(key.to_string()))
    }
}
