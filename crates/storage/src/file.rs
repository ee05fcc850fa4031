use std::fs;
use std::io;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::{validate_key, Storage, StorageError};

/// Storage backend that keeps one JSON-ish file per record key.  
/// 每個紀錄鍵對應一個檔案的儲存後端。
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the file backing `key`.  
    /// 取得指定鍵所對應的檔案路徑。
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        validate_key(key)?;
        let path = self.record_path(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Read { path, source }),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.record_path(key);
        write_atomic(&path, value.as_bytes()).map_err(|source| StorageError::Write {
            path: path.clone(),
            source,
        })?;
        tracing::trace!(key, bytes = value.len(), "record written");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        validate_key(key)?;
        let path = self.record_path(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Write { path, source }),
        }
    }
}

/// Writes data atomically by using a temporary sibling file followed by rename.  
/// 以臨時檔案搭配 rename 實現原子寫入。
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, data)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_get_remove_round_trip() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path().join("data"));

        assert!(storage.get("cipher-studio-theme").unwrap().is_none());
        storage.set("cipher-studio-theme", "dark").unwrap();
        assert_eq!(
            storage.get("cipher-studio-theme").unwrap().as_deref(),
            Some("dark")
        );
        assert!(storage.record_path("cipher-studio-theme").exists());

        storage.remove("cipher-studio-theme").unwrap();
        storage.remove("cipher-studio-theme").unwrap();
        assert!(storage.get("cipher-studio-theme").unwrap().is_none());
    }

    #[test]
    fn rejects_keys_that_escape_the_root() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        assert!(matches!(
            storage.set("../outside", "x"),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(storage.get(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn overwrite_leaves_no_temporary_file() {
        let dir = tempdir().unwrap();
        let mut storage = FileStorage::new(dir.path());
        storage.set("projects", "[]").unwrap();
        storage.set("projects", "[1]").unwrap();
        assert_eq!(storage.get("projects").unwrap().as_deref(), Some("[1]"));
        assert!(!dir.path().join("projects.tmp").exists());
    }
}
