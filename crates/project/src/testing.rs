use std::cell::Cell;
use std::io;
use std::path::PathBuf;
use std::rc::Rc;

use cipherstudio_storage::{MemoryStorage, Storage, StorageError};

/// Memory storage whose writes can be switched off from outside.
#[derive(Debug, Default)]
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    failing: Rc<Cell<bool>>,
}

impl FlakyStorage {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Shared switch; `true` makes every `set` fail.
    pub(crate) fn switch(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.failing)
    }

    pub(crate) fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
}

impl Storage for FlakyStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.failing.get() {
            return Err(StorageError::Write {
                path: PathBuf::from(key),
                source: io::Error::new(io::ErrorKind::Other, "disk full"),
            });
        }
        self.inner.set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.inner.remove(key)
    }
}
