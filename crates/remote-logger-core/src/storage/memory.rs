use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use super::{LINE_ENDING, Storage, StorageError};

/// RAM-backed [`Storage`] for host builds and tests.
///
/// `set_unavailable(true)` makes every open fail, the way a missing or
/// unmounted card does.
#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    files: BTreeMap<String, String>,
    unavailable: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Raw file contents, if the file exists.
    pub fn contents(&self, name: &str) -> Option<&str> {
        self.files.get(name).map(String::as_str)
    }

    /// Replace a file's contents wholesale (used to seed fixtures).
    pub fn insert(&mut self, name: &str, contents: &str) {
        self.files.insert(name.to_string(), contents.to_string());
    }
}

impl Storage for MemoryStorage {
    type Handle = String;

    fn len(&mut self, name: &str) -> Result<u64, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        self.files
            .get(name)
            .map(|file| file.len() as u64)
            .ok_or(StorageError::NotFound)
    }

    fn open_append(&mut self, name: &str) -> Result<Self::Handle, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        self.files.entry(name.to_string()).or_default();
        Ok(name.to_string())
    }

    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<(), StorageError> {
        let file = self.files.get_mut(handle.as_str()).ok_or(StorageError::Io)?;
        file.push_str(text);
        file.push_str(LINE_ENDING);
        Ok(())
    }

    fn close(&mut self, _handle: Self::Handle) {}

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        self.files.remove(name);
        Ok(())
    }

    fn read_to_string(&mut self, name: &str) -> Result<String, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        self.files.get(name).cloned().ok_or(StorageError::NotFound)
    }
}
