//! `std::fs` storage backend standing in for the SD card.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};
use remote_logger_core::storage::{LINE_ENDING, Storage, StorageError};

/// Card root mapped onto a host directory.
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name.trim_start_matches('/'))
    }
}

impl Storage for FsStorage {
    type Handle = File;

    fn len(&mut self, name: &str) -> Result<u64, StorageError> {
        match fs::metadata(self.path(name)) {
            Ok(meta) if meta.is_file() => Ok(meta.len()),
            Ok(_) => Err(StorageError::NotFound),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => {
                error!("Cannot stat {}: {}", name, e);
                Err(StorageError::Io)
            }
        }
    }

    fn open_append(&mut self, name: &str) -> Result<Self::Handle, StorageError> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(name))
            .map_err(|e| {
                error!("Cannot open {}: {}", name, e);
                StorageError::Unavailable
            })
    }

    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<(), StorageError> {
        let mut line = String::with_capacity(text.len() + LINE_ENDING.len());
        line.push_str(text);
        line.push_str(LINE_ENDING);
        handle.write_all(line.as_bytes()).map_err(|e| {
            error!("Write failed: {}", e);
            StorageError::Io
        })
    }

    fn close(&mut self, handle: Self::Handle) {
        if let Err(e) = handle.sync_all() {
            debug!("Sync on close failed: {}", e);
        }
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                error!("Cannot remove {}: {}", name, e);
                Err(StorageError::Io)
            }
        }
    }

    fn read_to_string(&mut self, name: &str) -> Result<String, StorageError> {
        match fs::read_to_string(self.path(name)) {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(e) => {
                error!("Cannot read {}: {}", name, e);
                Err(StorageError::Io)
            }
        }
    }
}
