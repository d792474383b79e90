//! Removable-storage persistence.
//!
//! The card holds two append-only CSV streams:
//!
//! - `/DATA.csv`: every sample ever taken, with a free-text comment column.
//!   Never removed programmatically except by a test-mode wipe.
//! - `/HOURLY.csv`: samples taken on hourly boundaries since the last
//!   transmit. Removed after every transmit attempt.
//!
//! A stream gets its header exactly once, when it is created, and every
//! later write appends exactly one whole line.

pub mod memory;
pub mod record_store;
pub mod sd_card;

use alloc::string::String;

use thiserror_no_std::Error;

pub use memory::MemoryStorage;
pub use record_store::{RecordStore, Row, RowReader, StoreError, StoreStats, Value};
pub use sd_card::SdCardStorage;

/// Line terminator written after every header and data line.
pub const LINE_ENDING: &str = "\r\n";

/// Logical append-only streams on the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// Full permanent history (includes comments)
    Data,
    /// Pending-transmission window
    Hourly,
}

impl Stream {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Data => "/DATA.csv",
            Self::Hourly => "/HOURLY.csv",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Data => "DATA",
            Self::Hourly => "HOURLY",
        }
    }
}

impl core::fmt::Display for Stream {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage medium unavailable")]
    Unavailable,
    #[error("file not found")]
    NotFound,
    #[error("storage I/O failure")]
    Io,
}

/// Durable block/file storage collaborator (SD card in the field).
///
/// Handles are exclusively owned by the single control loop; no locking.
pub trait Storage {
    type Handle;

    fn exists(&mut self, name: &str) -> bool {
        self.len(name).is_ok()
    }

    /// Size of `name` in bytes. Absent files yield [`StorageError::NotFound`].
    fn len(&mut self, name: &str) -> Result<u64, StorageError>;

    /// Open `name` for appending, creating it if absent.
    fn open_append(&mut self, name: &str) -> Result<Self::Handle, StorageError>;

    /// Append `text` plus [`LINE_ENDING`].
    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<(), StorageError>;

    fn close(&mut self, handle: Self::Handle);

    /// Remove `name`. Removing an absent file is not an error.
    fn remove(&mut self, name: &str) -> Result<(), StorageError>;

    /// Read the whole file. Absent files yield [`StorageError::NotFound`].
    fn read_to_string(&mut self, name: &str) -> Result<String, StorageError>;
}
