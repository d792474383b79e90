//! Message compaction.
//!
//! Turns the pending-transmission stream into one short-burst-data text:
//!
//! ```text
//! <station>:<YYMMDDHH>:<batt*100>:<memory*0.01>:<f1*m1>,<f2*m2>,...:<f1*m1>,...:
//! ```
//!
//! The timestamp comes from the first buffered row, battery and memory from
//! the last. Every row becomes one colon-terminated group of scaled field
//! values in schema order.

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{self, Write};

use log::{debug, warn};
use thiserror_no_std::Error;

use crate::encoding::{EncodeError, encode, encode_timestamp};
use crate::schema::{BATTERY_MULTIPLIER, FieldSchema, LEADING_COLUMNS, MEMORY_MULTIPLIER};
use crate::storage::{RecordStore, Row, Storage, StoreError, Stream};

/// Mobile-originated text limit of an SBD transceiver.
pub const MAX_MESSAGE_LEN: usize = 340;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    #[error("pending buffer holds no rows")]
    EmptyBuffer,
    #[error("bad timestamp: {0}")]
    Format(EncodeError),
    #[error("could not read pending buffer: {0}")]
    Store(StoreError),
    #[error("buffered row does not match the field schema")]
    Layout,
}

impl From<EncodeError> for CompactError {
    fn from(e: EncodeError) -> Self {
        Self::Format(e)
    }
}

impl From<StoreError> for CompactError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Compacted telemetry payload, ready for `send_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    text: String,
    rows: usize,
}

impl Message {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of buffered rows carried.
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn exceeds_limit(&self) -> bool {
        self.text.len() > MAX_MESSAGE_LEN
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Build the message from every row currently in the pending stream.
///
/// A malformed row ends the read; the rows before it are still sent. Nothing
/// is written to storage.
pub fn compact<S: Storage>(
    store: &mut RecordStore<S>,
    schema: &FieldSchema,
) -> Result<Message, CompactError> {
    let columns = schema.hourly_columns();

    let mut rows: Vec<Row> = Vec::new();
    for row in store.read_all(Stream::Hourly, &columns)? {
        match row {
            Ok(row) => rows.push(row),
            // Already logged and counted by the reader.
            Err(_) => break,
        }
    }

    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        warn!("Nothing buffered in {}; no message built", Stream::Hourly);
        return Err(CompactError::EmptyBuffer);
    };

    let timestamp = first.text(0).ok_or(CompactError::Layout)?;
    let battery = last.number(1).ok_or(CompactError::Layout)?;
    let memory = last.number(2).ok_or(CompactError::Layout)?;

    let mut text = String::with_capacity(32 + rows.len() * schema.len() * 6);
    text.push_str(schema.station());
    text.push(':');
    text.push_str(&encode_timestamp(timestamp)?);
    let _ = write!(
        text,
        ":{}:{}:",
        encode(battery, BATTERY_MULTIPLIER),
        encode(memory, MEMORY_MULTIPLIER)
    );

    for row in rows.iter() {
        for (i, field) in schema.fields().iter().enumerate() {
            let value = row.number(LEADING_COLUMNS + i).ok_or(CompactError::Layout)?;
            if i > 0 {
                text.push(',');
            }
            let _ = write!(text, "{}", encode(value, field.multiplier));
        }
        text.push(':');
    }

    let message = Message {
        text,
        rows: rows.len(),
    };
    if message.exceeds_limit() {
        warn!(
            "Message is {} bytes, over the {} byte SBD limit",
            message.len(),
            MAX_MESSAGE_LEN
        );
    }
    debug!("Compacted {} rows: {}", message.rows, message);
    Ok(message)
}
