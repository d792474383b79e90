//! Field schema shared out of band with the downstream decoder.
//!
//! The message itself carries no column names, so the order and multipliers
//! here are a contract with the backend keyed by station identifier. The
//! schema is built once at startup and passed by reference everywhere a row
//! is formatted, parsed or encoded.

use alloc::string::String;
use core::fmt::Write;

use thiserror_no_std::Error;

/// Maximum number of sensor fields in one record
pub const MAX_FIELDS: usize = 8;

/// Maximum station identifier length
pub const MAX_STATION_LEN: usize = 8;

/// Maximum field name length
pub const MAX_FIELD_NAME_LEN: usize = 24;

/// Leading columns present in every record, before the sensor fields.
pub const DATETIME_COLUMN: &str = "datetime";
pub const BATTERY_COLUMN: &str = "batt_v";
pub const MEMORY_COLUMN: &str = "memory";
pub const COMMENT_COLUMN: &str = "comment";

/// Number of leading housekeeping columns (datetime, battery, memory).
pub const LEADING_COLUMNS: usize = 3;

/// Battery voltage is sent in centivolts.
pub const BATTERY_MULTIPLIER: f32 = 100.0;

/// Free memory is sent in hundreds of bytes.
pub const MEMORY_MULTIPLIER: f32 = 0.01;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaError {
    #[error("station identifier must be 1-8 ASCII letters")]
    InvalidStation,
    #[error("schema needs between 1 and 8 fields")]
    FieldCount,
    #[error("field {0} has an invalid name")]
    InvalidName(usize),
    #[error("field {0} multiplier must be finite and positive")]
    InvalidMultiplier(usize),
    #[error("field {0} message code must be an ASCII letter")]
    InvalidCode(usize),
    #[error("field {0} reuses a message code")]
    DuplicateCode(usize),
}

/// One sensor column: display name, scale multiplier, message code.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: heapless::String<MAX_FIELD_NAME_LEN>,
    pub multiplier: f32,
    pub code: char,
}

impl Field {
    pub fn new(name: &str, multiplier: f32, code: char) -> Result<Self, SchemaError> {
        let name = heapless::String::try_from(name).map_err(|_| SchemaError::InvalidName(0))?;
        Ok(Self {
            name,
            multiplier,
            code,
        })
    }
}

/// Column type tag used when parsing persisted rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Number,
}

/// Validated station + field registration.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    station: heapless::String<MAX_STATION_LEN>,
    fields: heapless::Vec<Field, MAX_FIELDS>,
}

impl FieldSchema {
    pub fn new(station: &str, fields: &[Field]) -> Result<Self, SchemaError> {
        if station.is_empty() || !station.bytes().all(|c| c.is_ascii_alphabetic()) {
            return Err(SchemaError::InvalidStation);
        }
        let station =
            heapless::String::try_from(station).map_err(|_| SchemaError::InvalidStation)?;

        if fields.is_empty() {
            return Err(SchemaError::FieldCount);
        }
        let fields: heapless::Vec<Field, MAX_FIELDS> =
            heapless::Vec::from_slice(fields).map_err(|_| SchemaError::FieldCount)?;

        for (i, field) in fields.iter().enumerate() {
            let reserved = [DATETIME_COLUMN, BATTERY_COLUMN, MEMORY_COLUMN, COMMENT_COLUMN];
            if field.name.is_empty()
                || reserved.contains(&field.name.as_str())
                || field
                    .name
                    .chars()
                    .any(|c| c == ',' || c == ':' || c.is_whitespace())
            {
                return Err(SchemaError::InvalidName(i));
            }
            if !field.multiplier.is_finite() || field.multiplier <= 0.0 {
                return Err(SchemaError::InvalidMultiplier(i));
            }
            if !field.code.is_ascii_alphabetic() {
                return Err(SchemaError::InvalidCode(i));
            }
            if fields[..i].iter().any(|f| f.code == field.code) {
                return Err(SchemaError::DuplicateCode(i));
            }
        }

        Ok(Self { station, fields })
    }

    /// Stock schema for a Hydros 21 water level / temperature /
    /// conductivity transducer.
    pub fn hydros21(station: &str) -> Result<Self, SchemaError> {
        Self::new(
            station,
            &[
                Field::new("water_level_mm", 1.0, 'A')?,
                Field::new("water_temp_c", 10.0, 'B')?,
                Field::new("water_ec_dcm", 1.0, 'C')?,
            ],
        )
    }

    pub fn station(&self) -> &str {
        &self.station
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `<station>:<codes>` line the backend registers the decoder under.
    pub fn registration(&self) -> String {
        let mut out = String::with_capacity(MAX_STATION_LEN + 1 + MAX_FIELDS);
        out.push_str(&self.station);
        out.push(':');
        self.fields.iter().for_each(|f| out.push(f.code));
        out
    }

    /// Header of the pending-transmission stream.
    pub fn hourly_header(&self) -> String {
        let mut out = String::new();
        let _ = write!(out, "{},{},{}", DATETIME_COLUMN, BATTERY_COLUMN, MEMORY_COLUMN);
        for field in self.fields.iter() {
            out.push(',');
            out.push_str(&field.name);
        }
        out
    }

    /// Header of the full-history stream (hourly header plus comment).
    pub fn data_header(&self) -> String {
        let mut out = self.hourly_header();
        out.push(',');
        out.push_str(COMMENT_COLUMN);
        out
    }

    /// Column types of a pending-transmission row.
    pub fn hourly_columns(&self) -> heapless::Vec<ColumnType, { MAX_FIELDS + LEADING_COLUMNS + 1 }> {
        let mut columns = heapless::Vec::new();
        let _ = columns.push(ColumnType::Text);
        let _ = columns.push(ColumnType::Number);
        let _ = columns.push(ColumnType::Number);
        for _ in self.fields.iter() {
            let _ = columns.push(ColumnType::Number);
        }
        columns
    }

    /// Column types of a full-history row.
    pub fn data_columns(&self) -> heapless::Vec<ColumnType, { MAX_FIELDS + LEADING_COLUMNS + 1 }> {
        let mut columns = self.hourly_columns();
        let _ = columns.push(ColumnType::Text);
        columns
    }
}
