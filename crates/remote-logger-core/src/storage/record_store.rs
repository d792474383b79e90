use alloc::string::{String, ToString};
use alloc::vec::Vec;

use log::{debug, error, warn};
use thiserror_no_std::Error;

use super::{Storage, StorageError, Stream};
use crate::schema::{ColumnType, LEADING_COLUMNS, MAX_FIELDS};

/// Upper bound on columns in any persisted row.
pub const MAX_COLUMNS: usize = MAX_FIELDS + LEADING_COLUMNS + 1;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("{0} stream could not be opened; write dropped")]
    Unavailable(Stream),
    #[error("{stream} line {line}: expected {expected} columns, found {found}")]
    Parse {
        stream: Stream,
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("{stream} line {line}: column {column} is not a number")]
    InvalidNumber {
        stream: Stream,
        line: usize,
        column: usize,
    },
    #[error("storage failure: {0}")]
    Storage(StorageError),
}

impl From<StorageError> for StoreError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

/// Counters for events the field can only see through the files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Writes dropped because the card could not be opened
    pub unavailable: u32,
    /// Lines successfully appended (headers included)
    pub written_lines: u32,
    /// Streams whose parse stopped early on a malformed row
    pub parse_errors: u32,
}

/// One typed column value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f32),
}

/// One parsed data line.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn text(&self, column: usize) -> Option<&str> {
        match self.values.get(column)? {
            Value::Text(s) => Some(s),
            Value::Number(_) => None,
        }
    }

    pub fn number(&self, column: usize) -> Option<f32> {
        match self.values.get(column)? {
            Value::Number(n) => Some(*n),
            Value::Text(_) => None,
        }
    }
}

/// Lazy row sequence over one stream snapshot.
///
/// The first malformed line yields a single error and ends the sequence;
/// everything after it is treated as absent. Re-invoke
/// [`RecordStore::read_all`] to start over.
pub struct RowReader<'a> {
    stream: Stream,
    text: String,
    pos: usize,
    line: usize,
    columns: heapless::Vec<ColumnType, MAX_COLUMNS>,
    done: bool,
    stats: &'a mut StoreStats,
}

impl RowReader<'_> {
    fn next_line(&mut self) -> Option<&str> {
        while self.pos < self.text.len() {
            let rest = &self.text[self.pos..];
            let (line, advance) = match rest.find('\n') {
                Some(i) => (&rest[..i], i + 1),
                None => (rest, rest.len()),
            };
            self.pos += advance;
            self.line += 1;

            let line = line.trim_end_matches('\r');
            // Line 1 is the header.
            if self.line == 1 || line.is_empty() {
                continue;
            }
            return Some(line);
        }
        None
    }

    fn parse(&self, line: &str) -> Result<Row, StoreError> {
        let found = line.split(',').count();
        if found != self.columns.len() {
            return Err(StoreError::Parse {
                stream: self.stream,
                line: self.line,
                expected: self.columns.len(),
                found,
            });
        }

        let mut values = Vec::with_capacity(found);
        for (column, (raw, kind)) in line.split(',').zip(self.columns.iter()).enumerate() {
            values.push(match kind {
                ColumnType::Text => Value::Text(raw.to_string()),
                ColumnType::Number => {
                    Value::Number(raw.trim().parse::<f32>().map_err(|_| {
                        StoreError::InvalidNumber {
                            stream: self.stream,
                            line: self.line,
                            column,
                        }
                    })?)
                }
            });
        }
        Ok(Row { values })
    }
}

impl Iterator for RowReader<'_> {
    type Item = Result<Row, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let line = match self.next_line() {
            Some(line) => line.to_string(),
            None => {
                self.done = true;
                return None;
            }
        };

        match self.parse(&line) {
            Ok(row) => Some(Ok(row)),
            Err(e) => {
                warn!("Stopping read of {}: {}", self.stream, e);
                self.stats.parse_errors += 1;
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Append-only CSV record store over a [`Storage`] collaborator.
pub struct RecordStore<S: Storage> {
    storage: S,
    stats: StoreStats,
}

impl<S: Storage> RecordStore<S> {
    pub fn new(storage: S) -> Self {
        Self {
            storage,
            stats: StoreStats::default(),
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Append `data_line`, writing `header` first if the stream is new.
    ///
    /// A stream is new when it is absent or empty. An empty file is what a
    /// reset between create and first write leaves behind.
    ///
    /// An unopenable stream drops the line, bumps
    /// [`StoreStats::unavailable`] and reports [`StoreError::Unavailable`].
    pub fn append(&mut self, stream: Stream, header: &str, data_line: &str) -> Result<(), StoreError> {
        let path = stream.path();
        let fresh = matches!(self.storage.len(path), Ok(0) | Err(StorageError::NotFound));

        let mut handle = match self.storage.open_append(path) {
            Ok(handle) => handle,
            Err(e) => {
                self.stats.unavailable += 1;
                error!("Could not open {} ({}); line dropped", path, e);
                return Err(StoreError::Unavailable(stream));
            }
        };

        let mut result = Ok(());
        if fresh {
            debug!("Creating {} with header", path);
            result = self.storage.write_line(&mut handle, header);
            if result.is_ok() {
                self.stats.written_lines += 1;
            }
        }
        if result.is_ok() {
            result = self.storage.write_line(&mut handle, data_line);
            if result.is_ok() {
                self.stats.written_lines += 1;
            }
        }
        self.storage.close(handle);

        result.map_err(|e| {
            error!("Write to {} failed: {}", path, e);
            StoreError::Storage(e)
        })
    }

    /// Remove the stream entirely. Clearing an absent stream is fine.
    pub fn clear(&mut self, stream: Stream) -> Result<(), StoreError> {
        match self.storage.remove(stream.path()) {
            Ok(()) | Err(StorageError::NotFound) => {
                debug!("Cleared {}", stream);
                Ok(())
            }
            Err(e) => {
                error!("Could not clear {}: {}", stream, e);
                Err(StoreError::Storage(e))
            }
        }
    }

    /// Parse every line after the header into rows typed by `columns`.
    ///
    /// An absent stream yields no rows.
    pub fn read_all(&mut self, stream: Stream, columns: &[ColumnType]) -> Result<RowReader<'_>, StoreError> {
        let text = match self.storage.read_to_string(stream.path()) {
            Ok(text) => text,
            Err(StorageError::NotFound) => String::new(),
            Err(e) => return Err(StoreError::Storage(e)),
        };

        Ok(RowReader {
            stream,
            text,
            pos: 0,
            line: 0,
            columns: heapless::Vec::from_slice(columns).map_err(|_| StoreError::Parse {
                stream,
                line: 0,
                expected: MAX_COLUMNS,
                found: columns.len(),
            })?,
            done: false,
            stats: &mut self.stats,
        })
    }

    /// First line of the stream, if it exists and is non-empty.
    pub fn header(&mut self, stream: Stream) -> Result<Option<String>, StoreError> {
        match self.storage.read_to_string(stream.path()) {
            Ok(text) => Ok(text
                .lines()
                .next()
                .filter(|l| !l.is_empty())
                .map(ToString::to_string)),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(StoreError::Storage(e)),
        }
    }

    /// Number of data lines (header excluded).
    pub fn count_rows(&mut self, stream: Stream) -> Result<usize, StoreError> {
        match self.storage.read_to_string(stream.path()) {
            Ok(text) => Ok(text.lines().skip(1).filter(|l| !l.is_empty()).count()),
            Err(StorageError::NotFound) => Ok(0),
            Err(e) => Err(StoreError::Storage(e)),
        }
    }

    /// Remove both streams (test-mode reset).
    pub fn wipe(&mut self) -> Result<(), StoreError> {
        warn!("Wiping {} and {}", Stream::Data, Stream::Hourly);
        self.clear(Stream::Data)?;
        self.clear(Stream::Hourly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use alloc::vec;

    const HEADER: &str = "datetime,batt_v,memory,level";
    const COLUMNS: [ColumnType; 4] = [
        ColumnType::Text,
        ColumnType::Number,
        ColumnType::Number,
        ColumnType::Number,
    ];

    fn store() -> RecordStore<MemoryStorage> {
        RecordStore::new(MemoryStorage::new())
    }

    #[test]
    fn test_fresh_append_writes_header_once() {
        let mut store = store();
        store
            .append(Stream::Hourly, HEADER, "2024-06-04T13:00:00,4.01,18342,1.234")
            .unwrap();
        assert_eq!(
            store.storage().contents("/HOURLY.csv").unwrap(),
            "datetime,batt_v,memory,level\r\n2024-06-04T13:00:00,4.01,18342,1.234\r\n"
        );

        store
            .append(Stream::Hourly, HEADER, "2024-06-04T14:00:00,4.00,18300,1.3")
            .unwrap();
        let contents = store.storage().contents("/HOURLY.csv").unwrap();
        assert_eq!(contents.lines().count(), 3);
        assert_eq!(contents.matches("datetime").count(), 1);
        assert_eq!(store.stats().written_lines, 3);
    }

    #[test]
    fn test_empty_stream_gets_header() {
        let mut store = store();
        store.storage_mut().insert("/HOURLY.csv", "");

        store
            .append(Stream::Hourly, HEADER, "2024-06-04T13:00:00,4.01,18342,1.234")
            .unwrap();
        assert_eq!(
            store.storage().contents("/HOURLY.csv").unwrap(),
            "datetime,batt_v,memory,level\r\n2024-06-04T13:00:00,4.01,18342,1.234\r\n"
        );

        let rows: Vec<Row> = store
            .read_all(Stream::Hourly, &COLUMNS)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].number(3), Some(1.234));
    }

    #[test]
    fn test_unavailable_storage_is_counted() {
        let mut store = store();
        store.storage_mut().set_unavailable(true);

        assert_eq!(
            store.append(Stream::Data, HEADER, "x"),
            Err(StoreError::Unavailable(Stream::Data))
        );
        assert_eq!(
            store.append(Stream::Data, HEADER, "x"),
            Err(StoreError::Unavailable(Stream::Data))
        );
        assert_eq!(store.stats().unavailable, 2);
        assert!(store.storage().contents("/DATA.csv").is_none());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut store = store();
        store.append(Stream::Hourly, HEADER, "a,1,2,3").unwrap();
        store.clear(Stream::Hourly).unwrap();
        store.clear(Stream::Hourly).unwrap();
        assert!(store.storage().contents("/HOURLY.csv").is_none());
        assert_eq!(store.count_rows(Stream::Hourly).unwrap(), 0);
    }

    #[test]
    fn test_read_all_types_columns() {
        let mut store = store();
        store
            .append(Stream::Hourly, HEADER, "2024-06-04T13:00:00,4.01,18342,1.234")
            .unwrap();
        store
            .append(Stream::Hourly, HEADER, "2024-06-04T14:00:00,3.99,18000,-9")
            .unwrap();

        let rows: Vec<Row> = store
            .read_all(Stream::Hourly, &COLUMNS)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text(0), Some("2024-06-04T13:00:00"));
        assert_eq!(rows[0].number(1), Some(4.01));
        assert_eq!(rows[0].number(3), Some(1.234));
        assert_eq!(rows[1].number(3), Some(-9.0));
        assert_eq!(rows[1].text(1), None);
    }

    #[test]
    fn test_read_all_absent_stream_is_empty() {
        let mut store = store();
        assert_eq!(store.read_all(Stream::Hourly, &COLUMNS).unwrap().count(), 0);
    }

    #[test]
    fn test_read_all_stops_at_malformed_row() {
        let mut storage = MemoryStorage::new();
        storage.insert(
            "/HOURLY.csv",
            "datetime,batt_v,memory,level\r\na,1,2,3\r\nb,1,2\r\nc,1,2,3\r\n",
        );
        let mut store = RecordStore::new(storage);

        let items: Vec<_> = store.read_all(Stream::Hourly, &COLUMNS).unwrap().collect();
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(
            items[1],
            Err(StoreError::Parse {
                stream: Stream::Hourly,
                line: 3,
                expected: 4,
                found: 3,
            })
        );
        assert_eq!(store.stats().parse_errors, 1);
    }

    #[test]
    fn test_read_all_rejects_non_numeric() {
        let mut storage = MemoryStorage::new();
        storage.insert("/HOURLY.csv", "h\na,1,oops,3\n");
        let mut store = RecordStore::new(storage);

        let items: Vec<_> = store.read_all(Stream::Hourly, &COLUMNS).unwrap().collect();
        assert_eq!(
            items,
            vec![Err(StoreError::InvalidNumber {
                stream: Stream::Hourly,
                line: 2,
                column: 2,
            })]
        );
    }

    #[test]
    fn test_header_and_count() {
        let mut store = store();
        assert_eq!(store.header(Stream::Data).unwrap(), None);
        store.append(Stream::Data, HEADER, "a,1,2,3").unwrap();
        store.append(Stream::Data, HEADER, "b,1,2,3").unwrap();
        assert_eq!(store.header(Stream::Data).unwrap().as_deref(), Some(HEADER));
        assert_eq!(store.count_rows(Stream::Data).unwrap(), 2);
    }

    #[test]
    fn test_wipe_removes_both_streams() {
        let mut store = store();
        store.append(Stream::Data, HEADER, "a,1,2,3").unwrap();
        store.append(Stream::Hourly, HEADER, "a,1,2,3").unwrap();
        store.wipe().unwrap();
        assert!(store.storage().contents("/DATA.csv").is_none());
        assert!(store.storage().contents("/HOURLY.csv").is_none());
    }
}
