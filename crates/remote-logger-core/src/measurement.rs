//! One sampling tick: read the sensor and housekeeping, then persist.

use alloc::string::String;
use core::fmt::Write;

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::clock::DateTime;
use crate::config::CycleTiming;
use crate::schema::FieldSchema;
use crate::sensors::{Housekeeping, Sensor, SensorError, SensorValues};
use crate::storage::{RecordStore, Storage, StoreError, Stream};

/// Value written for every field when the sensor gives no reading.
pub const NO_READING: f32 = -9.0;

/// Comment recorded alongside a [`NO_READING`] row.
pub const SENSOR_ERROR_COMMENT: &str = "sensor error";

/// One sampled observation. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: DateTime,
    pub battery_v: f32,
    pub free_memory: u32,
    pub values: SensorValues,
    pub comment: Option<String>,
}

impl Reading {
    /// `datetime,batt_v,memory,<fields>` as written to the pending stream.
    pub fn hourly_line(&self) -> String {
        let mut line = String::with_capacity(64);
        let _ = write!(
            line,
            "{},{},{}",
            self.timestamp, self.battery_v, self.free_memory
        );
        for value in self.values.iter() {
            let _ = write!(line, ",{}", value);
        }
        line
    }

    /// History line: the hourly line plus the sanitised comment column.
    pub fn data_line(&self, extra_comment: Option<&str>) -> String {
        let mut line = self.hourly_line();
        line.push(',');

        let parts = [self.comment.as_deref(), extra_comment];
        let mut first = true;
        for part in parts.into_iter().flatten().filter(|p| !p.is_empty()) {
            if !first {
                line.push(' ');
            }
            first = false;
            push_sanitised(&mut line, part);
        }
        line
    }

    /// True when the sensor gave nothing and the sentinel was recorded.
    pub fn is_sentinel(&self) -> bool {
        self.values.iter().all(|v| *v == NO_READING)
    }
}

/// Comments live in a CSV column; separators would shift every later field.
fn push_sanitised(line: &mut String, comment: &str) {
    line.extend(comment.chars().map(|c| match c {
        ',' | '\r' | '\n' => ' ',
        c => c,
    }));
}

/// Drives the sensor and housekeeping collaborators for one tick.
pub struct MeasurementCycle<Se, Hk, D> {
    sensor: Se,
    housekeeping: Hk,
    delay: D,
    timing: CycleTiming,
}

impl<Se, Hk, D> MeasurementCycle<Se, Hk, D>
where
    Se: Sensor,
    Hk: Housekeeping,
    D: DelayNs,
{
    pub fn new(sensor: Se, housekeeping: Hk, delay: D, timing: CycleTiming) -> Self {
        Self {
            sensor,
            housekeeping,
            delay,
            timing,
        }
    }

    pub fn sensor_mut(&mut self) -> &mut Se {
        &mut self.sensor
    }

    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    /// Take one reading stamped with `timestamp`.
    ///
    /// The sensor is always powered off again, even when the read fails. A
    /// failed or short read yields the [`NO_READING`] sentinel for every
    /// field with the comment [`SENSOR_ERROR_COMMENT`].
    pub async fn sample(&mut self, schema: &FieldSchema, timestamp: DateTime) -> Reading {
        self.sensor.power_on();
        self.delay.delay_ms(self.timing.sensor_warmup_ms).await;

        let result = self.sensor.sample().await;

        self.sensor.power_off();
        self.delay.delay_ms(self.timing.sensor_cooldown_ms).await;

        let result = result.and_then(|values| {
            if values.len() == schema.len() {
                Ok(values)
            } else {
                warn!(
                    "Sensor returned {} values, schema has {}",
                    values.len(),
                    schema.len()
                );
                Err(SensorError::Malformed)
            }
        });

        let (values, comment) = match result {
            Ok(values) => (values, None),
            Err(e) => {
                error!("Sensor read failed: {}", e);
                let mut values = SensorValues::new();
                for _ in 0..schema.len() {
                    let _ = values.push(NO_READING);
                }
                (values, Some(String::from(SENSOR_ERROR_COMMENT)))
            }
        };

        let reading = Reading {
            timestamp,
            battery_v: self.housekeeping.battery_voltage(),
            free_memory: self.housekeeping.free_memory(),
            values,
            comment,
        };
        debug!("Sampled {:?}", reading);
        reading
    }
}

/// Persist `reading` to the history stream and, when `persist_hourly` is
/// set, to the pending-transmission stream.
///
/// Both writes are attempted; the first failure is returned.
pub fn record<S: Storage>(
    store: &mut RecordStore<S>,
    schema: &FieldSchema,
    reading: &Reading,
    comment: Option<&str>,
    persist_hourly: bool,
) -> Result<(), StoreError> {
    let data = store.append(
        Stream::Data,
        &schema.data_header(),
        &reading.data_line(comment),
    );

    let hourly = if persist_hourly {
        store.append(Stream::Hourly, &schema.hourly_header(), &reading.hourly_line())
    } else {
        Ok(())
    };

    if data.is_ok() && hourly.is_ok() {
        info!(
            "Recorded reading at {}{}",
            reading.timestamp,
            if persist_hourly { " (hourly)" } else { "" }
        );
    }
    data.and(hourly)
}
