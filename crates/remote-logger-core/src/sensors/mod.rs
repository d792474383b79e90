pub mod sdi12;

use thiserror_no_std::Error;

use crate::schema::MAX_FIELDS;

/// Ordered field values from one sensor read, in schema order.
pub type SensorValues = heapless::Vec<f32, MAX_FIELDS>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor did not respond")]
    NotResponding,
    #[error("sensor response could not be parsed")]
    Malformed,
}

/// Power-switched field sensor.
///
/// The measurement cycle powers the sensor on, waits the warm-up settle
/// delay, reads once and powers it off again. Implementations should not
/// add their own settle waits around `sample`.
pub trait Sensor {
    fn power_on(&mut self);

    fn power_off(&mut self);

    /// Read one set of field values in schema order.
    fn sample(&mut self) -> impl Future<Output = Result<SensorValues, SensorError>>;
}

/// Board housekeeping readings recorded alongside every sample.
pub trait Housekeeping {
    /// Battery voltage in volts.
    fn battery_voltage(&mut self) -> f32;

    /// Free RAM estimate in bytes.
    fn free_memory(&mut self) -> u32;
}
