//! Hardware-independent core of the remote environmental logger.
//!
//! A battery-powered logger wakes on a real-time-clock cadence, samples a
//! field sensor, appends the reading to two CSV streams on an SD card and,
//! on transmit hours, packs the pending rows into one short-burst-data
//! message for the satellite modem.
//!
//! Every piece of hardware is a trait ([`sensors::Sensor`],
//! [`storage::Storage`], [`clock::Clock`], [`telemetry::Modem`],
//! [`scheduler::PowerManager`]) so the same scheduler runs on the MCU, in
//! the desktop simulator and under test.
//!
//! It is `#![no_std]` with `extern crate alloc`.

#![no_std]

extern crate alloc;

pub mod clock;
pub mod config;
pub mod encoding;
pub mod measurement;
pub mod scheduler;
pub mod schema;
pub mod sensors;
pub mod storage;
pub mod telemetry;

#[cfg(test)]
mod testing;
