//! Satellite telemetry: message compaction and the modem session.

pub mod message;
pub mod transmission;

use thiserror_no_std::Error;

use crate::clock::DateTime;

pub use message::{CompactError, MAX_MESSAGE_LEN, Message, compact};
pub use transmission::{SelfTestReport, SendOutcome, TransmissionManager, TxState};

/// Status codes surfaced by a short-burst-data modem driver.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModemError {
    #[error("modem reported it was asleep")]
    Asleep,
    #[error("no modem detected")]
    NoModem,
    #[error("modem exchange timed out")]
    Timeout,
    #[error("modem rejected the request (status {0})")]
    Rejected(i32),
}

/// Satellite modem collaborator.
///
/// `power_on` and `sleep` drive the modem's sleep pin; the session methods
/// talk to it over its serial link.
pub trait Modem {
    fn power_on(&mut self);

    /// Start a session. May report [`ModemError::Asleep`] right after power-up.
    fn begin(&mut self) -> impl Future<Output = Result<(), ModemError>>;

    /// Submit a mobile-originated text message.
    fn send_text(&mut self, text: &str) -> impl Future<Output = Result<(), ModemError>>;

    /// Network (satellite constellation) time.
    fn network_time(&mut self) -> impl Future<Output = Result<DateTime, ModemError>>;

    /// Put the modem back to sleep.
    fn sleep(&mut self);
}
