//! One satellite transmission attempt.
//!
//! ```text
//! IDLE -> MODEM_WAKING -> MODEM_READY -> SENDING -> {SENT | SEND_FAILED}
//!      -> MODEM_SLEEPING -> IDLE
//! ```
//!
//! Every exit path goes through `MODEM_SLEEPING`; the modem is never left
//! powered once `send` or `self_test` returns.

use alloc::string::String;

use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use super::{Modem, ModemError};
use crate::clock::{Clock, DateTime};
use crate::config::CycleTiming;

/// Hour of day during which the periodic clock sync may run.
pub const CLOCK_SYNC_HOUR: u8 = 12;

/// Prefix of the diagnostic message sent by [`TransmissionManager::self_test`].
pub const SELF_TEST_PREFIX: &str = "Hello world! ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Idle,
    ModemWaking,
    ModemReady,
    Sending,
    Sent,
    SendFailed,
    ModemSleeping,
}

/// Terminal outcome of [`TransmissionManager::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Final modem status after the retry.
    SendFailed(ModemError),
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Result of a modem diagnostic run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelfTestReport {
    pub session: Result<(), ModemError>,
    /// `None` when the session never started.
    pub send: Option<Result<(), ModemError>>,
    pub clock_synced: bool,
}

pub struct TransmissionManager<Mo, D> {
    modem: Mo,
    delay: D,
    timing: CycleTiming,
    sync_every_days: u8,
    state: TxState,
}

impl<Mo, D> TransmissionManager<Mo, D>
where
    Mo: Modem,
    D: DelayNs,
{
    pub fn new(modem: Mo, delay: D, timing: CycleTiming, sync_every_days: u8) -> Self {
        Self {
            modem,
            delay,
            timing,
            sync_every_days: sync_every_days.max(1),
            state: TxState::Idle,
        }
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn modem(&self) -> &Mo {
        &self.modem
    }

    pub fn modem_mut(&mut self) -> &mut Mo {
        &mut self.modem
    }

    fn enter(&mut self, state: TxState) {
        debug!("Transmission {:?} -> {:?}", self.state, state);
        self.state = state;
    }

    async fn wake_modem(&mut self) {
        self.enter(TxState::ModemWaking);
        self.modem.power_on();
        self.delay.delay_ms(self.timing.modem_settle_ms).await;
    }

    fn sleep_modem(&mut self) {
        self.enter(TxState::ModemSleeping);
        self.modem.sleep();
        self.enter(TxState::Idle);
    }

    /// Start a session, retrying once if the modem was still asleep.
    async fn begin_session(&mut self) -> Result<(), ModemError> {
        self.enter(TxState::ModemReady);
        match self.modem.begin().await {
            Err(ModemError::Asleep) => {
                debug!("Modem was asleep, starting session again");
                self.modem.begin().await
            }
            other => other,
        }
    }

    /// Send `text` with at most two submissions, then sync the clock if a
    /// sync is due. Never fails past this boundary; the outcome is returned.
    pub async fn send<C: Clock>(&mut self, text: &str, clock: &mut C) -> SendOutcome {
        info!("Transmitting {} byte message", text.len());
        self.wake_modem().await;

        if let Err(e) = self.begin_session().await {
            // The submission below still runs; the modem reports its own status.
            warn!("Modem session did not start: {}", e);
        }

        self.enter(TxState::Sending);
        let outcome = match self.modem.send_text(text).await {
            Ok(()) => SendOutcome::Sent,
            Err(first) => {
                warn!("Send failed ({}); restarting session and retrying", first);
                if let Err(e) = self.modem.begin().await {
                    debug!("Session restart reported {}", e);
                }
                match self.modem.send_text(text).await {
                    Ok(()) => SendOutcome::Sent,
                    Err(e) => SendOutcome::SendFailed(e),
                }
            }
        };

        match outcome {
            SendOutcome::Sent => {
                self.enter(TxState::Sent);
                info!("Message sent");
            }
            SendOutcome::SendFailed(e) => {
                self.enter(TxState::SendFailed);
                error!("Message not sent: {}", e);
            }
        }

        let now = clock.now();
        if self.sync_due(&now) {
            self.sync_clock(clock).await;
        }

        self.sleep_modem();
        outcome
    }

    /// Noon on every Nth day of the month.
    pub fn sync_due(&self, now: &DateTime) -> bool {
        now.hour == CLOCK_SYNC_HOUR && now.day % self.sync_every_days == 0
    }

    /// Best-effort: a modem without network time leaves the clock alone.
    async fn sync_clock<C: Clock>(&mut self, clock: &mut C) -> bool {
        match self.modem.network_time().await {
            Ok(time) if time.is_valid() => {
                let before = clock.now();
                clock.adjust(time);
                info!("Clock synced: {} -> {}", before, time);
                true
            }
            Ok(time) => {
                warn!("Ignoring invalid network time {:?}", time);
                false
            }
            Err(e) => {
                warn!("Clock sync skipped: {}", e);
                false
            }
        }
    }

    /// Modem diagnostic. Sends `Hello world! <msg>` and forces a clock sync.
    ///
    /// This spends message credits.
    pub async fn self_test<C: Clock>(&mut self, msg: &str, clock: &mut C) -> SelfTestReport {
        info!("Modem self test");
        self.wake_modem().await;

        let session = self.begin_session().await;
        let report = match session {
            Ok(()) => {
                let mut text = String::with_capacity(SELF_TEST_PREFIX.len() + msg.len());
                text.push_str(SELF_TEST_PREFIX);
                text.push_str(msg);

                self.enter(TxState::Sending);
                let send = self.modem.send_text(&text).await;
                match send {
                    Ok(()) => {
                        self.enter(TxState::Sent);
                        info!("Self test message sent");
                    }
                    Err(ModemError::Timeout) => {
                        self.enter(TxState::SendFailed);
                        warn!("Self test send timed out; try again with a better view of the sky");
                    }
                    Err(e) => {
                        self.enter(TxState::SendFailed);
                        warn!("Self test send failed: {}", e);
                    }
                }

                SelfTestReport {
                    session,
                    send: Some(send),
                    clock_synced: self.sync_clock(clock).await,
                }
            }
            Err(e) => {
                if e == ModemError::NoModem {
                    error!("No modem detected; check wiring");
                } else {
                    error!("Modem session failed: {}", e);
                }
                SelfTestReport {
                    session,
                    send: None,
                    clock_synced: false,
                }
            }
        };

        self.sleep_modem();
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{NoopDelay, ScriptedModem, SteppingClock};
    use embassy_futures::block_on;

    fn manager(modem: ScriptedModem) -> TransmissionManager<ScriptedModem, NoopDelay> {
        TransmissionManager::new(modem, NoopDelay, CycleTiming::DEFAULT, 5)
    }

    fn afternoon() -> SteppingClock {
        SteppingClock::at(DateTime::new(2024, 6, 4, 13, 0, 0).unwrap())
    }

    #[test]
    fn test_send_first_try() {
        let mut tx = manager(ScriptedModem::new());
        let outcome = block_on(tx.send("AB:24060413:401:183:1234,187:", &mut afternoon()));

        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(tx.modem().sent().len(), 1);
        assert_eq!(tx.modem().sleeps(), 1);
        assert!(!tx.modem().is_powered());
        assert_eq!(tx.state(), TxState::Idle);
    }

    #[test]
    fn test_asleep_session_is_retried() {
        let modem = ScriptedModem::new().with_begin(&[Err(ModemError::Asleep), Ok(())]);
        let mut tx = manager(modem);
        let outcome = block_on(tx.send("msg", &mut afternoon()));

        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(tx.modem().begins(), 2);
        assert_eq!(tx.modem().sleeps(), 1);
    }

    #[test]
    fn test_failed_send_is_retried_once() {
        let modem = ScriptedModem::new().with_send(&[Err(ModemError::Timeout), Ok(())]);
        let mut tx = manager(modem);
        let outcome = block_on(tx.send("msg", &mut afternoon()));

        assert_eq!(outcome, SendOutcome::Sent);
        assert_eq!(tx.modem().submissions(), 2);
        assert_eq!(tx.modem().begins(), 2);
        assert_eq!(tx.modem().sleeps(), 1);
    }

    #[test]
    fn test_submissions_are_bounded() {
        let modem = ScriptedModem::new().with_send(&[
            Err(ModemError::Timeout),
            Err(ModemError::Rejected(32)),
            Ok(()),
        ]);
        let mut tx = manager(modem);
        let outcome = block_on(tx.send("msg", &mut afternoon()));

        assert_eq!(outcome, SendOutcome::SendFailed(ModemError::Rejected(32)));
        assert_eq!(tx.modem().submissions(), 2);
        assert_eq!(tx.modem().sleeps(), 1);
        assert!(!tx.modem().is_powered());
    }

    #[test]
    fn test_modem_sleeps_once_for_every_failure_sequence() {
        let failures = [
            Err(ModemError::Asleep),
            Err(ModemError::NoModem),
            Err(ModemError::Timeout),
            Err(ModemError::Rejected(10)),
            Ok(()),
        ];
        for begin in failures {
            for first in failures {
                for second in failures {
                    let modem = ScriptedModem::new()
                        .with_begin(&[begin, begin, begin])
                        .with_send(&[first, second]);
                    let mut tx = manager(modem);
                    let outcome = block_on(tx.send("msg", &mut afternoon()));

                    assert_eq!(tx.modem().sleeps(), 1);
                    assert!(!tx.modem().is_powered());
                    assert!(tx.modem().submissions() <= 2);
                    assert_eq!(outcome.is_sent(), first.is_ok() || second.is_ok());
                }
            }
        }
    }

    #[test]
    fn test_noon_sync_on_fifth_day() {
        let network = DateTime::new(2024, 6, 5, 12, 0, 42).unwrap();
        let modem = ScriptedModem::new().with_network_time(Ok(network));
        let mut tx = manager(modem);
        let mut clock = SteppingClock::at(DateTime::new(2024, 6, 5, 12, 0, 0).unwrap());

        block_on(tx.send("msg", &mut clock));
        assert_eq!(clock.now(), network);
        assert_eq!(clock.adjustments(), 1);
    }

    #[test]
    fn test_sync_skipped_off_schedule() {
        let network = DateTime::new(2024, 6, 4, 12, 0, 42).unwrap();
        let mut tx = manager(ScriptedModem::new().with_network_time(Ok(network)));

        let mut clock = SteppingClock::at(DateTime::new(2024, 6, 4, 12, 0, 0).unwrap());
        block_on(tx.send("msg", &mut clock));
        assert_eq!(clock.adjustments(), 0);

        let mut clock = SteppingClock::at(DateTime::new(2024, 6, 5, 13, 0, 0).unwrap());
        block_on(tx.send("msg", &mut clock));
        assert_eq!(clock.adjustments(), 0);
    }

    #[test]
    fn test_sync_failure_does_not_change_outcome() {
        let modem = ScriptedModem::new().with_network_time(Err(ModemError::Timeout));
        let mut tx = manager(modem);
        let mut clock = SteppingClock::at(DateTime::new(2024, 6, 10, 12, 0, 0).unwrap());

        assert_eq!(block_on(tx.send("msg", &mut clock)), SendOutcome::Sent);
        assert_eq!(clock.adjustments(), 0);
        assert_eq!(tx.modem().sleeps(), 1);
    }

    #[test]
    fn test_self_test_sends_greeting_and_syncs() {
        let network = DateTime::new(2024, 6, 4, 13, 1, 0).unwrap();
        let modem = ScriptedModem::new().with_network_time(Ok(network));
        let mut tx = manager(modem);
        let mut clock = afternoon();

        let report = block_on(tx.self_test("from AB", &mut clock));
        assert_eq!(report.session, Ok(()));
        assert_eq!(report.send, Some(Ok(())));
        assert!(report.clock_synced);
        assert_eq!(tx.modem().sent(), &["Hello world! from AB"]);
        assert_eq!(tx.modem().sleeps(), 1);
    }

    #[test]
    fn test_self_test_without_modem() {
        let modem = ScriptedModem::new().with_begin(&[Err(ModemError::NoModem)]);
        let mut tx = manager(modem);

        let report = block_on(tx.self_test("x", &mut afternoon()));
        assert_eq!(report.session, Err(ModemError::NoModem));
        assert_eq!(report.send, None);
        assert!(!report.clock_synced);
        assert_eq!(tx.modem().submissions(), 0);
        assert_eq!(tx.modem().sleeps(), 1);
    }
}
