//! Wake scheduler
//!
//! The top-level control loop. The board wakes on every blink boundary; the
//! scheduler reads the clock once and decides, in order, whether to sample,
//! flush the sample into the pending-transmission window and transmit
//! the window. Then it sleeps until the next boundary.
//!
//! ```text
//! SLEEPING -> AWAKE_CHECK -> (SAMPLE?) -> (HOURLY_FLUSH?) -> (TRANSMIT?) -> SLEEPING
//! ```
//!
//! Stalls are not handled here. The watchdog is re-armed before every step
//! that can block, and an expiry resets the device back into [`WakeScheduler::boot`].

pub mod power;

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use crate::clock::{Clock, DateTime};
use crate::config::{CycleTiming, LoggerConfig};
use crate::measurement::{MeasurementCycle, Reading, record};
use crate::schema::FieldSchema;
use crate::sensors::{Housekeeping, Sensor};
use crate::storage::{RecordStore, Storage, StoreError, StoreStats, Stream};
use crate::telemetry::{CompactError, Modem, SendOutcome, TransmissionManager, compact};

pub use power::{PowerManager, WatchdogTiming};

/// Comment written on samples taken at boot.
pub const ONSTART_COMMENT: &str = "onstart";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Sleeping,
    AwakeCheck,
    Sample,
    HourlyFlush,
    Transmit,
}

/// Every collaborator the scheduler drives, handed over at construction.
pub struct Hardware<S, Se, Hk, Mo, C, P, D> {
    pub storage: S,
    pub sensor: Se,
    pub housekeeping: Hk,
    pub modem: Mo,
    pub clock: C,
    pub power: P,
    pub delay: D,
}

/// What happened at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BootReport {
    /// Both streams were removed (test mode)
    pub wiped: bool,
    /// Pending window was dropped because its header did not match
    pub hourly_reset: bool,
    /// Streams whose header did not match the schema
    pub header_mismatches: u8,
    /// On-start readings written to history
    pub onstart_recorded: u8,
}

/// Outcome of the transmit stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitReport {
    /// Send outcome, or why no message was built
    pub outcome: Result<SendOutcome, CompactError>,
    /// Buffered rows carried by the message
    pub rows: usize,
    /// Pending window removed afterwards
    pub cleared: bool,
}

/// What one wake did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeReport {
    pub time: DateTime,
    /// Clock second was already handled by an earlier wake
    pub duplicate: bool,
    /// Wake landed on a blink boundary
    pub checked: bool,
    pub sampled: bool,
    pub flushed: bool,
    pub recorded: Option<Result<(), StoreError>>,
    pub transmission: Option<TransmitReport>,
}

impl WakeReport {
    fn new(time: DateTime) -> Self {
        Self {
            time,
            duplicate: false,
            checked: false,
            sampled: false,
            flushed: false,
            recorded: None,
            transmission: None,
        }
    }
}

pub struct WakeScheduler<S, Se, Hk, Mo, C, P, D>
where
    S: Storage,
{
    schema: FieldSchema,
    config: LoggerConfig,
    watchdog: WatchdogTiming,
    store: RecordStore<S>,
    cycle: MeasurementCycle<Se, Hk, D>,
    transmitter: TransmissionManager<Mo, D>,
    clock: C,
    power: P,
    state: WakeState,
    last_handled: Option<DateTime>,
}

impl<S, Se, Hk, Mo, C, P, D> WakeScheduler<S, Se, Hk, Mo, C, P, D>
where
    S: Storage,
    Se: Sensor,
    Hk: Housekeeping,
    Mo: Modem,
    C: Clock,
    P: PowerManager,
    D: DelayNs + Clone,
{
    pub fn new(
        schema: FieldSchema,
        config: LoggerConfig,
        hardware: Hardware<S, Se, Hk, Mo, C, P, D>,
        timing: CycleTiming,
        watchdog: WatchdogTiming,
    ) -> Self {
        let Hardware {
            storage,
            sensor,
            housekeeping,
            modem,
            clock,
            power,
            delay,
        } = hardware;

        Self {
            cycle: MeasurementCycle::new(sensor, housekeeping, delay.clone(), timing),
            transmitter: TransmissionManager::new(
                modem,
                delay,
                timing,
                config.clock_sync_every_days,
            ),
            schema,
            config,
            watchdog,
            store: RecordStore::new(storage),
            clock,
            power,
            state: WakeState::Sleeping,
            last_handled: None,
        }
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    pub fn store(&self) -> &RecordStore<S> {
        &self.store
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn power(&self) -> &P {
        &self.power
    }

    pub fn modem(&self) -> &Mo {
        self.transmitter.modem()
    }

    /// Give the card back, as a reset would leave it.
    pub fn into_storage(self) -> S {
        self.store.into_storage()
    }

    fn enter(&mut self, state: WakeState) {
        if self.state != state {
            info!("Scheduler {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn blink_interval(&self) -> u32 {
        u32::from(self.config.blink_interval_secs.max(1))
    }

    /// Boot sequence, run once after every power-up or watchdog reset.
    pub async fn boot(&mut self) -> BootReport {
        info!(
            "Logger starting; decoder registration {}",
            self.schema.registration()
        );
        info!(
            "Sampling every {} min, transmitting every {} h",
            self.config.sample_interval_minutes, self.config.transmit_interval_hours
        );

        let mut report = BootReport::default();

        if self.config.test_mode {
            match self.store.wipe() {
                Ok(()) => report.wiped = true,
                Err(e) => error!("Test-mode wipe failed: {}", e),
            }
        }

        self.check_headers(&mut report);

        for i in 0..self.config.onstart_samples {
            if i > 0 {
                self.power.arm_watchdog(self.watchdog.normal);
                let blink = Duration::from_secs(u64::from(self.blink_interval()));
                self.power.sleep(blink).await;
            }

            let now = self.clock.now();
            let reading = self.take_sample(now).await;
            match self.record_reading(&reading, Some(ONSTART_COMMENT), false) {
                Ok(()) => report.onstart_recorded += 1,
                Err(e) => error!("On-start sample {} not recorded: {}", i + 1, e),
            }
        }

        self.power.arm_watchdog(self.watchdog.normal);
        report
    }

    /// Compare existing stream headers with the ones this schema writes.
    ///
    /// A pending window written under another schema would be mis-decoded,
    /// so it is dropped. History is never removed.
    fn check_headers(&mut self, report: &mut BootReport) {
        match self.store.header(Stream::Hourly) {
            Ok(Some(found)) if found != self.schema.hourly_header() => {
                report.header_mismatches += 1;
                warn!(
                    "{} header {:?} does not match schema; dropping pending rows",
                    Stream::Hourly,
                    found
                );
                match self.store.clear(Stream::Hourly) {
                    Ok(()) => report.hourly_reset = true,
                    Err(e) => error!("Could not drop {}: {}", Stream::Hourly, e),
                }
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check {} header: {}", Stream::Hourly, e),
        }

        match self.store.header(Stream::Data) {
            Ok(Some(found)) if found != self.schema.data_header() => {
                report.header_mismatches += 1;
                error!(
                    "{} header {:?} does not match schema; new rows use the current layout",
                    Stream::Data,
                    found
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Could not check {} header: {}", Stream::Data, e),
        }
    }

    async fn take_sample(&mut self, now: DateTime) -> Reading {
        self.power.arm_watchdog(self.watchdog.normal);
        self.cycle.sample(&self.schema, now).await
    }

    /// Write the reading, then shorten the watchdog. Card writes run under
    /// the normal deadline; anything still running after them is a stall.
    fn record_reading(
        &mut self,
        reading: &Reading,
        comment: Option<&str>,
        persist_hourly: bool,
    ) -> Result<(), StoreError> {
        let result = record(&mut self.store, &self.schema, reading, comment, persist_hourly);
        self.power.arm_watchdog(self.watchdog.post_sample);
        result
    }

    /// Handle one hardware wake.
    pub async fn on_wake(&mut self) -> WakeReport {
        let now = self.clock.now();
        let mut report = WakeReport::new(now);

        if self.last_handled == Some(now) {
            debug!("Wake at {} already handled", now);
            report.duplicate = true;
            return report;
        }

        if u32::from(now.second) % self.blink_interval() != 0 {
            return report;
        }
        self.last_handled = Some(now);
        report.checked = true;
        self.enter(WakeState::AwakeCheck);

        let sample_due = now.minute % self.config.sample_interval_minutes.max(1) == 0
            && now.second == 0;
        if !sample_due {
            return report;
        }

        self.enter(WakeState::Sample);
        let reading = self.take_sample(now).await;
        report.sampled = true;

        let flush = now.minute == 0;
        if flush {
            self.enter(WakeState::HourlyFlush);
        }
        let recorded = self.record_reading(&reading, None, flush);
        if let Err(e) = recorded {
            error!("Reading at {} not fully recorded: {}", now, e);
        }
        report.recorded = Some(recorded);
        report.flushed = flush;

        if flush && now.hour % self.config.transmit_interval_hours.max(1) == 0 {
            self.enter(WakeState::Transmit);
            report.transmission = Some(self.transmit().await);
        }

        report
    }

    /// Compact, send, then drop the pending window whatever the outcome.
    async fn transmit(&mut self) -> TransmitReport {
        self.power.arm_watchdog(self.watchdog.modem);

        let (outcome, rows) = match compact(&mut self.store, &self.schema) {
            Ok(message) => {
                let outcome = self
                    .transmitter
                    .send(message.as_str(), &mut self.clock)
                    .await;
                (Ok(outcome), message.rows())
            }
            Err(e) => {
                warn!("No message sent: {}", e);
                (Err(e), 0)
            }
        };

        // At most once: a failed send is not retried, the rows stay in history.
        let cleared = match self.store.clear(Stream::Hourly) {
            Ok(()) => true,
            Err(e) => {
                error!("Could not clear {}: {}", Stream::Hourly, e);
                false
            }
        };

        let stats = self.store.stats();
        info!(
            "Store: {} lines written, {} writes dropped, {} parse errors",
            stats.written_lines, stats.unavailable, stats.parse_errors
        );

        TransmitReport {
            outcome,
            rows,
            cleared,
        }
    }

    /// Sleep until the next blink boundary, measured from a fresh clock read.
    pub async fn sleep_until_next_wake(&mut self) -> Duration {
        self.power.arm_watchdog(self.watchdog.normal);

        let blink = self.blink_interval();
        let now = self.clock.now();
        let remaining = blink - u32::from(now.second) % blink;
        let duration = Duration::from_secs(u64::from(remaining));

        self.enter(WakeState::Sleeping);
        self.power.sleep(duration).await;
        duration
    }

    /// Boot, then wake and sleep forever.
    pub async fn run(&mut self) {
        self.boot().await;
        loop {
            self.on_wake().await;
            self.sleep_until_next_wake().await;
        }
    }
}
