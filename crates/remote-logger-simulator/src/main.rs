//! Desktop field simulator for the remote logger.
//!
//! Runs the real wake scheduler from `remote-logger-core` against simulated
//! hardware on an accelerated clock: a synthetic Hydros 21 style sensor, a
//! satellite modem that rejects some submissions, and a host directory in
//! place of the SD card. `DATA.csv` and `HOURLY.csv` end up in the output
//! directory exactly as the logger would write them; sent messages are
//! logged.
//!
//! `RUST_LOG` controls verbosity (default `info`).

mod fs_storage;

use std::cell::Cell;
use std::path::PathBuf;
use std::rc::Rc;

use clap::Parser;
use embassy_futures::block_on;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use log::{debug, error, info, warn};

use remote_logger_core::clock::{Clock, DateTime};
use remote_logger_core::config::{CycleTiming, LoggerConfig, PARAM_FILE};
use remote_logger_core::scheduler::{Hardware, PowerManager, WakeScheduler, WatchdogTiming};
use remote_logger_core::schema::FieldSchema;
use remote_logger_core::sensors::{Housekeeping, Sensor, SensorError, SensorValues};
use remote_logger_core::storage::Storage;
use remote_logger_core::telemetry::{Modem, ModemError, TransmissionManager};

use fs_storage::FsStorage;

#[derive(Parser, Debug)]
#[command(about = "Run the remote logger against simulated hardware")]
struct Args {
    #[arg(short, long, default_value = "sim-card", help = "directory standing in for the SD card")]
    card: PathBuf,
    #[arg(
        short,
        long,
        default_value_t = 2,
        value_parser = clap::value_parser!(u32).range(1..=3650),
        help = "simulated days to run (1-3650)"
    )]
    days: u32,
    #[arg(
        long,
        default_value = "2024-06-01T00:00:00",
        help = "simulated RTC start time (YYYY-MM-DDTHH:MM:SS)"
    )]
    start: String,
    #[arg(long, default_value = "SIM", help = "station identifier (1-8 letters)")]
    station: String,
    #[arg(long, default_value_t = 3, help = "modem rejects every Nth submission (0 = never)")]
    fail_every: u32,
    #[arg(long, help = "run the modem self test instead of the logger loop")]
    self_test: bool,
}

// ---------------------------------------------------------------------------
// Simulated hardware
// ---------------------------------------------------------------------------

/// Simulated time shared by the RTC, the power manager and the sensor.
type SimTime = Rc<Cell<DateTime>>;

struct SimClock {
    time: SimTime,
}

impl Clock for SimClock {
    fn now(&mut self) -> DateTime {
        self.time.get()
    }

    fn adjust(&mut self, time: DateTime) {
        self.time.set(time);
    }
}

/// Sleeping jumps the clock forward instead of waiting.
struct SimPower {
    time: SimTime,
}

impl PowerManager for SimPower {
    fn arm_watchdog(&mut self, deadline: Duration) {
        debug!("Watchdog armed for {} ms", deadline.as_millis());
    }

    async fn sleep(&mut self, duration: Duration) {
        let secs = duration.as_millis().div_ceil(1000) as u32;
        self.time.set(self.time.get().add_seconds(secs));
    }
}

#[derive(Clone, Copy)]
struct InstantDelay;

impl DelayNs for InstantDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

/// Tidal water level, diurnal temperature and slowly drifting conductivity.
struct SyntheticSensor {
    time: SimTime,
    powered: bool,
    reads: u32,
}

impl Sensor for SyntheticSensor {
    fn power_on(&mut self) {
        self.powered = true;
    }

    fn power_off(&mut self) {
        self.powered = false;
    }

    async fn sample(&mut self) -> Result<SensorValues, SensorError> {
        if !self.powered {
            return Err(SensorError::NotResponding);
        }
        self.reads += 1;
        // One dropped read a day or so, to exercise the sentinel path.
        if self.reads % 97 == 0 {
            return Err(SensorError::NotResponding);
        }

        let now = self.time.get();
        let t = f64::from(now.seconds_of_day()) + f64::from(now.day) * 86_400.0;
        let level_mm = 1500.0 + 420.0 * (t / 44_712.0 * std::f64::consts::TAU).sin();
        let temp_c = 14.0 + 3.5 * ((t / 86_400.0 - 0.375) * std::f64::consts::TAU).sin();
        let ec_dcm = 310.0 + 25.0 * (t / 600_000.0).cos();

        let mut values = SensorValues::new();
        for v in [level_mm, temp_c, ec_dcm] {
            values.push(v as f32).map_err(|_| SensorError::Malformed)?;
        }
        Ok(values)
    }
}

/// Battery sags a little with every reading; memory wanders.
struct SimHousekeeping {
    battery_v: f32,
    reads: u32,
}

impl Housekeeping for SimHousekeeping {
    fn battery_voltage(&mut self) -> f32 {
        self.reads += 1;
        self.battery_v = (self.battery_v - 0.0004).max(3.3);
        self.battery_v
    }

    fn free_memory(&mut self) -> u32 {
        18_000 + self.reads.wrapping_mul(37) % 900
    }
}

/// Satellite modem that rejects every `fail_every`-th submission.
struct FlakyModem {
    time: SimTime,
    fail_every: u32,
    submissions: u32,
    sent: u32,
    failed: u32,
}

impl Modem for FlakyModem {
    fn power_on(&mut self) {
        info!("Modem powered");
    }

    async fn begin(&mut self) -> Result<(), ModemError> {
        Ok(())
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ModemError> {
        self.submissions += 1;
        if self.fail_every > 0 && self.submissions % self.fail_every == 0 {
            self.failed += 1;
            warn!("SBD submission {} rejected", self.submissions);
            return Err(ModemError::Rejected(32));
        }
        self.sent += 1;
        info!("SBD -> {}", text);
        Ok(())
    }

    async fn network_time(&mut self) -> Result<DateTime, ModemError> {
        // The simulated RTC runs a couple of seconds slow.
        Ok(self.time.get().add_seconds(2))
    }

    fn sleep(&mut self) {
        info!("Modem asleep");
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn load_config(storage: &mut FsStorage) -> LoggerConfig {
    match storage.read_to_string(PARAM_FILE) {
        Ok(text) => match LoggerConfig::parse(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("{} rejected ({}); using defaults", PARAM_FILE, e);
                LoggerConfig::default()
            }
        },
        Err(_) => {
            info!("No {}; using defaults", PARAM_FILE);
            LoggerConfig::default()
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let start = match DateTime::parse_iso8601(&args.start) {
        Ok(start) => start,
        Err(e) => {
            error!("Bad --start {:?}: {}", args.start, e);
            std::process::exit(2);
        }
    };
    let schema = match FieldSchema::hydros21(&args.station) {
        Ok(schema) => schema,
        Err(e) => {
            error!("Bad --station {:?}: {}", args.station, e);
            std::process::exit(2);
        }
    };
    if let Err(e) = std::fs::create_dir_all(&args.card) {
        error!("Cannot create {}: {}", args.card.display(), e);
        std::process::exit(1);
    }

    let time: SimTime = Rc::new(Cell::new(start));
    let modem = FlakyModem {
        time: time.clone(),
        fail_every: args.fail_every,
        submissions: 0,
        sent: 0,
        failed: 0,
    };

    if args.self_test {
        let mut tx = TransmissionManager::new(modem, InstantDelay, CycleTiming::DEFAULT, 1);
        let mut clock = SimClock { time };
        let report = block_on(tx.self_test(schema.station(), &mut clock));
        info!("Self test: {:?}", report);
        return;
    }

    let mut storage = FsStorage::new(&args.card);
    let config = load_config(&mut storage);
    info!(
        "Simulating {} day(s) from {} into {}",
        args.days,
        start,
        storage.root().display()
    );

    let mut scheduler = WakeScheduler::new(
        schema,
        config,
        Hardware {
            storage,
            sensor: SyntheticSensor {
                time: time.clone(),
                powered: false,
                reads: 0,
            },
            housekeeping: SimHousekeeping {
                battery_v: 4.12,
                reads: 0,
            },
            modem,
            clock: SimClock { time: time.clone() },
            power: SimPower { time: time.clone() },
            delay: InstantDelay,
        },
        CycleTiming::DEFAULT,
        WatchdogTiming::DEFAULT,
    );

    let end = start.add_seconds(args.days.saturating_mul(86_400));
    let boot = block_on(scheduler.boot());
    info!("Boot: {:?}", boot);

    let mut wakes = 0u32;
    let mut samples = 0u32;
    let mut transmissions = 0u32;
    while time.get() < end {
        let report = block_on(scheduler.on_wake());
        wakes += 1;
        if report.sampled {
            samples += 1;
        }
        if report.transmission.is_some() {
            transmissions += 1;
        }
        block_on(scheduler.sleep_until_next_wake());
    }

    let stats = scheduler.stats();
    let modem = scheduler.modem();
    info!(
        "Done: {} wakes, {} samples, {} transmit cycles ({} sent, {} rejected submissions)",
        wakes, samples, transmissions, modem.sent, modem.failed
    );
    info!(
        "Store: {} lines written, {} dropped writes, {} parse errors",
        stats.written_lines, stats.unavailable, stats.parse_errors
    );
}
