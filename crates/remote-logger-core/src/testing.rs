//! Fakes for the hardware collaborators.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::Cell;
use core::pin::Pin;
use core::task::{Context, Poll};

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;

use crate::clock::{Clock, DateTime};
use crate::scheduler::PowerManager;
use crate::sensors::{Housekeeping, Sensor, SensorError, SensorValues};
use crate::storage::{MemoryStorage, Storage, StorageError};
use crate::telemetry::{Modem, ModemError};

/// Settle waits that return immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDelay;

impl DelayNs for NoopDelay {
    async fn delay_ns(&mut self, _ns: u32) {}
}

pub struct FakeSensor {
    values: Option<SensorValues>,
    hang: bool,
    powered: bool,
    power_cycles: u32,
}

impl FakeSensor {
    pub fn constant(values: &[f32]) -> Self {
        Self {
            values: Some(SensorValues::from_slice(values).unwrap()),
            hang: false,
            powered: false,
            power_cycles: 0,
        }
    }

    pub fn failing() -> Self {
        Self {
            values: None,
            ..Self::constant(&[])
        }
    }

    /// Never answers; only a watchdog gets past it.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::constant(&[])
        }
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn power_cycles(&self) -> u32 {
        self.power_cycles
    }
}

impl Sensor for FakeSensor {
    fn power_on(&mut self) {
        self.powered = true;
        self.power_cycles += 1;
    }

    fn power_off(&mut self) {
        self.powered = false;
    }

    async fn sample(&mut self) -> Result<SensorValues, SensorError> {
        if self.hang {
            core::future::pending::<()>().await;
        }
        self.values.clone().ok_or(SensorError::NotResponding)
    }
}

pub struct FakeHousekeeping {
    battery_v: f32,
    free_memory: u32,
}

impl FakeHousekeeping {
    pub fn new(battery_v: f32, free_memory: u32) -> Self {
        Self {
            battery_v,
            free_memory,
        }
    }
}

impl Housekeeping for FakeHousekeeping {
    fn battery_voltage(&mut self) -> f32 {
        self.battery_v
    }

    fn free_memory(&mut self) -> u32 {
        self.free_memory
    }
}

/// Modem whose session and send results are scripted in order. Once a
/// script runs out every call succeeds.
pub struct ScriptedModem {
    begin: VecDeque<Result<(), ModemError>>,
    send: VecDeque<Result<(), ModemError>>,
    network_time: Result<DateTime, ModemError>,
    hang_on_send: bool,
    powered: bool,
    power_ons: u32,
    begins: u32,
    submissions: u32,
    sleeps: u32,
    sent: Vec<String>,
}

impl ScriptedModem {
    pub fn new() -> Self {
        Self {
            begin: VecDeque::new(),
            send: VecDeque::new(),
            network_time: Err(ModemError::Timeout),
            hang_on_send: false,
            powered: false,
            power_ons: 0,
            begins: 0,
            submissions: 0,
            sleeps: 0,
            sent: Vec::new(),
        }
    }

    pub fn with_begin(mut self, script: &[Result<(), ModemError>]) -> Self {
        self.begin.extend(script.iter().copied());
        self
    }

    pub fn with_send(mut self, script: &[Result<(), ModemError>]) -> Self {
        self.send.extend(script.iter().copied());
        self
    }

    pub fn with_network_time(mut self, time: Result<DateTime, ModemError>) -> Self {
        self.network_time = time;
        self
    }

    pub fn hanging_on_send(mut self) -> Self {
        self.hang_on_send = true;
        self
    }

    pub fn is_powered(&self) -> bool {
        self.powered
    }

    pub fn power_ons(&self) -> u32 {
        self.power_ons
    }

    pub fn begins(&self) -> u32 {
        self.begins
    }

    pub fn submissions(&self) -> u32 {
        self.submissions
    }

    pub fn sleeps(&self) -> u32 {
        self.sleeps
    }

    /// Texts the modem accepted.
    pub fn sent(&self) -> &[String] {
        &self.sent
    }
}

impl Default for ScriptedModem {
    fn default() -> Self {
        Self::new()
    }
}

impl Modem for ScriptedModem {
    fn power_on(&mut self) {
        self.powered = true;
        self.power_ons += 1;
    }

    async fn begin(&mut self) -> Result<(), ModemError> {
        self.begins += 1;
        self.begin.pop_front().unwrap_or(Ok(()))
    }

    async fn send_text(&mut self, text: &str) -> Result<(), ModemError> {
        self.submissions += 1;
        if self.hang_on_send {
            core::future::pending::<()>().await;
        }
        let result = self.send.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.sent.push(text.to_string());
        }
        result
    }

    async fn network_time(&mut self) -> Result<DateTime, ModemError> {
        self.network_time
    }

    fn sleep(&mut self) {
        self.powered = false;
        self.sleeps += 1;
    }
}

/// Clock that only moves when something advances it.
pub struct SteppingClock {
    time: Rc<Cell<DateTime>>,
    adjustments: u32,
}

impl SteppingClock {
    pub fn at(time: DateTime) -> Self {
        Self {
            time: Rc::new(Cell::new(time)),
            adjustments: 0,
        }
    }

    /// Shared handle, for a power manager whose sleeps move the clock.
    pub fn handle(&self) -> Rc<Cell<DateTime>> {
        self.time.clone()
    }

    pub fn adjustments(&self) -> u32 {
        self.adjustments
    }

    pub fn now(&self) -> DateTime {
        self.time.get()
    }
}

impl Clock for SteppingClock {
    fn now(&mut self) -> DateTime {
        self.time.get()
    }

    fn adjust(&mut self, time: DateTime) {
        self.adjustments += 1;
        self.time.set(time);
    }
}

/// [`MemoryStorage`] that counts every line written into a shared cell.
pub struct CountingStorage {
    inner: MemoryStorage,
    lines: Rc<Cell<u32>>,
}

impl CountingStorage {
    pub fn new(lines: Rc<Cell<u32>>) -> Self {
        Self {
            inner: MemoryStorage::new(),
            lines,
        }
    }
}

impl Storage for CountingStorage {
    type Handle = <MemoryStorage as Storage>::Handle;

    fn len(&mut self, name: &str) -> Result<u64, StorageError> {
        self.inner.len(name)
    }

    fn open_append(&mut self, name: &str) -> Result<Self::Handle, StorageError> {
        self.inner.open_append(name)
    }

    fn write_line(&mut self, handle: &mut Self::Handle, text: &str) -> Result<(), StorageError> {
        self.inner.write_line(handle, text)?;
        self.lines.set(self.lines.get() + 1);
        Ok(())
    }

    fn close(&mut self, handle: Self::Handle) {
        self.inner.close(handle);
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.inner.remove(name)
    }

    fn read_to_string(&mut self, name: &str) -> Result<String, StorageError> {
        self.inner.read_to_string(name)
    }
}

/// Records watchdog arming and advances the shared clock on every sleep.
pub struct RecordingPower {
    time: Rc<Cell<DateTime>>,
    arms: Vec<Duration>,
    sleeps: Vec<Duration>,
    lines: Option<Rc<Cell<u32>>>,
    lines_at_arm: Vec<u32>,
}

impl RecordingPower {
    pub fn driving(time: Rc<Cell<DateTime>>) -> Self {
        Self {
            time,
            arms: Vec::new(),
            sleeps: Vec::new(),
            lines: None,
            lines_at_arm: Vec::new(),
        }
    }

    /// Also note how many lines a [`CountingStorage`] had written at each arm.
    pub fn watching_writes(mut self, lines: Rc<Cell<u32>>) -> Self {
        self.lines = Some(lines);
        self
    }

    pub fn arms(&self) -> &[Duration] {
        &self.arms
    }

    pub fn lines_at_arm(&self) -> &[u32] {
        &self.lines_at_arm
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }
}

impl PowerManager for RecordingPower {
    fn arm_watchdog(&mut self, deadline: Duration) {
        self.arms.push(deadline);
        if let Some(lines) = &self.lines {
            self.lines_at_arm.push(lines.get());
        }
    }

    async fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        let secs = duration.as_millis().div_ceil(1000) as u32;
        self.time.set(self.time.get().add_seconds(secs));
    }
}

/// Stand-in watchdog: completes after being polled `polls` times.
///
/// Raced against a wake with `select`, it wins only if the wake stalls,
/// and dropping the wake future is the reset.
pub struct PollBudget {
    polls: u32,
}

impl PollBudget {
    pub fn new(polls: u32) -> Self {
        Self { polls }
    }
}

impl Future for PollBudget {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.polls == 0 {
            return Poll::Ready(());
        }
        self.polls -= 1;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}
