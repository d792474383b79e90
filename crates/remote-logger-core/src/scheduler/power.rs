use embassy_time::Duration;

/// Watchdog deadlines armed around each stage of a wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTiming {
    /// Sensor settle, storage writes and sleep entry
    pub normal: Duration,
    /// Armed right after a completed sample
    pub post_sample: Duration,
    /// Modem power-up, session and both submissions
    pub modem: Duration,
}

impl WatchdogTiming {
    pub const DEFAULT: Self = Self {
        normal: Duration::from_secs(8),
        post_sample: Duration::from_millis(100),
        modem: Duration::from_secs(330),
    };
}

impl Default for WatchdogTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Low-power sleep and the hardware watchdog.
///
/// An expired watchdog resets the whole device; the loop restarts from
/// boot with nothing carried over but what is on the card.
pub trait PowerManager {
    /// (Re)arm the watchdog to fire `deadline` from now.
    fn arm_watchdog(&mut self, deadline: Duration);

    /// Enter the lowest-power sleep mode for `duration`.
    fn sleep(&mut self, duration: Duration) -> impl Future<Output = ()>;
}
