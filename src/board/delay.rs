use amigahid::platform::DelayOps;
use esp_hal::time::{Duration, Instant};

/// Spins on the system timer; frame timing cannot tolerate a scheduler.
pub(crate) struct BusyDelay;

impl BusyDelay {
    pub(crate) const fn new() -> Self {
        Self
    }

    fn spin(&self, duration: Duration) {
        let start = Instant::now();
        while start.elapsed() < duration {}
    }
}

impl DelayOps for BusyDelay {
    fn delay_us(&self, micros: u32) {
        self.spin(Duration::from_micros(u64::from(micros)));
    }

    fn delay_ms(&self, millis: u32) {
        self.spin(Duration::from_millis(u64::from(millis)));
    }
}
