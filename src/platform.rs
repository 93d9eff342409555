/// Electrical level of one line. All Amiga port lines are active low.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_low(self) -> bool {
        matches!(self, Self::Low)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Line {
    Clock,
    Data,
    Reset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Open-drain lines to the Amiga keyboard connector.
pub trait LinePort {
    fn write(&mut self, line: Line, level: Level);
    fn read(&mut self, line: Line) -> Level;
    fn set_direction(&mut self, line: Line, direction: Direction);
}

pub trait DelayOps {
    fn delay_us(&self, micros: u32);

    fn delay_ms(&self, millis: u32) {
        for _ in 0..millis {
            self.delay_us(1_000);
        }
    }
}

/// The periodic timer driving the liveness pulse.
pub trait PulseTimer {
    /// Free-running tick count (microseconds); wraps.
    fn now_ticks(&self) -> u32;
    /// Mask or unmask the timer interrupt. An expiry while masked is
    /// delivered on unmask.
    fn set_masked(&mut self, masked: bool);
}

/// Runs `f` with the pulse timer interrupt masked.
pub fn with_pulse_masked<T, R>(timer: &mut T, f: impl FnOnce(&mut T) -> R) -> R
where
    T: PulseTimer,
{
    timer.set_masked(true);
    let out = f(timer);
    timer.set_masked(false);
    out
}
