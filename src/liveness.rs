use core::sync::atomic::{AtomicU32, AtomicU8, Ordering};

use crate::platform::{with_pulse_masked, Level, Line, LinePort, PulseTimer};

const PHASE_IDLE: u8 = 0;
const PHASE_PULSING: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LivenessPhase {
    Idle,
    Pulsing,
}

/// State shared between the pulse timer interrupt and the poll loop.
pub struct LivenessState {
    phase: AtomicU8,
    asserted_at: AtomicU32,
}

impl LivenessState {
    pub const fn new() -> Self {
        Self {
            phase: AtomicU8::new(PHASE_IDLE),
            asserted_at: AtomicU32::new(0),
        }
    }

    pub fn phase(&self) -> LivenessPhase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_PULSING => LivenessPhase::Pulsing,
            _ => LivenessPhase::Idle,
        }
    }

    pub fn is_pulsing(&self) -> bool {
        self.phase() == LivenessPhase::Pulsing
    }
}

impl Default for LivenessState {
    fn default() -> Self {
        Self::new()
    }
}

/// Interrupt half: pull the data line low and mark the pulse started.
/// Must stay short; it runs in interrupt context.
pub fn on_pulse_timer<P: LinePort>(state: &LivenessState, port: &mut P, now_ticks: u32) {
    port.write(Line::Data, Level::Low);
    state.asserted_at.store(now_ticks, Ordering::Relaxed);
    state.phase.store(PHASE_PULSING, Ordering::Release);
}

/// Poll-loop half: ends a pulse once it has been held long enough.
pub struct LivenessPulse {
    hold_ticks: u32,
}

impl LivenessPulse {
    pub const fn new(hold_ticks: u32) -> Self {
        Self { hold_ticks }
    }

    /// Returns `true` when this call ended a pulse.
    pub fn service<P, T>(&self, state: &LivenessState, port: &mut P, timer: &mut T) -> bool
    where
        P: LinePort,
        T: PulseTimer,
    {
        if !state.is_pulsing() {
            return false;
        }
        with_pulse_masked(timer, |timer| {
            if !state.is_pulsing() {
                return false;
            }
            let held = timer
                .now_ticks()
                .wrapping_sub(state.asserted_at.load(Ordering::Relaxed));
            if held < self.hold_ticks {
                return false;
            }
            port.write(Line::Data, Level::High);
            state.phase.store(PHASE_IDLE, Ordering::Release);
            true
        })
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::config::PULSE_HOLD_TICKS;
    use crate::platform::DelayOps;
    use crate::sim::SimBus;

    #[test]
    fn timer_pulls_data_low_and_poll_loop_releases_it() {
        let liveness = Rc::new(LivenessState::new());
        let bus = SimBus::new(liveness.clone());
        let mut port = bus.port();
        let mut timer = bus.timer();
        let pulse = LivenessPulse::new(PULSE_HOLD_TICKS);

        bus.schedule_timer(100);
        bus.delay().delay_us(100);
        assert_eq!(liveness.phase(), LivenessPhase::Pulsing);
        assert_eq!(bus.level(Line::Data), Level::Low);

        // Not held for a full tick yet.
        assert!(!pulse.service(&liveness, &mut port, &mut timer));
        assert_eq!(bus.level(Line::Data), Level::Low);

        bus.delay().delay_us(PULSE_HOLD_TICKS);
        assert!(pulse.service(&liveness, &mut port, &mut timer));
        assert_eq!(liveness.phase(), LivenessPhase::Idle);
        assert_eq!(bus.level(Line::Data), Level::High);
    }

    #[test]
    fn idle_service_is_a_no_op() {
        let liveness = Rc::new(LivenessState::new());
        let bus = SimBus::new(liveness.clone());
        let pulse = LivenessPulse::new(PULSE_HOLD_TICKS);
        assert!(!pulse.service(&liveness, &mut bus.port(), &mut bus.timer()));
        assert_eq!(bus.level(Line::Data), Level::High);
    }

    #[test]
    fn periodic_timer_pulses_every_period() {
        let liveness = Rc::new(LivenessState::new());
        let bus = SimBus::new(liveness.clone());
        let mut port = bus.port();
        let mut timer = bus.timer();
        let pulse = LivenessPulse::new(PULSE_HOLD_TICKS);
        bus.start_periodic(1_000);

        let mut completed = 0;
        for _ in 0..110 {
            bus.delay().delay_us(50);
            if pulse.service(&liveness, &mut port, &mut timer) {
                completed += 1;
            }
        }
        assert_eq!(completed, 5);
        assert_eq!(bus.edges(Line::Data).len(), 10);
    }
}
