use crate::config::{
    CLOCK_HIGH_US, CLOCK_LOW_US, DATA_SETUP_US, HANDSHAKE_POLL_US, HANDSHAKE_TIMEOUT_US,
};
use crate::error::LinkError;
use crate::keymap::SpecialCode;
use crate::platform::{with_pulse_masked, DelayOps, Direction, Level, Line, LinePort, PulseTimer};
use crate::types::{KeyDirection, KeyEvent};

/// Outcome of the post-frame handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Handshake {
    Acknowledged,
    TimedOut,
}

/// Byte order on the wire: bits 6..0 first, the key-up flag last.
pub const fn rotate_frame(byte: u8) -> u8 {
    byte.rotate_left(1)
}

/// Bit-bangs frames onto the keyboard port.
pub struct SerialEmitter<P, D> {
    port: P,
    delay: D,
}

impl<P, D> SerialEmitter<P, D>
where
    P: LinePort,
    D: DelayOps,
{
    pub fn new(port: P, delay: D) -> Self {
        Self { port, delay }
    }

    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    pub fn delay(&self) -> &D {
        &self.delay
    }

    /// Sends one key transition. The pulse timer stays masked for the
    /// whole frame, handshake included.
    pub fn emit<T: PulseTimer>(
        &mut self,
        event: KeyEvent,
        timer: &mut T,
    ) -> Result<Handshake, LinkError> {
        if event.code.is_unknown() {
            log::warn!("amiga: refusing to send unknown keycode");
            return Err(LinkError::UnknownKeycode);
        }
        log::debug!(
            "amiga: send code=0x{:02x} {}",
            event.code.raw(),
            match event.direction {
                KeyDirection::Pressed => "down",
                KeyDirection::Released => "up",
            }
        );
        Ok(with_pulse_masked(timer, |_| self.send_frame(event.frame_byte())))
    }

    pub fn emit_special<T: PulseTimer>(&mut self, code: SpecialCode, timer: &mut T) -> Handshake {
        log::debug!("amiga: send special=0x{:02x}", code.raw());
        with_pulse_masked(timer, |_| self.send_frame(code.raw()))
    }

    fn send_frame(&mut self, byte: u8) -> Handshake {
        let bits = rotate_frame(byte);
        for shift in (0..8).rev() {
            let one = bits & (1 << shift) != 0;
            // Active low: a one bit is a low data line.
            self.port
                .write(Line::Data, if one { Level::Low } else { Level::High });
            self.delay.delay_us(DATA_SETUP_US);
            self.port.write(Line::Clock, Level::Low);
            self.delay.delay_us(CLOCK_LOW_US);
            self.port.write(Line::Clock, Level::High);
            self.delay.delay_us(CLOCK_HIGH_US);
        }

        self.port.write(Line::Data, Level::High);
        self.port.set_direction(Line::Data, Direction::Input);
        let handshake = self.wait_for_ack();
        self.port.set_direction(Line::Data, Direction::Output);
        self.port.write(Line::Data, Level::High);

        if handshake == Handshake::TimedOut {
            log::debug!("amiga: no handshake for frame=0x{byte:02x}");
        }
        handshake
    }

    /// Waits for the Amiga's acknowledge pulse on KDAT and for its end;
    /// the line must be free again before the next frame drives it.
    fn wait_for_ack(&mut self) -> Handshake {
        let mut waited = 0u32;
        let mut pulled = false;
        while waited < HANDSHAKE_TIMEOUT_US {
            let low = self.port.read(Line::Data).is_low();
            if pulled && !low {
                return Handshake::Acknowledged;
            }
            pulled |= low;
            self.delay.delay_us(HANDSHAKE_POLL_US);
            waited += HANDSHAKE_POLL_US;
        }
        if pulled {
            log::warn!("amiga: handshake pulse still held after timeout");
            return Handshake::Acknowledged;
        }
        Handshake::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::keymap::AmigaKeycode;
    use crate::liveness::LivenessState;
    use crate::sim::{PeerBehavior, SimBus};

    fn emitter(bus: &SimBus) -> SerialEmitter<crate::sim::SimPort, crate::sim::SimDelay> {
        SerialEmitter::new(bus.port(), bus.delay())
    }

    #[test]
    fn return_key_press_goes_out_rotated() {
        assert_eq!(rotate_frame(0b0100_0100), 0b1000_1000);

        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        let mut emitter = emitter(&bus);
        let handshake = emitter
            .emit(KeyEvent::pressed(AmigaKeycode::RETURN), &mut timer)
            .unwrap();

        assert_eq!(handshake, Handshake::Acknowledged);
        assert_eq!(
            bus.wire_bits(),
            vec![true, false, false, false, true, false, false, false]
        );
        assert_eq!(bus.frames(), vec![0x44]);
    }

    #[test]
    fn release_sets_bit_seven_and_sends_it_last() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        emitter(&bus)
            .emit(KeyEvent::released(AmigaKeycode::RETURN), &mut timer)
            .unwrap();
        let bits = bus.wire_bits();
        assert_eq!(bits.last(), Some(&true));
        assert_eq!(bus.frames(), vec![0xc4]);
    }

    #[test]
    fn bit_cells_follow_port_timing() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        emitter(&bus)
            .emit(KeyEvent::pressed(AmigaKeycode::A), &mut timer)
            .unwrap();
        let falls = bus.clock_falls_us();
        assert_eq!(falls.len(), 8);
        assert_eq!(falls[0], u64::from(DATA_SETUP_US));
        for pair in falls.windows(2) {
            assert_eq!(
                pair[1] - pair[0],
                u64::from(DATA_SETUP_US + CLOCK_LOW_US + CLOCK_HIGH_US)
            );
        }
    }

    #[test]
    fn unknown_keycode_is_refused() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        let err = emitter(&bus)
            .emit(KeyEvent::pressed(AmigaKeycode::UNKNOWN), &mut timer)
            .unwrap_err();
        assert_eq!(err, LinkError::UnknownKeycode);
        assert!(bus.clock_falls_us().is_empty());
    }

    #[test]
    fn silent_peer_times_out_and_line_returns_to_idle() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        bus.set_peer(PeerBehavior::Silent);
        let mut timer = bus.timer();
        let handshake = emitter(&bus)
            .emit(KeyEvent::pressed(AmigaKeycode::SPACE), &mut timer)
            .unwrap();
        assert_eq!(handshake, Handshake::TimedOut);
        assert!(bus.now_us() >= u64::from(HANDSHAKE_TIMEOUT_US));
        assert_eq!(bus.level(Line::Data), Level::High);
        assert_eq!(bus.direction(Line::Data), Direction::Output);
    }

    #[test]
    fn timer_firing_mid_frame_waits_for_the_frame() {
        let liveness = Rc::new(LivenessState::new());
        let bus = SimBus::new(liveness.clone());
        // Expire the pulse timer in the middle of bit three.
        bus.schedule_timer(3 * 90 + 30);
        let mut timer = bus.timer();
        emitter(&bus)
            .emit(KeyEvent::pressed(AmigaKeycode::RETURN), &mut timer)
            .unwrap();

        assert_eq!(bus.frames(), vec![0x44]);
        assert!(liveness.is_pulsing());
        assert_eq!(bus.level(Line::Data), Level::Low);
    }

    #[test]
    fn back_to_back_frames_wait_for_the_ack_pulse_to_end() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        let mut emitter = emitter(&bus);
        let press = KeyEvent::pressed(AmigaKeycode::A);
        emitter.emit(press, &mut timer).unwrap();
        emitter.emit(press, &mut timer).unwrap();

        let ack_ends = bus.ack_pulse_ends_us();
        let falls = bus.clock_falls_us();
        assert_eq!(falls.len(), 16);
        assert!(
            falls[8] > ack_ends[0],
            "second frame clocked at {} while the ack runs until {}",
            falls[8],
            ack_ends[0]
        );
        assert_eq!(bus.frames(), vec![0x20, 0x20]);
    }

    #[test]
    fn startup_codes_are_raw_bytes() {
        let bus = SimBus::new(Rc::new(LivenessState::new()));
        let mut timer = bus.timer();
        let mut emitter = emitter(&bus);
        emitter.emit_special(SpecialCode::InitiatePowerUp, &mut timer);
        emitter.emit_special(SpecialCode::TerminatePowerUp, &mut timer);
        assert_eq!(bus.frames(), vec![0xfd, 0xfe]);
    }
}
