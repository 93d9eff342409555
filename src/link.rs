use crate::config::{
    ENUMERATION_SETTLE_MS, HID_BUF_MAX, HID_PROTOCOL_KEYBOARD, POWER_CODE_GAP_US,
    PULSE_HOLD_TICKS, STARTUP_SETTLE_MS, STATS_LOG_EVERY_PULSES,
};
use crate::emitter::{Handshake, SerialEmitter};
use crate::error::LinkError;
use crate::keymap::SpecialCode;
use crate::liveness::{LivenessPulse, LivenessState};
use crate::platform::{DelayOps, Level, Line, LinePort, PulseTimer};
use crate::report::HidReport;
use crate::sequencer::{EventSequencer, ResetAction};
use crate::transport::{HidTransport, TransportEvent};
use crate::types::LedReport;

/// Boot keyboard report with nothing held; stands in for a detached
/// keyboard so no key stays down on the Amiga.
const ALL_KEYS_UP: [u8; 8] = [0; 8];

/// Accepts boot keyboards only.
pub fn select_interface(protocol: u8) -> bool {
    let accepted = protocol == HID_PROTOCOL_KEYBOARD;
    if accepted {
        log::info!("usb: keyboard interface accepted");
    } else {
        log::info!("usb: interface rejected protocol={protocol}");
    }
    accepted
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub reports_processed: u32,
    pub frames_sent: u32,
    pub frames_unacked: u32,
    pub unknown_dropped: u32,
    pub pulses_completed: u32,
    pub resets_asserted: u32,
}

impl LinkStats {
    fn count_frame(&mut self, handshake: Handshake) {
        self.frames_sent = self.frames_sent.saturating_add(1);
        if handshake == Handshake::TimedOut {
            self.frames_unacked = self.frames_unacked.saturating_add(1);
        }
    }

    fn log(&self) {
        log::info!(
            "link: stats reports={} frames={} unacked={} unknown={} pulses={} resets={}",
            self.reports_processed,
            self.frames_sent,
            self.frames_unacked,
            self.unknown_dropped,
            self.pulses_completed,
            self.resets_asserted
        );
    }
}

/// Owns everything on the Amiga side of the bridge and runs the poll
/// loop body.
pub struct LinkDriver<'a, P, D, T> {
    emitter: SerialEmitter<P, D>,
    timer: T,
    liveness: &'a LivenessState,
    pulse: LivenessPulse,
    sequencer: EventSequencer,
    stats: LinkStats,
    halted: bool,
}

impl<'a, P, D, T> LinkDriver<'a, P, D, T>
where
    P: LinePort,
    D: DelayOps,
    T: PulseTimer,
{
    pub fn new(port: P, delay: D, timer: T, liveness: &'a LivenessState) -> Self {
        Self {
            emitter: SerialEmitter::new(port, delay),
            timer,
            liveness,
            pulse: LivenessPulse::new(PULSE_HOLD_TICKS),
            sequencer: EventSequencer::new(),
            stats: LinkStats::default(),
            halted: false,
        }
    }

    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn caps_lock(&self) -> bool {
        self.sequencer.caps_lock()
    }

    /// Power-up handshake with the Amiga, then brings up the USB side.
    /// Expects the lines idle high and the pulse timer running.
    pub fn start<H: HidTransport>(&mut self, transport: &mut H) -> Result<(), LinkError> {
        if self.halted {
            return Err(LinkError::Halted);
        }
        log::info!("link: settling");
        self.emitter.delay().delay_ms(STARTUP_SETTLE_MS);

        let handshake = self
            .emitter
            .emit_special(SpecialCode::InitiatePowerUp, &mut self.timer);
        self.stats.count_frame(handshake);
        self.emitter.delay().delay_us(POWER_CODE_GAP_US);
        let handshake = self
            .emitter
            .emit_special(SpecialCode::TerminatePowerUp, &mut self.timer);
        self.stats.count_frame(handshake);

        if let Err(err) = transport.init() {
            log::error!("usb: init failed err={err:?}");
            self.halt();
            return Err(LinkError::TransportInit);
        }

        self.sequencer = EventSequencer::new();
        self.emitter.delay().delay_ms(ENUMERATION_SETTLE_MS);
        log::info!("link: ready");
        Ok(())
    }

    /// Runs one raw input report through the pipeline and onto the wire.
    /// Returns the LED report to send back to the keyboard, if any.
    pub fn on_report(&mut self, bytes: &[u8]) -> Result<Option<LedReport>, LinkError> {
        if self.halted {
            return Err(LinkError::Halted);
        }
        if bytes.is_empty() {
            return Ok(None);
        }
        let Some(report) = HidReport::from_bytes(bytes) else {
            return Err(self.fail_oversized(bytes.len()));
        };

        let out = self.sequencer.process(report);
        self.stats.reports_processed = self.stats.reports_processed.saturating_add(1);
        self.stats.unknown_dropped = self
            .stats
            .unknown_dropped
            .saturating_add(out.unknown_dropped);

        for event in out.events.iter().copied() {
            match self.emitter.emit(event, &mut self.timer) {
                Ok(handshake) => self.stats.count_frame(handshake),
                Err(err) => log::warn!("link: frame skipped err={err}"),
            }
        }

        match out.reset {
            Some(ResetAction::Assert) => {
                log::info!("link: reset asserted");
                self.emitter.port_mut().write(Line::Reset, Level::Low);
                self.stats.resets_asserted = self.stats.resets_asserted.saturating_add(1);
            }
            Some(ResetAction::Release) => {
                log::info!("link: reset released");
                self.emitter.port_mut().write(Line::Reset, Level::High);
            }
            None => {}
        }

        Ok(out.leds)
    }

    fn fail_oversized(&mut self, len: usize) -> LinkError {
        let err = LinkError::OversizedReport {
            len,
            max: HID_BUF_MAX,
        };
        log::error!("link: {err}");
        self.halt();
        err
    }

    /// Ends a pending liveness pulse once it has been held long enough.
    pub fn service_liveness(&mut self) -> bool {
        let completed =
            self.pulse
                .service(self.liveness, self.emitter.port_mut(), &mut self.timer);
        if completed {
            self.stats.pulses_completed = self.stats.pulses_completed.saturating_add(1);
            if self.stats.pulses_completed % STATS_LOG_EVERY_PULSES == 0 {
                self.stats.log();
            }
        }
        completed
    }

    /// One pass of the poll loop: liveness first, then at most one
    /// transport event.
    pub fn poll<H: HidTransport>(&mut self, transport: &mut H) -> Result<(), LinkError> {
        if self.halted {
            return Err(LinkError::Halted);
        }
        self.service_liveness();

        let event = match transport.poll() {
            Ok(Some(event)) => event,
            Ok(None) => return Ok(()),
            Err(err) => {
                log::warn!("usb: poll failed err={err:?}");
                return Err(LinkError::Transport);
            }
        };

        match event {
            TransportEvent::Attached {
                interface,
                protocol,
            } => {
                log::debug!("usb: attach iface={interface} protocol={protocol}");
                let accepted = select_interface(protocol);
                transport.interface_selected(accepted).map_err(|err| {
                    log::warn!("usb: select reply failed err={err:?}");
                    LinkError::Transport
                })?;
            }
            TransportEvent::Report(raw) => {
                if let Some(leds) = self.on_report(&raw)? {
                    transport.set_leds(leds).map_err(|err| {
                        log::warn!("usb: led report failed err={err:?}");
                        LinkError::Transport
                    })?;
                }
            }
            TransportEvent::OversizedReport { len } => {
                return Err(self.fail_oversized(len));
            }
            TransportEvent::Detached => {
                log::info!("usb: keyboard detached");
                self.on_report(&ALL_KEYS_UP)?;
            }
        }
        Ok(())
    }

    /// Stops the link for good. The pulse timer stays masked and KDAT is
    /// left released, even if a liveness pulse was holding it low.
    pub fn halt(&mut self) {
        if !self.halted {
            log::error!("link: halted");
        }
        self.halted = true;
        self.timer.set_masked(true);
        self.emitter.port_mut().write(Line::Data, Level::High);
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::keymap::AmigaKeycode;
    use crate::liveness::LivenessPhase;
    use crate::sim::{SimBus, SimDelay, SimPort, SimSerial, SimTimer, SimTransport};
    use crate::transport::LineTransport;

    const USAGE_A: u8 = 0x04;
    const USAGE_CAPS: u8 = 0x39;
    const USAGE_MENU: u8 = 0x65;

    fn boot_report(modifiers: u8, keys: &[u8]) -> [u8; 8] {
        let mut bytes = [0u8; 8];
        bytes[0] = modifiers;
        bytes[2..2 + keys.len()].copy_from_slice(keys);
        bytes
    }

    fn fixture() -> (SimBus, Rc<LivenessState>) {
        let liveness = Rc::new(LivenessState::new());
        let bus = SimBus::new(liveness.clone());
        (bus, liveness)
    }

    fn link<'a>(
        bus: &SimBus,
        liveness: &'a LivenessState,
    ) -> LinkDriver<'a, SimPort, SimDelay, SimTimer> {
        LinkDriver::new(bus.port(), bus.delay(), bus.timer(), liveness)
    }

    #[test]
    fn only_boot_keyboards_are_selected() {
        assert!(select_interface(HID_PROTOCOL_KEYBOARD));
        assert!(!select_interface(0));
        assert!(!select_interface(2));
    }

    #[test]
    fn startup_sends_power_codes_before_usb_init() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let mut usb = SimTransport::new();
        link.start(&mut usb).unwrap();

        assert_eq!(bus.frames(), vec![0xfd, 0xfe]);
        assert!(usb.initialised());
        let falls = bus.clock_falls_us();
        assert!(falls[0] >= u64::from(STARTUP_SETTLE_MS) * 1_000);
        assert!(falls[8] - falls[7] >= u64::from(POWER_CODE_GAP_US));
        assert_eq!(link.stats().frames_sent, 2);
        assert!(!link.caps_lock());
    }

    #[test]
    fn failed_usb_init_is_fatal() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let mut usb = SimTransport::failing_init();
        assert_eq!(link.start(&mut usb), Err(LinkError::TransportInit));
        assert!(link.is_halted());
        assert_eq!(link.poll(&mut usb), Err(LinkError::Halted));
        assert_eq!(bus.frames(), vec![0xfd, 0xfe]);
    }

    #[test]
    fn oversized_report_halts_before_any_event() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let mut bytes = [0u8; HID_BUF_MAX + 1];
        bytes[2] = USAGE_A;

        let err = link.on_report(&bytes).unwrap_err();
        assert_eq!(
            err,
            LinkError::OversizedReport {
                len: HID_BUF_MAX + 1,
                max: HID_BUF_MAX
            }
        );
        assert!(err.is_fatal());
        assert!(bus.frames().is_empty());
        assert_eq!(
            link.on_report(&boot_report(0, &[USAGE_A])),
            Err(LinkError::Halted)
        );

        // The pulse timer is masked for good.
        bus.schedule_timer(bus.now_us() + 10);
        bus.delay().delay_us(100);
        assert_eq!(liveness.phase(), LivenessPhase::Idle);
        assert_eq!(bus.level(Line::Data), Level::High);
    }

    #[test]
    fn oversized_report_line_halts_the_link() {
        for (body, len) in [("04".repeat(65), 65), ("04 ".repeat(100), 100)] {
            let (bus, liveness) = fixture();
            let mut link = link(&bus, &liveness);
            let input = std::format!("ATTACH 0 1\nREPORT 0 {body}\n");
            let mut usb = LineTransport::new(SimSerial::with_input(&input));

            link.poll(&mut usb).unwrap();
            assert_eq!(
                link.poll(&mut usb),
                Err(LinkError::OversizedReport {
                    len,
                    max: HID_BUF_MAX
                })
            );
            assert!(link.is_halted());
            assert!(bus.frames().is_empty());
            assert_eq!(link.poll(&mut usb), Err(LinkError::Halted));
        }
    }

    #[test]
    fn halting_mid_pulse_releases_the_data_line() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        bus.schedule_timer(50);
        bus.delay().delay_us(100);
        assert!(liveness.is_pulsing());
        assert_eq!(bus.level(Line::Data), Level::Low);

        link.on_report(&[0u8; HID_BUF_MAX + 1]).unwrap_err();
        assert!(link.is_halted());
        assert_eq!(bus.level(Line::Data), Level::High);
    }

    #[test]
    fn empty_report_changes_nothing() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        link.on_report(&boot_report(0, &[USAGE_A])).unwrap();
        assert_eq!(link.on_report(&[]), Ok(None));
        link.on_report(&boot_report(0, &[USAGE_A])).unwrap();
        assert_eq!(bus.frames(), vec![AmigaKeycode::A.raw()]);
        assert_eq!(link.stats().reports_processed, 2);
    }

    #[test]
    fn reset_combo_drives_reset_line() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let combo = boot_report(0b0000_1001, &[USAGE_MENU]);

        link.on_report(&combo).unwrap();
        assert_eq!(bus.level(Line::Reset), Level::Low);
        link.on_report(&combo).unwrap();
        assert_eq!(bus.edges(Line::Reset).len(), 1);

        link.on_report(&boot_report(0b0000_1000, &[USAGE_MENU])).unwrap();
        assert_eq!(bus.level(Line::Reset), Level::High);
        assert_eq!(link.stats().resets_asserted, 1);
    }

    #[test]
    fn poll_selects_forwards_leds_and_releases_on_detach() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let mut usb = SimTransport::new();
        usb.push(TransportEvent::Attached {
            interface: 1,
            protocol: 2,
        });
        usb.push(TransportEvent::Attached {
            interface: 0,
            protocol: HID_PROTOCOL_KEYBOARD,
        });
        usb.push_report(&boot_report(0, &[USAGE_CAPS]));
        usb.push_report(&boot_report(0, &[USAGE_A]));
        usb.push(TransportEvent::Detached);

        for _ in 0..6 {
            link.poll(&mut usb).unwrap();
        }

        assert_eq!(usb.selections(), &[false, true]);
        assert_eq!(usb.leds(), &[LedReport::caps_lock(true), LedReport::caps_lock(true)]);
        let a = AmigaKeycode::A.raw();
        assert_eq!(
            bus.frames(),
            vec![AmigaKeycode::CAPS_LOCK.raw(), a, a | 0x80]
        );
        assert!(link.caps_lock());
    }

    #[test]
    fn silent_amiga_is_counted_not_fatal() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        bus.set_peer(crate::sim::PeerBehavior::Silent);
        link.on_report(&boot_report(0, &[USAGE_A])).unwrap();
        let stats = link.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.frames_unacked, 1);
        assert!(!link.is_halted());
    }

    #[test]
    fn unknown_keys_are_counted() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        link.on_report(&boot_report(0, &[0x45, USAGE_A])).unwrap();
        assert_eq!(link.stats().unknown_dropped, 1);
        assert_eq!(bus.frames(), vec![AmigaKeycode::A.raw()]);
    }

    #[test]
    fn poll_loop_completes_liveness_pulses() {
        let (bus, liveness) = fixture();
        let mut link = link(&bus, &liveness);
        let mut usb = SimTransport::new();
        bus.start_periodic(1_000);
        for _ in 0..65 {
            bus.delay().delay_us(100);
            link.poll(&mut usb).unwrap();
        }
        assert_eq!(link.stats().pulses_completed, 6);
    }
}
