//! Host-side stand-ins for the port lines, the pulse timer and the USB
//! transport. Time only moves when something delays, so runs are
//! deterministic.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::liveness::{self, LivenessState};
use crate::platform::{DelayOps, Direction, Level, Line, LinePort, PulseTimer};
use crate::transport::{HidTransport, SerialIo, TransportEvent};
use crate::types::LedReport;

/// How long the simulated Amiga holds KDAT low when it acknowledges.
pub const ACK_HOLD_US: u64 = 85;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerBehavior {
    /// Pull data low `after_us` after the adapter releases it.
    Acknowledge { after_us: u64 },
    Silent,
}

impl Default for PeerBehavior {
    fn default() -> Self {
        Self::Acknowledge { after_us: 30 }
    }
}

#[derive(Clone, Copy)]
struct LineState {
    driven: Level,
    direction: Direction,
}

const IDLE_LINE: LineState = LineState {
    driven: Level::High,
    direction: Direction::Output,
};

struct SimState {
    now_us: u64,
    lines: [LineState; 3],
    peer: PeerBehavior,
    released_at: Option<u64>,
    ack_ends: Vec<u64>,
    masked: bool,
    pending_fire: bool,
    next_fire: Option<u64>,
    period: Option<u64>,
    edges: Vec<(u64, Line, Level)>,
    wire_bits: Vec<bool>,
    clock_falls: Vec<u64>,
}

impl SimState {
    fn line(&self, line: Line) -> LineState {
        self.lines[line_index(line)]
    }

    fn peer_pulling(&self) -> bool {
        match (self.peer, self.released_at) {
            (PeerBehavior::Acknowledge { after_us }, Some(at)) => {
                let start = at + after_us;
                self.now_us >= start && self.now_us < start + ACK_HOLD_US
            }
            _ => false,
        }
    }

    fn wire_level(&self, line: Line) -> Level {
        let state = self.line(line);
        if state.direction == Direction::Output && state.driven.is_low() {
            return Level::Low;
        }
        if line == Line::Data && self.peer_pulling() {
            return Level::Low;
        }
        Level::High
    }
}

fn line_index(line: Line) -> usize {
    match line {
        Line::Clock => 0,
        Line::Data => 1,
        Line::Reset => 2,
    }
}

/// Wiring between the adapter and a simulated Amiga.
#[derive(Clone)]
pub struct SimBus {
    state: Rc<RefCell<SimState>>,
    liveness: Rc<LivenessState>,
}

impl SimBus {
    pub fn new(liveness: Rc<LivenessState>) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                now_us: 0,
                lines: [IDLE_LINE; 3],
                peer: PeerBehavior::default(),
                released_at: None,
                ack_ends: Vec::new(),
                masked: false,
                pending_fire: false,
                next_fire: None,
                period: None,
                edges: Vec::new(),
                wire_bits: Vec::new(),
                clock_falls: Vec::new(),
            })),
            liveness,
        }
    }

    pub fn port(&self) -> SimPort {
        SimPort { bus: self.clone() }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay { bus: self.clone() }
    }

    pub fn timer(&self) -> SimTimer {
        SimTimer { bus: self.clone() }
    }

    pub fn set_peer(&self, peer: PeerBehavior) {
        self.state.borrow_mut().peer = peer;
    }

    /// One-shot expiry at an absolute time.
    pub fn schedule_timer(&self, at_us: u64) {
        let mut state = self.state.borrow_mut();
        state.next_fire = Some(at_us);
        state.period = None;
    }

    pub fn start_periodic(&self, period_us: u64) {
        let mut state = self.state.borrow_mut();
        state.next_fire = Some(state.now_us + period_us);
        state.period = Some(period_us);
    }

    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_us
    }

    pub fn level(&self, line: Line) -> Level {
        self.state.borrow().wire_level(line)
    }

    pub fn direction(&self, line: Line) -> Direction {
        self.state.borrow().line(line).direction
    }

    /// Data line as sampled at every clock fall; `true` is a one bit.
    pub fn wire_bits(&self) -> Vec<bool> {
        self.state.borrow().wire_bits.clone()
    }

    /// When each acknowledge pulse of the simulated Amiga ends.
    pub fn ack_pulse_ends_us(&self) -> Vec<u64> {
        self.state.borrow().ack_ends.clone()
    }

    pub fn clock_falls_us(&self) -> Vec<u64> {
        self.state.borrow().clock_falls.clone()
    }

    /// Changes of the driven level on `line`.
    pub fn edges(&self, line: Line) -> Vec<(u64, Level)> {
        self.state
            .borrow()
            .edges
            .iter()
            .filter(|(_, edge_line, _)| *edge_line == line)
            .map(|&(at, _, level)| (at, level))
            .collect()
    }

    /// Bytes as the Amiga reassembles them, bit 7 back in place.
    pub fn frames(&self) -> Vec<u8> {
        self.state
            .borrow()
            .wire_bits
            .chunks_exact(8)
            .map(|bits| {
                let wire = bits
                    .iter()
                    .fold(0u8, |acc, &bit| (acc << 1) | u8::from(bit));
                wire.rotate_right(1)
            })
            .collect()
    }

    fn advance(&self, micros: u64) {
        let target = self.now_us() + micros;
        loop {
            let deliver = {
                let mut state = self.state.borrow_mut();
                let Some(at) = state.next_fire.filter(|&at| at <= target) else {
                    break;
                };
                state.now_us = state.now_us.max(at);
                state.next_fire = state.period.map(|period| at + period);
                if state.masked {
                    state.pending_fire = true;
                    false
                } else {
                    true
                }
            };
            if deliver {
                self.fire();
            }
        }
        self.state.borrow_mut().now_us = target;
    }

    fn fire(&self) {
        let now = self.now_us() as u32;
        liveness::on_pulse_timer(&self.liveness, &mut self.port(), now);
    }
}

pub struct SimPort {
    bus: SimBus,
}

impl LinePort for SimPort {
    fn write(&mut self, line: Line, level: Level) {
        let mut state = self.bus.state.borrow_mut();
        let idx = line_index(line);
        let was = state.lines[idx].driven;
        if was == level {
            return;
        }
        state.lines[idx].driven = level;
        let now = state.now_us;
        state.edges.push((now, line, level));
        if line == Line::Clock && level.is_low() {
            let bit = state.wire_level(Line::Data).is_low();
            state.wire_bits.push(bit);
            state.clock_falls.push(now);
        }
    }

    fn read(&mut self, line: Line) -> Level {
        self.bus.state.borrow().wire_level(line)
    }

    fn set_direction(&mut self, line: Line, direction: Direction) {
        let mut state = self.bus.state.borrow_mut();
        state.lines[line_index(line)].direction = direction;
        // The Amiga's ack pulse runs its full length even if the adapter
        // drives the line again in the meantime.
        if line == Line::Data && direction == Direction::Input {
            let now = state.now_us;
            state.released_at = Some(now);
            if let PeerBehavior::Acknowledge { after_us } = state.peer {
                state.ack_ends.push(now + after_us + ACK_HOLD_US);
            }
        }
    }
}

pub struct SimDelay {
    bus: SimBus,
}

impl DelayOps for SimDelay {
    fn delay_us(&self, micros: u32) {
        self.bus.advance(u64::from(micros));
    }
}

pub struct SimTimer {
    bus: SimBus,
}

impl PulseTimer for SimTimer {
    fn now_ticks(&self) -> u32 {
        self.bus.now_us() as u32
    }

    fn set_masked(&mut self, masked: bool) {
        let deliver = {
            let mut state = self.bus.state.borrow_mut();
            state.masked = masked;
            let deliver = !masked && state.pending_fire;
            if deliver {
                state.pending_fire = false;
            }
            deliver
        };
        if deliver {
            self.bus.fire();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SimTransportError;

/// Scripted USB side.
#[derive(Default)]
pub struct SimTransport {
    events: VecDeque<TransportEvent>,
    fail_init: bool,
    initialised: bool,
    selections: Vec<bool>,
    leds: Vec<LedReport>,
}

impl SimTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_init() -> Self {
        Self {
            fail_init: true,
            ..Self::default()
        }
    }

    pub fn push(&mut self, event: TransportEvent) {
        self.events.push_back(event);
    }

    pub fn push_report(&mut self, bytes: &[u8]) {
        let mut report = crate::transport::RawReport::new();
        for &b in bytes {
            if report.push(b).is_err() {
                break;
            }
        }
        self.push(TransportEvent::Report(report));
    }

    pub fn initialised(&self) -> bool {
        self.initialised
    }

    pub fn selections(&self) -> &[bool] {
        &self.selections
    }

    pub fn leds(&self) -> &[LedReport] {
        &self.leds
    }
}

impl HidTransport for SimTransport {
    type Error = SimTransportError;

    fn init(&mut self) -> Result<(), Self::Error> {
        if self.fail_init {
            return Err(SimTransportError);
        }
        self.initialised = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<TransportEvent>, Self::Error> {
        Ok(self.events.pop_front())
    }

    fn interface_selected(&mut self, accepted: bool) -> Result<(), Self::Error> {
        self.selections.push(accepted);
        Ok(())
    }

    fn set_leds(&mut self, leds: LedReport) -> Result<(), Self::Error> {
        self.leds.push(leds);
        Ok(())
    }
}

/// Serial link to a scripted co-processor. Input is handed out in small
/// chunks so lines straddle reads.
#[derive(Default)]
pub struct SimSerial {
    input: VecDeque<u8>,
    output: Vec<u8>,
}

impl SimSerial {
    const CHUNK: usize = 5;

    pub fn with_input(text: &str) -> Self {
        Self {
            input: text.bytes().collect(),
            output: Vec::new(),
        }
    }

    pub fn feed(&mut self, text: &str) {
        self.input.extend(text.bytes());
    }

    /// Everything written so far, lossily decoded.
    pub fn output(&self) -> std::string::String {
        std::string::String::from_utf8_lossy(&self.output).into_owned()
    }
}

impl SerialIo for SimSerial {
    type Error = core::convert::Infallible;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let n = buf.len().min(Self::CHUNK).min(self.input.len());
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error> {
        self.output.extend_from_slice(bytes);
        Ok(())
    }
}
