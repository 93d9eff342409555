mod reset_combo;

use heapless::Vec;

pub use reset_combo::{reset_combo_held, ResetAction, ResetComboDetector};

use crate::config::MAX_EVENTS_PER_REPORT;
use crate::keymap::{translate, AmigaKeycode};
use crate::report::{diff, HidReport, Modifiers};
use crate::types::{KeyEvent, LedReport};

/// Modifiers with a one-to-one Amiga key, in emission order. Control is
/// handled separately and right GUI has no Amiga counterpart.
const DIRECT_MODIFIERS: [(Modifiers, AmigaKeycode); 5] = [
    (Modifiers::LEFT_ALT, AmigaKeycode::LEFT_ALT),
    (Modifiers::RIGHT_ALT, AmigaKeycode::RIGHT_ALT),
    (Modifiers::LEFT_SHIFT, AmigaKeycode::LEFT_SHIFT),
    (Modifiers::RIGHT_SHIFT, AmigaKeycode::RIGHT_SHIFT),
    (Modifiers::LEFT_GUI, AmigaKeycode::LEFT_AMIGA),
];

const ANY_CTRL: Modifiers = Modifiers::LEFT_CTRL.union(Modifiers::RIGHT_CTRL);

pub type EventList = Vec<KeyEvent, MAX_EVENTS_PER_REPORT>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SequencerOutput {
    pub events: EventList,
    pub leds: Option<LedReport>,
    pub reset: Option<ResetAction>,
    /// Keys dropped because the keymap has no Amiga code for them.
    pub unknown_dropped: u32,
}

/// Translation session: the previous report, the caps lock toggle and the
/// reset combo state. Lives from power-on to power-off.
pub struct EventSequencer {
    previous: HidReport,
    caps_lock: bool,
    reset_combo: ResetComboDetector,
}

impl EventSequencer {
    pub fn new() -> Self {
        Self {
            previous: HidReport::empty(),
            caps_lock: false,
            reset_combo: ResetComboDetector::new(),
        }
    }

    pub fn caps_lock(&self) -> bool {
        self.caps_lock
    }

    pub fn reset_held(&self) -> bool {
        self.reset_combo.is_held()
    }

    pub fn previous(&self) -> &HidReport {
        &self.previous
    }

    /// Decides the Amiga events for `current` against the stored previous
    /// report, then makes `current` the new previous report.
    pub fn process(&mut self, current: HidReport) -> SequencerOutput {
        let mut out = SequencerOutput::default();
        let changes = diff(&self.previous, &current);
        let mut caps_touched = false;

        let asserted = changes.modifiers.asserted();
        let deasserted = changes.modifiers.deasserted();
        for (flag, code) in DIRECT_MODIFIERS {
            if asserted.intersects(flag) {
                push(&mut out.events, KeyEvent::pressed(code));
            }
            if deasserted.intersects(flag) {
                push(&mut out.events, KeyEvent::released(code));
            }
        }

        let ctrl_before = changes.modifiers.previous.intersects(ANY_CTRL);
        let ctrl_after = changes.modifiers.current.intersects(ANY_CTRL);
        match (ctrl_before, ctrl_after) {
            (false, true) => push(&mut out.events, KeyEvent::pressed(AmigaKeycode::CTRL)),
            (true, false) => push(&mut out.events, KeyEvent::released(AmigaKeycode::CTRL)),
            _ => {}
        }

        for usage in changes.released.iter().copied() {
            let code = translate(usage);
            if code.is_unknown() {
                log::debug!("keymap: drop release usage=0x{usage:02x}");
                out.unknown_dropped += 1;
                continue;
            }
            if code == AmigaKeycode::CAPS_LOCK {
                caps_touched = true;
                if self.caps_lock {
                    log::debug!("keymap: caps lock stays down");
                    continue;
                }
            }
            push(&mut out.events, KeyEvent::released(code));
        }

        for usage in changes.pressed.iter().copied() {
            let code = translate(usage);
            if code.is_unknown() {
                log::debug!("keymap: drop press usage=0x{usage:02x}");
                out.unknown_dropped += 1;
                continue;
            }
            if code == AmigaKeycode::CAPS_LOCK {
                caps_touched = true;
                self.caps_lock = !self.caps_lock;
                log::debug!("keymap: caps lock on={}", self.caps_lock);
                if !self.caps_lock {
                    continue;
                }
            }
            push(&mut out.events, KeyEvent::pressed(code));
        }

        if caps_touched {
            out.leds = Some(LedReport::caps_lock(self.caps_lock));
        }

        out.reset = self.reset_combo.sample(reset_combo_held(&current));

        self.previous = current;
        out
    }
}

impl Default for EventSequencer {
    fn default() -> Self {
        Self::new()
    }
}

fn push(events: &mut EventList, event: KeyEvent) {
    // Capacity covers every modifier plus every slot of two reports.
    let _ = events.push(event);
}
