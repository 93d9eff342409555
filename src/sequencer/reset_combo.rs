use statig::{blocking::IntoStateMachineExt as _, prelude::*};

use crate::config::HID_MENU_USAGE;
use crate::report::{HidReport, Modifiers};

/// What to do with the Amiga reset line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResetAction {
    /// Pull the reset line low.
    Assert,
    /// Let the reset line go back high.
    Release,
}

/// Ctrl + left GUI + menu. Only left control counts; right control is
/// not part of the combo.
pub fn reset_combo_held(report: &HidReport) -> bool {
    let modifiers = report.modifiers();
    modifiers.intersects(Modifiers::LEFT_CTRL)
        && modifiers.intersects(Modifiers::LEFT_GUI)
        && report.contains_key(HID_MENU_USAGE)
}

#[derive(Clone, Copy, Debug)]
pub(super) struct ComboSample {
    held: bool,
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct ComboDispatch {
    action: Option<ResetAction>,
}

#[derive(Clone, Copy, Debug, Default)]
pub(super) struct ResetComboMachine {
    asserted: bool,
}

#[state_machine(initial = "State::released()")]
impl ResetComboMachine {
    #[state]
    fn released(&mut self, context: &mut ComboDispatch, event: &ComboSample) -> Outcome<State> {
        if !event.held {
            return Handled;
        }
        self.asserted = true;
        context.action = Some(ResetAction::Assert);
        Transition(State::held())
    }

    #[state]
    fn held(&mut self, context: &mut ComboDispatch, event: &ComboSample) -> Outcome<State> {
        if event.held {
            return Handled;
        }
        self.asserted = false;
        context.action = Some(ResetAction::Release);
        Transition(State::released())
    }
}

/// Turns per-report combo samples into reset-line edges.
pub struct ResetComboDetector {
    machine: statig::blocking::StateMachine<ResetComboMachine>,
}

impl ResetComboDetector {
    pub fn new() -> Self {
        Self {
            machine: ResetComboMachine::default().state_machine(),
        }
    }

    pub fn is_held(&self) -> bool {
        self.machine.inner().asserted
    }

    pub fn sample(&mut self, held: bool) -> Option<ResetAction> {
        let mut context = ComboDispatch::default();
        self.machine
            .handle_with_context(&ComboSample { held }, &mut context);
        context.action
    }
}

impl Default for ResetComboDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(bytes: &[u8]) -> HidReport {
        HidReport::from_bytes(bytes).unwrap()
    }

    #[test]
    fn combo_needs_all_three() {
        assert!(reset_combo_held(&report(&[0b0000_1001, 0, 0x65, 0, 0, 0, 0, 0])));
        assert!(!reset_combo_held(&report(&[0b0000_1000, 0, 0x65, 0, 0, 0, 0, 0])));
        assert!(!reset_combo_held(&report(&[0b0000_0001, 0, 0x65, 0, 0, 0, 0, 0])));
        assert!(!reset_combo_held(&report(&[0b0000_1001, 0, 0, 0, 0, 0, 0, 0])));
    }

    #[test]
    fn right_control_does_not_count() {
        assert!(!reset_combo_held(&report(&[0b0001_1000, 0, 0x65, 0, 0, 0, 0, 0])));
    }

    #[test]
    fn edges_fire_once() {
        let mut detector = ResetComboDetector::new();
        assert_eq!(detector.sample(false), None);
        assert_eq!(detector.sample(true), Some(ResetAction::Assert));
        assert_eq!(detector.sample(true), None);
        assert_eq!(detector.sample(true), None);
        assert!(detector.is_held());
        assert_eq!(detector.sample(false), Some(ResetAction::Release));
        assert_eq!(detector.sample(false), None);
        assert!(!detector.is_held());
    }
}
