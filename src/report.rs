use heapless::Vec;

use crate::config::HID_BUF_MAX;

/// Index of the first key slot; bytes 0 and 1 are modifiers and reserved.
const KEY_SLOTS_START: usize = 2;

/// Boot-protocol modifier byte.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Modifiers(u8);

impl Modifiers {
    pub const LEFT_CTRL: Self = Self(1 << 0);
    pub const LEFT_SHIFT: Self = Self(1 << 1);
    pub const LEFT_ALT: Self = Self(1 << 2);
    pub const LEFT_GUI: Self = Self(1 << 3);
    pub const RIGHT_CTRL: Self = Self(1 << 4);
    pub const RIGHT_SHIFT: Self = Self(1 << 5);
    pub const RIGHT_ALT: Self = Self(1 << 6);
    pub const RIGHT_GUI: Self = Self(1 << 7);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

/// Snapshot of one keyboard input report, kept as the raw bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HidReport {
    bytes: Vec<u8, HID_BUF_MAX>,
}

impl HidReport {
    /// The "no report yet" snapshot.
    pub const fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Copies `bytes`; `None` when they do not fit the history buffer.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Vec::from_slice(bytes).ok().map(|bytes| Self { bytes })
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn modifiers(&self) -> Modifiers {
        Modifiers::from_bits(self.bytes.first().copied().unwrap_or(0))
    }

    /// Non-empty key slots in report order.
    pub fn keys(&self) -> impl Iterator<Item = u8> + '_ {
        self.bytes
            .get(KEY_SLOTS_START..)
            .unwrap_or(&[])
            .iter()
            .copied()
            .filter(|&code| code != 0)
    }

    pub fn contains_key(&self, code: u8) -> bool {
        self.keys().any(|held| held == code)
    }
}

/// Edge-only modifier changes between two reports.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ModifierTransitions {
    pub previous: Modifiers,
    pub current: Modifiers,
}

impl ModifierTransitions {
    pub fn between(previous: Modifiers, current: Modifiers) -> Self {
        Self { previous, current }
    }

    pub fn asserted(self) -> Modifiers {
        Modifiers::from_bits(self.current.bits() & !self.previous.bits())
    }

    pub fn deasserted(self) -> Modifiers {
        Modifiers::from_bits(self.previous.bits() & !self.current.bits())
    }

    pub fn is_unchanged(self) -> bool {
        self.previous == self.current
    }
}

pub type KeyList = Vec<u8, HID_BUF_MAX>;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReportDiff {
    pub modifiers: ModifierTransitions,
    /// Usages held in the previous report and gone from the current one.
    pub released: KeyList,
    /// Usages new in the current report.
    pub pressed: KeyList,
}

impl ReportDiff {
    pub fn is_empty(&self) -> bool {
        self.modifiers.is_unchanged() && self.released.is_empty() && self.pressed.is_empty()
    }
}

pub fn diff(previous: &HidReport, current: &HidReport) -> ReportDiff {
    ReportDiff {
        modifiers: ModifierTransitions::between(previous.modifiers(), current.modifiers()),
        released: missing_from(previous, current),
        pressed: missing_from(current, previous),
    }
}

fn missing_from(source: &HidReport, other: &HidReport) -> KeyList {
    let mut out = KeyList::new();
    for code in source.keys() {
        if other.contains_key(code) || out.contains(&code) {
            continue;
        }
        // Bounded by the slot count of `source`, which fits the list.
        let _ = out.push(code);
    }
    out
}
