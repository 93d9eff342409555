use crate::keymap::AmigaKeycode;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyDirection {
    Pressed,
    Released,
}

/// One key transition for the Amiga side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: AmigaKeycode,
    pub direction: KeyDirection,
}

impl KeyEvent {
    pub const fn pressed(code: AmigaKeycode) -> Self {
        Self {
            code,
            direction: KeyDirection::Pressed,
        }
    }

    pub const fn released(code: AmigaKeycode) -> Self {
        Self {
            code,
            direction: KeyDirection::Released,
        }
    }

    /// Keycode in bits 0..=6, key-up flag in bit 7.
    pub const fn frame_byte(self) -> u8 {
        match self.direction {
            KeyDirection::Pressed => self.code.raw(),
            KeyDirection::Released => self.code.raw() | 0x80,
        }
    }
}

/// Keyboard LED output report. Only caps lock is ever lit; the Amiga has
/// no num or scroll lock.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedReport(u8);

impl LedReport {
    /// Bit 1 of the boot keyboard LED output report (HID 1.11 appendix
    /// B.1): bit 0 is num lock, bit 1 caps lock, bit 2 scroll lock.
    pub const CAPS_LOCK: u8 = 1 << 1;

    pub const fn caps_lock(on: bool) -> Self {
        if on {
            Self(Self::CAPS_LOCK)
        } else {
            Self(0)
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }
}
