/// Amiga raw keycode (7 bits), or [`AmigaKeycode::UNKNOWN`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AmigaKeycode(u8);

impl AmigaKeycode {
    pub const BACKTICK: Self = Self(0x00);
    pub const ONE: Self = Self(0x01);
    pub const TWO: Self = Self(0x02);
    pub const THREE: Self = Self(0x03);
    pub const FOUR: Self = Self(0x04);
    pub const FIVE: Self = Self(0x05);
    pub const SIX: Self = Self(0x06);
    pub const SEVEN: Self = Self(0x07);
    pub const EIGHT: Self = Self(0x08);
    pub const NINE: Self = Self(0x09);
    pub const ZERO: Self = Self(0x0a);
    pub const DASH: Self = Self(0x0b);
    pub const EQUALS: Self = Self(0x0c);
    pub const BACKSLASH: Self = Self(0x0d);
    pub const KP_ZERO: Self = Self(0x0f);
    pub const Q: Self = Self(0x10);
    pub const W: Self = Self(0x11);
    pub const E: Self = Self(0x12);
    pub const R: Self = Self(0x13);
    pub const T: Self = Self(0x14);
    pub const Y: Self = Self(0x15);
    pub const U: Self = Self(0x16);
    pub const I: Self = Self(0x17);
    pub const O: Self = Self(0x18);
    pub const P: Self = Self(0x19);
    pub const OPEN_BRACKET: Self = Self(0x1a);
    pub const CLOSE_BRACKET: Self = Self(0x1b);
    pub const KP_ONE: Self = Self(0x1d);
    pub const KP_TWO: Self = Self(0x1e);
    pub const KP_THREE: Self = Self(0x1f);
    pub const A: Self = Self(0x20);
    pub const S: Self = Self(0x21);
    pub const D: Self = Self(0x22);
    pub const F: Self = Self(0x23);
    pub const G: Self = Self(0x24);
    pub const H: Self = Self(0x25);
    pub const J: Self = Self(0x26);
    pub const K: Self = Self(0x27);
    pub const L: Self = Self(0x28);
    pub const SEMICOLON: Self = Self(0x29);
    pub const QUOTE: Self = Self(0x2a);
    pub const KP_FOUR: Self = Self(0x2d);
    pub const KP_FIVE: Self = Self(0x2e);
    pub const KP_SIX: Self = Self(0x2f);
    pub const Z: Self = Self(0x31);
    pub const X: Self = Self(0x32);
    pub const C: Self = Self(0x33);
    pub const V: Self = Self(0x34);
    pub const B: Self = Self(0x35);
    pub const N: Self = Self(0x36);
    pub const M: Self = Self(0x37);
    pub const COMMA: Self = Self(0x38);
    pub const PERIOD: Self = Self(0x39);
    pub const SLASH: Self = Self(0x3a);
    pub const KP_PERIOD: Self = Self(0x3c);
    pub const KP_SEVEN: Self = Self(0x3d);
    pub const KP_EIGHT: Self = Self(0x3e);
    pub const KP_NINE: Self = Self(0x3f);
    pub const SPACE: Self = Self(0x40);
    pub const BACKSPACE: Self = Self(0x41);
    pub const TAB: Self = Self(0x42);
    pub const KP_ENTER: Self = Self(0x43);
    pub const RETURN: Self = Self(0x44);
    pub const ESCAPE: Self = Self(0x45);
    pub const DELETE: Self = Self(0x46);
    pub const KP_DASH: Self = Self(0x4a);
    pub const UP: Self = Self(0x4c);
    pub const DOWN: Self = Self(0x4d);
    pub const RIGHT: Self = Self(0x4e);
    pub const LEFT: Self = Self(0x4f);
    pub const F1: Self = Self(0x50);
    pub const F2: Self = Self(0x51);
    pub const F3: Self = Self(0x52);
    pub const F4: Self = Self(0x53);
    pub const F5: Self = Self(0x54);
    pub const F6: Self = Self(0x55);
    pub const F7: Self = Self(0x56);
    pub const F8: Self = Self(0x57);
    pub const F9: Self = Self(0x58);
    pub const F10: Self = Self(0x59);
    pub const KP_SLASH: Self = Self(0x5c);
    pub const KP_ASTERISK: Self = Self(0x5d);
    pub const KP_PLUS: Self = Self(0x5e);
    pub const HELP: Self = Self(0x5f);
    pub const LEFT_SHIFT: Self = Self(0x60);
    pub const RIGHT_SHIFT: Self = Self(0x61);
    pub const CAPS_LOCK: Self = Self(0x62);
    pub const CTRL: Self = Self(0x63);
    pub const LEFT_ALT: Self = Self(0x64);
    pub const RIGHT_ALT: Self = Self(0x65);
    pub const LEFT_AMIGA: Self = Self(0x66);
    pub const RIGHT_AMIGA: Self = Self(0x67);
    pub const UNKNOWN: Self = Self(0xff);

    pub const fn raw(self) -> u8 {
        self.0
    }

    pub const fn is_unknown(self) -> bool {
        self.0 == Self::UNKNOWN.0
    }
}

/// Link codes outside the key space, sent once at power-up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialCode {
    InitiatePowerUp,
    TerminatePowerUp,
}

impl SpecialCode {
    pub const fn raw(self) -> u8 {
        match self {
            Self::InitiatePowerUp => 0xfd,
            Self::TerminatePowerUp => 0xfe,
        }
    }
}

// US layout. Usages not listed map to UNKNOWN.
const USAGE_MAP: &[(u8, AmigaKeycode)] = &[
    (0x04, AmigaKeycode::A),
    (0x05, AmigaKeycode::B),
    (0x06, AmigaKeycode::C),
    (0x07, AmigaKeycode::D),
    (0x08, AmigaKeycode::E),
    (0x09, AmigaKeycode::F),
    (0x0a, AmigaKeycode::G),
    (0x0b, AmigaKeycode::H),
    (0x0c, AmigaKeycode::I),
    (0x0d, AmigaKeycode::J),
    (0x0e, AmigaKeycode::K),
    (0x0f, AmigaKeycode::L),
    (0x10, AmigaKeycode::M),
    (0x11, AmigaKeycode::N),
    (0x12, AmigaKeycode::O),
    (0x13, AmigaKeycode::P),
    (0x14, AmigaKeycode::Q),
    (0x15, AmigaKeycode::R),
    (0x16, AmigaKeycode::S),
    (0x17, AmigaKeycode::T),
    (0x18, AmigaKeycode::U),
    (0x19, AmigaKeycode::V),
    (0x1a, AmigaKeycode::W),
    (0x1b, AmigaKeycode::X),
    (0x1c, AmigaKeycode::Y),
    (0x1d, AmigaKeycode::Z),
    (0x1e, AmigaKeycode::ONE),
    (0x1f, AmigaKeycode::TWO),
    (0x20, AmigaKeycode::THREE),
    (0x21, AmigaKeycode::FOUR),
    (0x22, AmigaKeycode::FIVE),
    (0x23, AmigaKeycode::SIX),
    (0x24, AmigaKeycode::SEVEN),
    (0x25, AmigaKeycode::EIGHT),
    (0x26, AmigaKeycode::NINE),
    (0x27, AmigaKeycode::ZERO),
    (0x28, AmigaKeycode::RETURN),
    (0x29, AmigaKeycode::ESCAPE),
    (0x2a, AmigaKeycode::BACKSPACE),
    (0x2b, AmigaKeycode::TAB),
    (0x2c, AmigaKeycode::SPACE),
    (0x2d, AmigaKeycode::DASH),
    (0x2e, AmigaKeycode::EQUALS),
    (0x2f, AmigaKeycode::OPEN_BRACKET),
    (0x30, AmigaKeycode::CLOSE_BRACKET),
    (0x31, AmigaKeycode::BACKSLASH),
    (0x33, AmigaKeycode::SEMICOLON),
    (0x34, AmigaKeycode::QUOTE),
    (0x35, AmigaKeycode::BACKTICK),
    (0x36, AmigaKeycode::COMMA),
    (0x37, AmigaKeycode::PERIOD),
    (0x38, AmigaKeycode::SLASH),
    (0x39, AmigaKeycode::CAPS_LOCK),
    (0x3a, AmigaKeycode::F1),
    (0x3b, AmigaKeycode::F2),
    (0x3c, AmigaKeycode::F3),
    (0x3d, AmigaKeycode::F4),
    (0x3e, AmigaKeycode::F5),
    (0x3f, AmigaKeycode::F6),
    (0x40, AmigaKeycode::F7),
    (0x41, AmigaKeycode::F8),
    (0x42, AmigaKeycode::F9),
    (0x43, AmigaKeycode::F10),
    // Insert doubles as Help; the Amiga has no insert key.
    (0x49, AmigaKeycode::HELP),
    (0x4c, AmigaKeycode::DELETE),
    (0x4f, AmigaKeycode::RIGHT),
    (0x50, AmigaKeycode::LEFT),
    (0x51, AmigaKeycode::DOWN),
    (0x52, AmigaKeycode::UP),
    (0x54, AmigaKeycode::KP_SLASH),
    (0x55, AmigaKeycode::KP_ASTERISK),
    (0x56, AmigaKeycode::KP_DASH),
    (0x57, AmigaKeycode::KP_PLUS),
    (0x58, AmigaKeycode::KP_ENTER),
    (0x59, AmigaKeycode::KP_ONE),
    (0x5a, AmigaKeycode::KP_TWO),
    (0x5b, AmigaKeycode::KP_THREE),
    (0x5c, AmigaKeycode::KP_FOUR),
    (0x5d, AmigaKeycode::KP_FIVE),
    (0x5e, AmigaKeycode::KP_SIX),
    (0x5f, AmigaKeycode::KP_SEVEN),
    (0x60, AmigaKeycode::KP_EIGHT),
    (0x61, AmigaKeycode::KP_NINE),
    (0x62, AmigaKeycode::KP_ZERO),
    (0x63, AmigaKeycode::KP_PERIOD),
    // Menu is right Amiga.
    (0x65, AmigaKeycode::RIGHT_AMIGA),
];

static HID_TO_AMIGA: [AmigaKeycode; 256] = build_table();

const fn build_table() -> [AmigaKeycode; 256] {
    let mut table = [AmigaKeycode::UNKNOWN; 256];
    let mut i = 0;
    while i < USAGE_MAP.len() {
        let (usage, code) = USAGE_MAP[i];
        table[usage as usize] = code;
        i += 1;
    }
    table
}

/// Translates a HID keyboard usage to its Amiga keycode.
pub fn translate(usage: u8) -> AmigaKeycode {
    HID_TO_AMIGA[usage as usize]
}
