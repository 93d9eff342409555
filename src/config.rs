/// Capacity of the stored previous report. Anything longer is fatal.
pub const HID_BUF_MAX: usize = 32;
/// Largest report the transport will hand to the core.
pub const RAW_REPORT_MAX: usize = 64;
/// Upper bound on events produced from one report pair.
pub const MAX_EVENTS_PER_REPORT: usize = 2 * HID_BUF_MAX + 8;

/// `bInterfaceProtocol` of a boot keyboard.
pub const HID_PROTOCOL_KEYBOARD: u8 = 0x01;
/// HID usage of the Application ("menu") key, part of the reset combo.
pub const HID_MENU_USAGE: u8 = 0x65;

// Bit cell timing on the Amiga keyboard port.
pub const DATA_SETUP_US: u32 = 20;
pub const CLOCK_LOW_US: u32 = 20;
pub const CLOCK_HIGH_US: u32 = 50;
/// The Amiga may take up to 143 ms to pull KDAT low after a frame.
pub const HANDSHAKE_TIMEOUT_US: u32 = 143_000;
pub const HANDSHAKE_POLL_US: u32 = 10;

pub const STARTUP_SETTLE_MS: u32 = 1_000;
pub const POWER_CODE_GAP_US: u32 = 200;
pub const ENUMERATION_SETTLE_MS: u32 = 200;

pub const PULSE_PERIOD_MS: u32 = 1_000;
/// Minimum time the liveness pulse holds the data line low, in timer
/// ticks (microseconds).
pub const PULSE_HOLD_TICKS: u32 = 64;

/// Link statistics are logged every this many liveness pulses.
pub const STATS_LOG_EVERY_PULSES: u32 = 60;

pub const TRANSPORT_LINE_MAX: usize = 2 * RAW_REPORT_MAX + RAW_REPORT_MAX + 16;

pub const LOG_LEVEL: log::LevelFilter = log::LevelFilter::Info;

/// Baud rate of the link to the USB-host co-processor.
pub const USB_HOST_UART_BAUD: u32 = 115_200;
