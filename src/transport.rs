//! Boundary to the USB host side.
//!
//! The core only needs [`HidTransport`]. [`LineTransport`] implements it
//! for a USB-host co-processor that forwards keyboard reports as text
//! lines over a serial link:
//!
//! ```text
//! -> ATTACH <iface> <protocol>      -> REPORT <iface> <hex bytes>
//! -> DETACH <iface>                 <- SELECT <iface> ACCEPT|REJECT
//! <- LED <iface> <hex byte>         <- HELLO
//! ```

use core::fmt::Write as _;

use heapless::{String, Vec};

use crate::config::{RAW_REPORT_MAX, TRANSPORT_LINE_MAX};
use crate::types::LedReport;

pub type RawReport = Vec<u8, RAW_REPORT_MAX>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// A HID interface appeared; the core decides whether to take it.
    Attached { interface: u8, protocol: u8 },
    Report(RawReport),
    /// A report too long to buffer, with the length it announced.
    OversizedReport { len: usize },
    /// The selected keyboard went away.
    Detached,
}

pub trait HidTransport {
    type Error: core::fmt::Debug;

    fn init(&mut self) -> Result<(), Self::Error>;
    fn poll(&mut self) -> Result<Option<TransportEvent>, Self::Error>;
    /// Answer to the most recent [`TransportEvent::Attached`].
    fn interface_selected(&mut self, accepted: bool) -> Result<(), Self::Error>;
    fn set_leds(&mut self, leds: LedReport) -> Result<(), Self::Error>;
}

/// Non-blocking byte pipe, e.g. a UART.
pub trait SerialIo {
    type Error: core::fmt::Debug;

    /// Reads whatever is buffered; `Ok(0)` when nothing is.
    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
}

/// What one inbound byte finished, if anything.
pub enum LineEvent<'a> {
    Pending,
    Line(&'a [u8]),
    /// A line longer than the buffer. `head` is what fit; hex digits past
    /// it are only counted so a report's real length is still known.
    Truncated {
        head: &'a [u8],
        spilled_hex_digits: usize,
    },
}

/// Splits the inbound byte stream into protocol lines. Either of `\r`
/// and `\n` ends a line; blank lines are skipped.
pub struct LineReader {
    buf: [u8; TRANSPORT_LINE_MAX],
    len: usize,
    spilled_hex_digits: usize,
    truncated: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self {
            buf: [0; TRANSPORT_LINE_MAX],
            len: 0,
            spilled_hex_digits: 0,
            truncated: false,
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> LineEvent<'_> {
        if byte != b'\r' && byte != b'\n' {
            if self.len < self.buf.len() {
                self.buf[self.len] = byte;
                self.len += 1;
            } else {
                self.truncated = true;
                if byte.is_ascii_hexdigit() {
                    self.spilled_hex_digits += 1;
                }
            }
            return LineEvent::Pending;
        }

        let len = core::mem::take(&mut self.len);
        let spilled_hex_digits = core::mem::take(&mut self.spilled_hex_digits);
        if core::mem::take(&mut self.truncated) {
            return LineEvent::Truncated {
                head: &self.buf[..len],
                spilled_hex_digits,
            };
        }
        if len == 0 {
            return LineEvent::Pending;
        }
        LineEvent::Line(&self.buf[..len])
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineCommand {
    Attach { interface: u8, protocol: u8 },
    Report { interface: u8, bytes: RawReport },
    /// A report longer than [`RAW_REPORT_MAX`]; only its length survives.
    OversizedReport { interface: u8, len: usize },
    Detach { interface: u8 },
}

fn tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|token| !token.is_empty())
}

pub fn parse_line(line: &[u8]) -> Option<LineCommand> {
    let mut tokens = tokens(line);
    let command = tokens.next()?;

    if command.eq_ignore_ascii_case(b"ATTACH") {
        let interface = parse_u8_decimal(tokens.next()?)?;
        let protocol = parse_u8_decimal(tokens.next()?)?;
        if tokens.next().is_some() {
            return None;
        }
        return Some(LineCommand::Attach {
            interface,
            protocol,
        });
    }
    if command.eq_ignore_ascii_case(b"REPORT") {
        let interface = parse_u8_decimal(tokens.next()?)?;
        let mut bytes = RawReport::new();
        let mut len = 0usize;
        for token in tokens {
            len += push_hex_token(&mut bytes, token)?;
        }
        if len > RAW_REPORT_MAX {
            return Some(LineCommand::OversizedReport { interface, len });
        }
        return Some(LineCommand::Report { interface, bytes });
    }
    if command.eq_ignore_ascii_case(b"DETACH") {
        let interface = parse_u8_decimal(tokens.next()?)?;
        if tokens.next().is_some() {
            return None;
        }
        return Some(LineCommand::Detach { interface });
    }
    None
}

/// Recovers a report's length from a line that overran the buffer. Only
/// `REPORT` lines can legitimately be that long.
pub fn parse_truncated_line(head: &[u8], spilled_hex_digits: usize) -> Option<LineCommand> {
    let mut tokens = tokens(head);
    if !tokens.next()?.eq_ignore_ascii_case(b"REPORT") {
        return None;
    }
    let interface = parse_u8_decimal(tokens.next()?)?;
    let head_digits: usize = tokens
        .map(|token| token.iter().filter(|b| b.is_ascii_hexdigit()).count())
        .sum();
    let len = (head_digits + spilled_hex_digits) / 2;
    (len > RAW_REPORT_MAX).then_some(LineCommand::OversizedReport { interface, len })
}

fn parse_u8_decimal(token: &[u8]) -> Option<u8> {
    let mut value = 0u8;
    for &b in token {
        if !b.is_ascii_digit() {
            return None;
        }
        value = value.checked_mul(10)?.checked_add(b - b'0')?;
    }
    Some(value)
}

fn hex_nibble(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decodes one hex token into `out` and returns how many bytes it held.
/// Bytes past the capacity are counted but not kept.
fn push_hex_token(out: &mut RawReport, token: &[u8]) -> Option<usize> {
    if token.len() % 2 != 0 {
        return None;
    }
    for pair in token.chunks_exact(2) {
        let byte = (hex_nibble(pair[0])? << 4) | hex_nibble(pair[1])?;
        let _ = out.push(byte);
    }
    Some(token.len() / 2)
}

const RX_CHUNK: usize = 32;

/// [`HidTransport`] over a text line protocol on any [`SerialIo`].
pub struct LineTransport<S> {
    io: S,
    reader: LineReader,
    rx: [u8; RX_CHUNK],
    rx_len: usize,
    rx_pos: usize,
    pending_interface: Option<u8>,
    keyboard_interface: Option<u8>,
}

impl<S: SerialIo> LineTransport<S> {
    pub fn new(io: S) -> Self {
        Self {
            io,
            reader: LineReader::new(),
            rx: [0; RX_CHUNK],
            rx_len: 0,
            rx_pos: 0,
            pending_interface: None,
            keyboard_interface: None,
        }
    }

    pub fn io(&self) -> &S {
        &self.io
    }

    pub fn keyboard_interface(&self) -> Option<u8> {
        self.keyboard_interface
    }

    fn next_byte(&mut self) -> Result<Option<u8>, S::Error> {
        if self.rx_pos == self.rx_len {
            self.rx_len = self.io.read_available(&mut self.rx)?;
            self.rx_pos = 0;
            if self.rx_len == 0 {
                return Ok(None);
            }
        }
        let byte = self.rx[self.rx_pos];
        self.rx_pos += 1;
        Ok(Some(byte))
    }

    fn accept_command(&mut self, command: LineCommand) -> Option<TransportEvent> {
        match command {
            LineCommand::Attach {
                interface,
                protocol,
            } => {
                self.pending_interface = Some(interface);
                Some(TransportEvent::Attached {
                    interface,
                    protocol,
                })
            }
            LineCommand::Report { interface, bytes } => {
                if self.keyboard_interface == Some(interface) {
                    Some(TransportEvent::Report(bytes))
                } else {
                    log::debug!("usb: report from unselected iface={interface}");
                    None
                }
            }
            LineCommand::OversizedReport { interface, len } => {
                if self.keyboard_interface == Some(interface) {
                    Some(TransportEvent::OversizedReport { len })
                } else {
                    log::debug!("usb: oversized report from unselected iface={interface}");
                    None
                }
            }
            LineCommand::Detach { interface } => {
                if self.keyboard_interface == Some(interface) {
                    self.keyboard_interface = None;
                    Some(TransportEvent::Detached)
                } else {
                    None
                }
            }
        }
    }

    fn write_line(&mut self, args: core::fmt::Arguments<'_>) -> Result<(), S::Error> {
        let mut line: String<32> = String::new();
        // Every reply fits; a truncated line would be caught by the peer.
        let _ = line.write_fmt(args);
        let _ = line.push('\n');
        self.io.write_all(line.as_bytes())
    }
}

impl<S: SerialIo> HidTransport for LineTransport<S> {
    type Error = S::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.write_line(format_args!("HELLO"))
    }

    fn poll(&mut self) -> Result<Option<TransportEvent>, Self::Error> {
        while let Some(byte) = self.next_byte()? {
            let command = match self.reader.push_byte(byte) {
                LineEvent::Pending => continue,
                LineEvent::Line(line) => {
                    let parsed = parse_line(line);
                    if parsed.is_none() {
                        log::warn!("usb: unparsed line len={}", line.len());
                    }
                    parsed
                }
                LineEvent::Truncated {
                    head,
                    spilled_hex_digits,
                } => {
                    log::warn!(
                        "usb: line over {} bytes, {} hex digits past the buffer",
                        TRANSPORT_LINE_MAX,
                        spilled_hex_digits
                    );
                    parse_truncated_line(head, spilled_hex_digits)
                }
            };
            if let Some(event) = command.and_then(|command| self.accept_command(command)) {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    fn interface_selected(&mut self, accepted: bool) -> Result<(), Self::Error> {
        let Some(interface) = self.pending_interface.take() else {
            return Ok(());
        };
        if accepted {
            self.keyboard_interface = Some(interface);
        }
        let verdict = if accepted { "ACCEPT" } else { "REJECT" };
        self.write_line(format_args!("SELECT {interface} {verdict}"))
    }

    fn set_leds(&mut self, leds: LedReport) -> Result<(), Self::Error> {
        let Some(interface) = self.keyboard_interface else {
            return Ok(());
        };
        self.write_line(format_args!("LED {interface} {:02X}", leds.bits()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimSerial;

    /// Runs `text` through a fresh reader and parses every line it yields.
    fn commands(text: &[u8]) -> std::vec::Vec<Option<LineCommand>> {
        let mut reader = LineReader::new();
        let mut out = std::vec::Vec::new();
        for &byte in text {
            match reader.push_byte(byte) {
                LineEvent::Pending => {}
                LineEvent::Line(line) => out.push(parse_line(line)),
                LineEvent::Truncated {
                    head,
                    spilled_hex_digits,
                } => out.push(parse_truncated_line(head, spilled_hex_digits)),
            }
        }
        out
    }

    fn report_line(interface: u8, body: &str) -> std::string::String {
        std::format!("REPORT {interface} {body}\n")
    }

    #[test]
    fn crlf_and_blank_lines_split_protocol_lines() {
        assert_eq!(
            commands(b"ATTACH 0 1\r\n\r\n\nDETACH 0\rREPORT 0 02"),
            vec![
                Some(LineCommand::Attach {
                    interface: 0,
                    protocol: 1
                }),
                Some(LineCommand::Detach { interface: 0 }),
            ]
        );
    }

    #[test]
    fn overlong_report_line_keeps_its_length() {
        let line = report_line(3, &"04 ".repeat(100));
        let mut reader = LineReader::new();
        let (last, body) = line.as_bytes().split_last().unwrap();
        for &byte in body {
            assert!(matches!(reader.push_byte(byte), LineEvent::Pending));
        }
        match reader.push_byte(*last) {
            LineEvent::Truncated {
                head,
                spilled_hex_digits,
            } => {
                assert_eq!(head.len(), TRANSPORT_LINE_MAX);
                assert_eq!(spilled_hex_digits, 67);
                assert_eq!(
                    parse_truncated_line(head, spilled_hex_digits),
                    Some(LineCommand::OversizedReport {
                        interface: 3,
                        len: 100
                    })
                );
            }
            _ => panic!("expected a truncated line"),
        }

        // The next line starts clean.
        for &byte in b"DETACH 3" {
            assert!(matches!(reader.push_byte(byte), LineEvent::Pending));
        }
        match reader.push_byte(b'\n') {
            LineEvent::Line(line) => {
                assert_eq!(parse_line(line), Some(LineCommand::Detach { interface: 3 }))
            }
            _ => panic!("expected a complete line"),
        }
    }

    #[test]
    fn report_past_raw_limit_is_oversized() {
        let full = report_line(0, &"04".repeat(RAW_REPORT_MAX));
        match commands(full.as_bytes()).as_slice() {
            [Some(LineCommand::Report { interface: 0, bytes })] => {
                assert_eq!(bytes.len(), RAW_REPORT_MAX)
            }
            other => panic!("unexpected {other:?}"),
        }

        let over = report_line(0, &"04".repeat(RAW_REPORT_MAX + 1));
        assert_eq!(
            commands(over.as_bytes()),
            vec![Some(LineCommand::OversizedReport {
                interface: 0,
                len: RAW_REPORT_MAX + 1
            })]
        );
    }

    #[test]
    fn overlong_non_report_line_is_dropped() {
        let mut line = std::string::String::from("ATTACH 0 ");
        line.push_str(&"1".repeat(TRANSPORT_LINE_MAX));
        line.push('\n');
        assert_eq!(commands(line.as_bytes()), vec![None]);
    }

    #[test]
    fn oversized_report_surfaces_only_for_the_keyboard() {
        let mut input = std::string::String::from("ATTACH 0 1\n");
        input.push_str(&report_line(1, &"00".repeat(65)));
        input.push_str(&report_line(0, &"00 ".repeat(80)));
        let mut transport = LineTransport::new(SimSerial::with_input(&input));

        assert!(matches!(
            transport.poll().unwrap(),
            Some(TransportEvent::Attached { interface: 0, .. })
        ));
        transport.interface_selected(true).unwrap();
        assert_eq!(
            transport.poll().unwrap(),
            Some(TransportEvent::OversizedReport { len: 80 })
        );
        assert_eq!(transport.poll().unwrap(), None);
    }

    #[test]
    fn parses_reports_with_and_without_spaces() {
        let spaced = parse_line(b"REPORT 0 02 00 04 00 00 00 00 00").unwrap();
        let packed = parse_line(b"report 0 0200040000000000").unwrap();
        assert_eq!(spaced, packed);
        match spaced {
            LineCommand::Report { interface, bytes } => {
                assert_eq!(interface, 0);
                assert_eq!(bytes.as_slice(), &[0x02, 0, 0x04, 0, 0, 0, 0, 0]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_eq!(parse_line(b"REPORT 0 0"), None);
        assert_eq!(parse_line(b"REPORT 0 zz"), None);
        assert_eq!(parse_line(b"ATTACH 1"), None);
        assert_eq!(parse_line(b"ATTACH 1 300"), None);
        assert_eq!(parse_line(b"BOGUS"), None);
    }

    #[test]
    fn empty_report_line_is_a_zero_length_report() {
        assert_eq!(
            parse_line(b"REPORT 2"),
            Some(LineCommand::Report {
                interface: 2,
                bytes: RawReport::new()
            })
        );
    }

    #[test]
    fn reports_flow_only_from_the_accepted_interface() {
        let io = SimSerial::with_input(
            "ATTACH 1 2\nREPORT 1 0000040000000000\nATTACH 0 1\r\nREPORT 0 0000050000000000\n",
        );
        let mut transport = LineTransport::new(io);

        assert_eq!(
            transport.poll().unwrap(),
            Some(TransportEvent::Attached {
                interface: 1,
                protocol: 2
            })
        );
        transport.interface_selected(false).unwrap();
        assert_eq!(
            transport.poll().unwrap(),
            Some(TransportEvent::Attached {
                interface: 0,
                protocol: 1
            })
        );
        transport.interface_selected(true).unwrap();
        match transport.poll().unwrap() {
            Some(TransportEvent::Report(bytes)) => assert_eq!(bytes[2], 0x05),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(transport.poll().unwrap(), None);
        assert_eq!(
            transport.io().output(),
            "SELECT 1 REJECT\nSELECT 0 ACCEPT\n"
        );
    }

    #[test]
    fn leds_and_detach_target_the_keyboard() {
        let io = SimSerial::with_input("ATTACH 3 1\nDETACH 4\nDETACH 3\n");
        let mut transport = LineTransport::new(io);
        transport.init().unwrap();
        transport.poll().unwrap();
        transport.interface_selected(true).unwrap();
        transport.set_leds(LedReport::caps_lock(true)).unwrap();
        assert_eq!(transport.poll().unwrap(), Some(TransportEvent::Detached));
        assert_eq!(transport.keyboard_interface(), None);
        transport.set_leds(LedReport::caps_lock(false)).unwrap();
        assert_eq!(
            transport.io().output(),
            "HELLO\nSELECT 3 ACCEPT\nLED 3 02\n"
        );
    }
}
