use core::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// The emitter was asked to send the unrecognized sentinel.
    UnknownKeycode,
    /// A report longer than the stored history buffer.
    OversizedReport { len: usize, max: usize },
    TransportInit,
    Transport,
    /// A fatal error already stopped the link.
    Halted,
}

impl LinkError {
    pub fn is_fatal(self) -> bool {
        matches!(
            self,
            Self::OversizedReport { .. } | Self::TransportInit | Self::Halted
        )
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownKeycode => f.write_str("refusing to send unknown keycode"),
            Self::OversizedReport { len, max } => {
                write!(f, "hid report of {len} bytes exceeds buffer of {max}")
            }
            Self::TransportInit => f.write_str("usb transport did not start"),
            Self::Transport => f.write_str("usb transport i/o failed"),
            Self::Halted => f.write_str("link halted after fatal error"),
        }
    }
}
