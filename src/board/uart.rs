use amigahid::transport::SerialIo;
use esp_hal::{
    uart::{RxError, TxError, Uart},
    Blocking,
};

#[derive(Debug)]
pub(crate) enum UartFault {
    Rx(RxError),
    Tx(TxError),
    Stalled,
}

/// Non-blocking view of the co-processor UART.
pub(crate) struct UartIo {
    uart: Uart<'static, Blocking>,
}

impl UartIo {
    pub(crate) fn new(uart: Uart<'static, Blocking>) -> Self {
        Self { uart }
    }
}

impl SerialIo for UartIo {
    type Error = UartFault;

    fn read_available(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        if !self.uart.read_ready() {
            return Ok(0);
        }
        self.uart.read(buf).map_err(UartFault::Rx)
    }

    fn write_all(&mut self, mut bytes: &[u8]) -> Result<(), Self::Error> {
        while !bytes.is_empty() {
            match self.uart.write(bytes) {
                Ok(0) => return Err(UartFault::Stalled),
                Ok(written) => bytes = &bytes[written..],
                Err(err) => return Err(UartFault::Tx(err)),
            }
        }
        self.uart.flush().map_err(UartFault::Tx)
    }
}
