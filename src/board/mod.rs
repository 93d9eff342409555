mod delay;
mod lines;
mod pulse_timer;
mod uart;

use amigahid::{
    config::{LOG_LEVEL, PULSE_PERIOD_MS, USB_HOST_UART_BAUD},
    liveness::LivenessState,
    transport::LineTransport,
    LinkDriver,
};
use esp_hal::{
    timer::timg::TimerGroup,
    uart::{Config as UartConfig, Uart},
};

use self::{delay::BusyDelay, lines::BoardLines, pulse_timer::BoardPulseTimer, uart::UartIo};

/// Shared with the pulse timer interrupt.
static LIVENESS: LivenessState = LivenessState::new();

pub(crate) fn run() -> ! {
    esp_println::logger::init_logger(LOG_LEVEL);
    let peripherals = esp_hal::init(esp_hal::Config::default());

    // Keyboard connector: KCLK, KDAT, KRST.
    lines::install(peripherals.GPIO25, peripherals.GPIO26, peripherals.GPIO27);

    let timg1 = TimerGroup::new(peripherals.TIMG1);
    if let Err(err) = pulse_timer::start(timg1.timer0, PULSE_PERIOD_MS) {
        log::error!("board: pulse timer failed err={err:?}");
        halt_forever();
    }

    let uart_cfg = UartConfig::default().with_baudrate(USB_HOST_UART_BAUD);
    let uart = match Uart::new(peripherals.UART1, uart_cfg) {
        Ok(uart) => uart.with_rx(peripherals.GPIO16).with_tx(peripherals.GPIO17),
        Err(err) => {
            log::error!("board: usb host uart failed err={err:?}");
            halt_forever();
        }
    };
    let mut usb = LineTransport::new(UartIo::new(uart));

    let mut link = LinkDriver::new(BoardLines, BusyDelay::new(), BoardPulseTimer, &LIVENESS);
    if let Err(err) = link.start(&mut usb) {
        log::error!("board: startup failed err={err}");
        halt_forever();
    }

    loop {
        match link.poll(&mut usb) {
            Ok(()) => {}
            Err(err) if err.is_fatal() => {
                log::error!("board: stopping err={err}");
                halt_forever();
            }
            Err(err) => log::warn!("board: poll err={err}"),
        }
    }
}

fn halt_forever() -> ! {
    loop {
        core::hint::spin_loop();
    }
}
