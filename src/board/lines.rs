use core::cell::RefCell;

use amigahid::platform::{Direction, Level, Line, LinePort};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use esp_hal::{
    gpio::{DriveMode, Flex, InputConfig, Level as PinLevel, Output, OutputConfig, Pull},
    peripherals::{GPIO25, GPIO26, GPIO27},
};

struct PortPins {
    clock: Output<'static>,
    data: Flex<'static>,
    reset: Output<'static>,
}

/// The data line is driven from both the poll loop and the pulse timer
/// interrupt, so all three lines live behind one critical section.
static PORT_PINS: Mutex<CriticalSectionRawMutex, RefCell<Option<PortPins>>> =
    Mutex::new(RefCell::new(None));

pub(crate) fn install(clock: GPIO25<'static>, data: GPIO26<'static>, reset: GPIO27<'static>) {
    let open_drain = OutputConfig::default()
        .with_drive_mode(DriveMode::OpenDrain)
        .with_pull(Pull::Up);

    let clock = Output::new(clock, PinLevel::High, open_drain);
    let reset = Output::new(reset, PinLevel::High, open_drain);

    let mut data = Flex::new(data);
    data.apply_output_config(&open_drain);
    data.apply_input_config(&InputConfig::default().with_pull(Pull::Up));
    data.set_high();
    data.set_input_enable(true);
    data.set_output_enable(true);

    PORT_PINS.lock(|cell| {
        cell.replace(Some(PortPins { clock, data, reset }));
    });
}

fn with_pins<R>(f: impl FnOnce(&mut PortPins) -> R) -> Option<R> {
    PORT_PINS.lock(|cell| cell.borrow_mut().as_mut().map(f))
}

fn pin_level(level: Level) -> PinLevel {
    match level {
        Level::Low => PinLevel::Low,
        Level::High => PinLevel::High,
    }
}

fn line_level(level: PinLevel) -> Level {
    match level {
        PinLevel::Low => Level::Low,
        PinLevel::High => Level::High,
    }
}

/// Handle to the keyboard connector; usable from interrupt context.
pub(crate) struct BoardLines;

impl LinePort for BoardLines {
    fn write(&mut self, line: Line, level: Level) {
        let level = pin_level(level);
        with_pins(|pins| match line {
            Line::Clock => pins.clock.set_level(level),
            Line::Data => pins.data.set_level(level),
            Line::Reset => pins.reset.set_level(level),
        });
    }

    fn read(&mut self, line: Line) -> Level {
        with_pins(|pins| match line {
            Line::Clock => line_level(pins.clock.output_level()),
            Line::Data => line_level(pins.data.level()),
            Line::Reset => line_level(pins.reset.output_level()),
        })
        .unwrap_or(Level::High)
    }

    fn set_direction(&mut self, line: Line, direction: Direction) {
        // Clock and reset are always driven.
        if line != Line::Data {
            return;
        }
        with_pins(|pins| pins.data.set_output_enable(direction == Direction::Output));
    }
}
