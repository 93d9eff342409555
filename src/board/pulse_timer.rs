use core::cell::RefCell;

use amigahid::{liveness, platform::PulseTimer};
use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use esp_hal::{
    handler,
    time::{Duration, Instant},
    timer::{timg::Timer, Error as TimerError, PeriodicTimer},
    Blocking,
};

use super::{lines::BoardLines, LIVENESS};

static PULSE_TIMER: Mutex<CriticalSectionRawMutex, RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));

pub(crate) fn start(timer: Timer<'static>, period_ms: u32) -> Result<(), TimerError> {
    let mut timer = PeriodicTimer::new(timer);
    timer.set_interrupt_handler(pulse_timer_isr);
    timer.start(Duration::from_millis(u64::from(period_ms)))?;
    timer.listen();
    PULSE_TIMER.lock(|cell| {
        cell.replace(Some(timer));
    });
    log::info!("board: pulse timer period_ms={period_ms}");
    Ok(())
}

fn now_ticks() -> u32 {
    Instant::now().duration_since_epoch().as_micros() as u32
}

#[handler]
fn pulse_timer_isr() {
    PULSE_TIMER.lock(|cell| {
        if let Some(timer) = cell.borrow_mut().as_mut() {
            timer.clear_interrupt();
        }
    });
    liveness::on_pulse_timer(&LIVENESS, &mut BoardLines, now_ticks());
}

/// Main-loop handle to the pulse timer.
pub(crate) struct BoardPulseTimer;

impl PulseTimer for BoardPulseTimer {
    fn now_ticks(&self) -> u32 {
        now_ticks()
    }

    fn set_masked(&mut self, masked: bool) {
        // The interrupt status stays latched while unlistened, so an
        // expiry during a frame fires as soon as we listen again.
        PULSE_TIMER.lock(|cell| {
            if let Some(timer) = cell.borrow_mut().as_mut() {
                if masked {
                    timer.unlisten();
                } else {
                    timer.listen();
                }
            }
        });
    }
}
