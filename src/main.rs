#![no_std]
#![no_main]

mod board;

use esp_backtrace as _;

#[esp_hal::main]
fn main() -> ! {
    board::run()
}
