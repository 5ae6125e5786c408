//! Intel 8254 PIT: channel 0 as the system tick.
//!
//! Mode 2 (rate generator) auto-reloads, so the handler only accounts the
//! tick; no rearm needed.

use x86_64::instructions::port::Port;

use crate::irq;
use crate::time::TICK_HZ;

const PIT_BASE_FREQ: u32 = 1_193_182;
const PIT_CHANNEL0: u16 = 0x40;
const PIT_COMMAND: u16 = 0x43;
/// Channel 0, lobyte/hibyte access, mode 2, binary counting.
const PIT_CMD: u8 = 0x34;

pub const TIMER_IRQ: u32 = 0;

pub fn init() {
    let divisor = PIT_BASE_FREQ / TICK_HZ as u32;
    unsafe {
        let mut command: Port<u8> = Port::new(PIT_COMMAND);
        let mut channel0: Port<u8> = Port::new(PIT_CHANNEL0);
        command.write(PIT_CMD);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }

    irq::install(TIMER_IRQ, timer_irq_handler);
    irq::enable(TIMER_IRQ);
    log::info!("PIT running at {} Hz (divisor {})", TICK_HZ, divisor);
}

fn timer_irq_handler() {
    crate::time::tick();
}
