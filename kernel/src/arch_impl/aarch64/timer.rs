//! ARM generic timer: EL1 physical timer on PPI 14 (IRQ 30).

use aarch64_cpu::registers::{CNTFRQ_EL0, CNTPCT_EL0, CNTP_CTL_EL0, CNTP_CVAL_EL0};
use conquer_once::spin::OnceCell;
use tock_registers::interfaces::{Readable, Writeable};

use crate::arch_impl::aarch64::gic::IRQ_TIMER_PHYS;
use crate::irq;
use crate::time::TICK_HZ;

/// Counter increments per scheduler tick; derived from CNTFRQ_EL0 at init.
static INTERVAL: OnceCell<u64> = OnceCell::uninit();

pub fn counter() -> u64 {
    CNTPCT_EL0.get()
}

pub fn frequency() -> u64 {
    CNTFRQ_EL0.get()
}

pub fn init() {
    let freq = frequency();
    let interval = freq / TICK_HZ;
    INTERVAL.init_once(|| interval);
    log::info!(
        "generic timer: {} Hz counter, {} counts per tick",
        freq,
        interval
    );

    // Quiet while configuring.
    CNTP_CTL_EL0.write(CNTP_CTL_EL0::ENABLE::CLEAR);
    CNTP_CVAL_EL0.set(counter() + interval);

    irq::install(IRQ_TIMER_PHYS, timer_irq_handler);
    irq::set_priority(IRQ_TIMER_PHYS, 0x80);
    irq::enable(IRQ_TIMER_PHYS);

    CNTP_CTL_EL0.write(CNTP_CTL_EL0::ENABLE::SET + CNTP_CTL_EL0::IMASK::CLEAR);
}

fn timer_irq_handler() {
    crate::time::tick();

    // Rearm relative to "now": intervals missed while the handler was
    // delayed are dropped, not caught up.
    if let Ok(interval) = INTERVAL.try_get() {
        CNTP_CVAL_EL0.set(counter() + *interval);
    }
}

/// Busy wait against the raw counter.
pub fn spin_wait_ms(ms: u64) {
    let target = counter() + ms * frequency() / 1000;
    while counter() < target {
        core::hint::spin_loop();
    }
}
