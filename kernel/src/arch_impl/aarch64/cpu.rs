//! CPU-level interrupt control and halt (DAIF.I and WFI).

use aarch64_cpu::registers::DAIF;
use core::arch::asm;
use tock_registers::interfaces::Readable;

pub fn enable_interrupts() {
    unsafe { asm!("msr daifclr, #2", options(nomem, nostack)) };
}

pub fn disable_interrupts() {
    unsafe { asm!("msr daifset, #2", options(nomem, nostack)) };
}

pub fn interrupts_enabled() -> bool {
    DAIF.read(DAIF::I) == 0
}

pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let was_enabled = interrupts_enabled();
    disable_interrupts();
    let result = f();
    if was_enabled {
        enable_interrupts();
    }
    result
}

pub fn wait_for_interrupt() {
    aarch64_cpu::asm::wfi();
}

/// Mask everything (D, A, I, F) and halt forever.
pub fn halt() -> ! {
    unsafe { asm!("msr daifset, #0xf", options(nomem, nostack)) };
    loop {
        aarch64_cpu::asm::wfi();
    }
}
