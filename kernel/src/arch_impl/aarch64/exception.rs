//! Exception vector table and entry paths.
//!
//! IRQs save the caller-saved register file plus ELR/SPSR on the current
//! stack, run the neutral dispatcher, then restore and `eret`. ELR/SPSR are
//! reloaded from the frame because a context switch inside dispatch lets
//! other exceptions clobber the live registers before this path resumes.
//! Synchronous exceptions never return; they feed the panic path.

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::{ESR_EL1, FAR_EL1, VBAR_EL1};
use core::arch::global_asm;
use tock_registers::interfaces::{Readable, Writeable};

use crate::arch_impl::aarch64::panic::exception_class_name;
use crate::panic::{kernel_panic, PanicRegs};

/// Bytes reserved by the assembly entry for the saved frame.
const FRAME_SIZE: u64 = 192;

global_asm!(
    r#"
.macro ventry label
.align 7
    b \label
.endm

.align 11
.global exception_vector_table
exception_vector_table:
    // Current EL with SP_EL0
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid
    // Current EL with SP_ELx
    ventry vector_sync
    ventry vector_irq
    ventry vector_invalid
    ventry vector_invalid
    // Lower EL, AArch64
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid
    // Lower EL, AArch32
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid
    ventry vector_invalid

vector_irq:
    sub sp, sp, #192
    stp x0, x1, [sp, #0]
    stp x2, x3, [sp, #16]
    stp x4, x5, [sp, #32]
    stp x6, x7, [sp, #48]
    stp x8, x9, [sp, #64]
    stp x10, x11, [sp, #80]
    stp x12, x13, [sp, #96]
    stp x14, x15, [sp, #112]
    stp x16, x17, [sp, #128]
    stp x18, x29, [sp, #144]
    mrs x0, elr_el1
    mrs x1, spsr_el1
    stp x30, x0, [sp, #160]
    str x1, [sp, #176]

    bl {irq_entry}

    ldr x1, [sp, #176]
    ldp x30, x0, [sp, #160]
    msr elr_el1, x0
    msr spsr_el1, x1
    ldp x18, x29, [sp, #144]
    ldp x16, x17, [sp, #128]
    ldp x14, x15, [sp, #112]
    ldp x12, x13, [sp, #96]
    ldp x10, x11, [sp, #80]
    ldp x8, x9, [sp, #64]
    ldp x6, x7, [sp, #48]
    ldp x4, x5, [sp, #32]
    ldp x2, x3, [sp, #16]
    ldp x0, x1, [sp, #0]
    add sp, sp, #192
    eret

vector_sync:
    sub sp, sp, #192
    stp x0, x1, [sp, #0]
    stp x2, x3, [sp, #16]
    stp x4, x5, [sp, #32]
    stp x6, x7, [sp, #48]
    stp x8, x9, [sp, #64]
    stp x10, x11, [sp, #80]
    stp x12, x13, [sp, #96]
    stp x14, x15, [sp, #112]
    stp x16, x17, [sp, #128]
    stp x18, x29, [sp, #144]
    mrs x0, elr_el1
    mrs x1, spsr_el1
    stp x30, x0, [sp, #160]
    str x1, [sp, #176]

    mov x0, sp
    bl {sync_entry}
    b .

vector_invalid:
    bl {invalid_entry}
    b .
"#,
    irq_entry = sym irq_entry,
    sync_entry = sym sync_entry,
    invalid_entry = sym invalid_entry
);

/// Point VBAR_EL1 at the table.
pub fn init() {
    extern "C" {
        static exception_vector_table: u8;
    }
    VBAR_EL1.set(unsafe { &exception_vector_table as *const u8 as u64 });
    barrier::isb(barrier::SY);
    log::info!("exception vectors installed");
}

extern "C" fn irq_entry() {
    crate::irq::dispatch::<super::gic::Gicv2>();
}

/// Offsets into the frame `vector_sync` built. x19-x28 are still live in
/// the register file at this point and are not part of the frame.
extern "C" fn sync_entry(frame: *const u64) -> ! {
    let word = |index: usize| unsafe { frame.add(index).read() };

    let mut regs = PanicRegs::new();
    for i in 0..19 {
        regs.regs[i] = word(i);
    }
    regs.regs[29] = word(19);
    regs.regs[30] = word(20);
    regs.lr = word(20);
    regs.pc = word(21);
    regs.flags = word(22);
    regs.sp = frame as u64 + FRAME_SIZE;

    let esr = ESR_EL1.get();
    let ec = (esr >> 26) & 0x3F;
    log::error!(
        "sync exception: {} (EC={:#x}, ISS={:#x}, FAR={:#x})",
        exception_class_name(ec),
        ec,
        esr & 0x1FF_FFFF,
        FAR_EL1.get()
    );
    kernel_panic("synchronous exception", Some(&regs));
}

extern "C" fn invalid_entry() -> ! {
    kernel_panic("exception from an unexpected vector", None);
}
