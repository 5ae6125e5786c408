//! aarch64 register dump for the panic path.

use aarch64_cpu::registers::{CurrentEL, ELR_EL1, ESR_EL1, FAR_EL1, SP_EL0};
use tock_registers::interfaces::Readable;

use crate::console_println;
use crate::panic::PanicRegs;

pub fn dump_registers(regs: &PanicRegs) {
    console_println!("PC:     {:#018x}", regs.pc);
    console_println!("SP:     {:#018x}", regs.sp);
    console_println!("LR:     {:#018x}", regs.lr);
    console_println!("PSTATE: {:#018x}", regs.flags);
    console_println!();

    for i in 0..15 {
        let a = 2 * i;
        let b = 2 * i + 1;
        console_println!(
            "  x{:<2}: {:#018x}  x{:<2}: {:#018x}",
            a,
            regs.regs[a],
            b,
            regs.regs[b]
        );
    }
    console_println!("  x30: {:#018x}", regs.regs[30]);
    console_println!();

    let current_el = CurrentEL.get();
    let esr = ESR_EL1.get();
    console_println!("System registers:");
    console_println!("  CurrentEL: EL{}", (current_el >> 2) & 0x3);
    console_println!("  SP_EL0:    {:#018x}", SP_EL0.get());
    console_println!("  ELR_EL1:   {:#018x} (exception return address)", ELR_EL1.get());
    console_println!("  ESR_EL1:   {:#018x} (exception syndrome)", esr);
    console_println!("  FAR_EL1:   {:#018x} (fault address)", FAR_EL1.get());

    let ec = (esr >> 26) & 0x3F;
    console_println!(
        "  EC {:#x}: {}  ISS: {:#x}",
        ec,
        exception_class_name(ec),
        esr & 0x1FF_FFFF
    );
}

/// Decode the ESR_EL1 exception class.
pub fn exception_class_name(ec: u64) -> &'static str {
    match ec {
        0x00 => "unknown reason",
        0x01 => "trapped WFI/WFE",
        0x07 => "SVE/SIMD/FP access",
        0x15 => "SVC from AArch64",
        0x20 => "instruction abort, lower EL",
        0x21 => "instruction abort, same EL",
        0x22 => "PC alignment fault",
        0x24 => "data abort, lower EL",
        0x25 => "data abort, same EL",
        0x26 => "SP alignment fault",
        0x30 => "breakpoint, lower EL",
        0x31 => "breakpoint, same EL",
        0x3C => "BRK instruction",
        _ => "other",
    }
}
