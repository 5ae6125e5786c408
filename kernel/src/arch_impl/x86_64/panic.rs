//! x86_64 register dump for the panic path.

use x86_64::registers::control::{Cr0, Cr2, Cr3, Cr4};

use crate::console_println;
use crate::panic::PanicRegs;

const GP_NAMES: [&str; 16] = [
    "RAX", "RBX", "RCX", "RDX", "RSI", "RDI", "RBP", "RSP", "R8 ", "R9 ", "R10", "R11", "R12",
    "R13", "R14", "R15",
];

pub fn dump_registers(regs: &PanicRegs) {
    console_println!("RIP:    {:#018x}", regs.pc);
    console_println!("RSP:    {:#018x}", regs.sp);
    console_println!("RFLAGS: {:#018x}", regs.flags);
    console_println!();

    for pair in GP_NAMES.chunks(2).enumerate() {
        let (i, names) = pair;
        console_println!(
            "  {}: {:#018x}  {}: {:#018x}",
            names[0],
            regs.regs[2 * i],
            names[1],
            regs.regs[2 * i + 1]
        );
    }
    console_println!();

    let cr0 = Cr0::read_raw();
    let cr2 = Cr2::read_raw();
    let (cr3_frame, _) = Cr3::read();
    let cr4 = Cr4::read_raw();
    console_println!("Control registers:");
    console_println!(
        "  CR0: {:#018x} (PE={}, PG={})",
        cr0,
        cr0 & 1,
        (cr0 >> 31) & 1
    );
    console_println!("  CR2: {:#018x} (page fault address)", cr2);
    console_println!(
        "  CR3: {:#018x} (page table root)",
        cr3_frame.start_address().as_u64()
    );
    console_println!("  CR4: {:#018x}", cr4);
}
