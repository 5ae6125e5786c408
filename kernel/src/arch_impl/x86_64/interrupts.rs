//! IDT setup and CPU exception reporting.
//!
//! Hardware IRQs land on vectors 0x20+ and route into the neutral dispatch
//! table. CPU faults enter through assembly stubs that push the whole
//! general-purpose file before any Rust prologue can clobber it, then feed
//! the panic path a complete register snapshot. Faults without a hardware
//! error code push a dummy one so every stub shares the same frame layout.

use conquer_once::spin::OnceCell;
use core::arch::global_asm;
use x86_64::registers::control::Cr2;
use x86_64::structures::idt::{InterruptDescriptorTable, InterruptStackFrame};
use x86_64::VirtAddr;

use crate::arch_impl::x86_64::pic::{Pic8259, PIC_1_OFFSET, PIC_2_OFFSET};
use crate::irq;
use crate::panic::{kernel_panic, PanicRegs};

static IDT: OnceCell<InterruptDescriptorTable> = OnceCell::uninit();

pub fn init() {
    IDT.init_once(|| {
        let mut idt = InterruptDescriptorTable::new();
        idt.breakpoint.set_handler_fn(breakpoint_handler);
        unsafe {
            idt.divide_error
                .set_handler_addr(VirtAddr::new(divide_error_stub as usize as u64));
            idt.invalid_opcode
                .set_handler_addr(VirtAddr::new(invalid_opcode_stub as usize as u64));
            idt.double_fault
                .set_handler_addr(VirtAddr::new(double_fault_stub as usize as u64));
            idt.general_protection_fault
                .set_handler_addr(VirtAddr::new(general_protection_stub as usize as u64));
            idt.page_fault
                .set_handler_addr(VirtAddr::new(page_fault_stub as usize as u64));
        }

        idt[PIC_1_OFFSET].set_handler_fn(timer_vector);
        idt[PIC_1_OFFSET + 7].set_handler_fn(spurious_master_vector);
        idt[PIC_2_OFFSET + 7].set_handler_fn(spurious_slave_vector);
        idt
    });
    IDT.try_get().expect("IDT just initialized").load();
    log::info!("IDT loaded");
}

extern "x86-interrupt" fn timer_vector(_frame: InterruptStackFrame) {
    irq::dispatch_vectored::<Pic8259>(0);
}

extern "x86-interrupt" fn spurious_master_vector(_frame: InterruptStackFrame) {
    irq::dispatch_vectored::<Pic8259>(7);
}

extern "x86-interrupt" fn spurious_slave_vector(_frame: InterruptStackFrame) {
    irq::dispatch_vectored::<Pic8259>(15);
}

extern "x86-interrupt" fn breakpoint_handler(frame: InterruptStackFrame) {
    log::warn!(
        "breakpoint at {:#x}, continuing",
        frame.instruction_pointer.as_u64()
    );
}

// Fault entry stubs. Each pushes {vector, error code} (a dummy error code
// where the CPU supplies none), then the common path saves the register
// file and hands everything to `fault_entry`, which never returns.
//
// Frame below the saved registers, growing down:
//   [r15 .. rax : 120 bytes][vector][error code][RIP CS RFLAGS RSP SS]
global_asm!(
    r#"
.global divide_error_stub
divide_error_stub:
    push 0
    push 0
    jmp fault_common

.global invalid_opcode_stub
invalid_opcode_stub:
    push 0
    push 6
    jmp fault_common

.global double_fault_stub
double_fault_stub:
    push 8
    jmp fault_common

.global general_protection_stub
general_protection_stub:
    push 13
    jmp fault_common

.global page_fault_stub
page_fault_stub:
    push 14
    jmp fault_common

fault_common:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rdi, rsp                // saved register file
    lea rsi, [rsp + 136]        // interrupt frame the CPU pushed
    mov rdx, [rsp + 128]        // error code
    mov rcx, [rsp + 120]        // vector
    call {fault_entry}
"#,
    fault_entry = sym fault_entry
);

extern "C" {
    fn divide_error_stub();
    fn invalid_opcode_stub();
    fn double_fault_stub();
    fn general_protection_stub();
    fn page_fault_stub();
}

/// General-purpose file as `fault_common` laid it out (last push lowest).
#[repr(C)]
struct SavedGprs {
    r15: u64,
    r14: u64,
    r13: u64,
    r12: u64,
    r11: u64,
    r10: u64,
    r9: u64,
    r8: u64,
    rbp: u64,
    rdi: u64,
    rsi: u64,
    rdx: u64,
    rcx: u64,
    rbx: u64,
    rax: u64,
}

/// What the CPU pushed at the exception.
#[repr(C)]
#[allow(dead_code)] // cs/ss are layout, not read
struct IretFrame {
    rip: u64,
    cs: u64,
    rflags: u64,
    rsp: u64,
    ss: u64,
}

fn fault_name(vector: u64) -> &'static str {
    match vector {
        0 => "division by zero",
        6 => "invalid opcode",
        8 => "double fault",
        13 => "general protection fault",
        14 => "page fault",
        _ => "cpu exception",
    }
}

extern "C" fn fault_entry(
    gprs: &SavedGprs,
    frame: &IretFrame,
    error_code: u64,
    vector: u64,
) -> ! {
    let mut regs = PanicRegs::new();
    // Same order as the panic dump: RAX..RDX, RSI, RDI, RBP, RSP, R8..R15.
    regs.regs[0] = gprs.rax;
    regs.regs[1] = gprs.rbx;
    regs.regs[2] = gprs.rcx;
    regs.regs[3] = gprs.rdx;
    regs.regs[4] = gprs.rsi;
    regs.regs[5] = gprs.rdi;
    regs.regs[6] = gprs.rbp;
    regs.regs[7] = frame.rsp;
    regs.regs[8] = gprs.r8;
    regs.regs[9] = gprs.r9;
    regs.regs[10] = gprs.r10;
    regs.regs[11] = gprs.r11;
    regs.regs[12] = gprs.r12;
    regs.regs[13] = gprs.r13;
    regs.regs[14] = gprs.r14;
    regs.regs[15] = gprs.r15;
    regs.pc = frame.rip;
    regs.sp = frame.rsp;
    regs.flags = frame.rflags;

    match vector {
        14 => log::error!(
            "page fault at {:#x}, error code {:#x}",
            Cr2::read_raw(),
            error_code
        ),
        8 | 13 => log::error!("error code {:#x}", error_code),
        _ => {}
    }
    kernel_panic(fault_name(vector), Some(&regs));
}
