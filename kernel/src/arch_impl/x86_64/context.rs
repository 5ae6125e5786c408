//! x86_64 context switch.
//!
//! Only the System V callee-saved set crosses a switch: the switch happens
//! inside a normal call, so caller-saved registers are already dead. Two
//! assembly entry points: `switch_context` saves and loads, `switch_to_first`
//! only loads (the first-switch bootstrap has no previous context worth
//! saving). New tasks start in `task_entry_trampoline`, which unmasks
//! interrupts, runs the body out of RBX, and falls into `task_exit`.

use core::arch::global_asm;

/// Saved across `switch_context`. Field order is the assembly's layout.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct CpuContext {
    pub rbx: u64,
    pub rbp: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rsp: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl CpuContext {
    pub const fn zeroed() -> Self {
        Self {
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rsp: 0,
            rip: 0,
            rflags: 0,
        }
    }
}

global_asm!(
    r#"
.global switch_context
.global switch_to_first
.global task_entry_trampoline

// switch_context(prev: *mut CpuContext [rdi], next: *const CpuContext [rsi])
switch_context:
    mov [rdi + 0x00], rbx
    mov [rdi + 0x08], rbp
    mov [rdi + 0x10], r12
    mov [rdi + 0x18], r13
    mov [rdi + 0x20], r14
    mov [rdi + 0x28], r15
    lea rax, [rsp + 8]          // rsp once the return address is popped
    mov [rdi + 0x30], rax
    mov rax, [rsp]              // resume point = our return address
    mov [rdi + 0x38], rax
    pushfq
    pop rax
    mov [rdi + 0x40], rax

2:
    mov rbx, [rsi + 0x00]
    mov rbp, [rsi + 0x08]
    mov r12, [rsi + 0x10]
    mov r13, [rsi + 0x18]
    mov r14, [rsi + 0x20]
    mov r15, [rsi + 0x28]
    mov rax, [rsi + 0x40]
    push rax
    popfq
    mov rsp, [rsi + 0x30]
    mov rax, [rsi + 0x38]
    jmp rax

// switch_to_first(next: *const CpuContext [rdi]) -> !
switch_to_first:
    mov rsi, rdi
    jmp 2b

// First entry for a fresh task: IRQs on, body in rbx, exit on return.
task_entry_trampoline:
    sti
    call rbx
    call {task_exit}
3:
    hlt
    jmp 3b
"#,
    task_exit = sym crate::task::scheduler::task_exit
);

extern "C" {
    /// Save into `prev`, load from `next`; returns when `prev` is resumed.
    pub fn switch_context(prev: *mut CpuContext, next: *const CpuContext);

    /// Load `next` without saving anything. First-switch bootstrap only.
    pub fn switch_to_first(next: *const CpuContext) -> !;

    fn task_entry_trampoline();
}

/// Prime a fresh context so the first switch into it lands in `entry` on its
/// own stack. Interrupts stay masked until the trampoline opens them.
pub fn setup_task_context(ctx: &mut CpuContext, stack_top: usize, entry: fn()) {
    *ctx = CpuContext::zeroed();
    ctx.rbx = entry as usize as u64;
    ctx.rsp = (stack_top & !15) as u64;
    ctx.rip = task_entry_trampoline as usize as u64;
    // Bit 1 is architecturally fixed to one; IF stays clear.
    ctx.rflags = 0x2;
}
