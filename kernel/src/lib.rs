//! Zixiao: a small dual-architecture kernel for the QEMU virt (aarch64) and
//! pc (x86_64) machines.
//!
//! The core is architecture-neutral: a bitmap physical allocator, a
//! free-list kernel heap, a four-level page-table mapper, an IRQ dispatch
//! table, tick bookkeeping, and the Yuheng preemptive scheduler. Each
//! architecture contributes a thin back-end under [`arch_impl`]: context
//! switch, interrupt controller, timer, MMU register programming, and the
//! panic register dump.
//!
//! Everything algorithmic runs over raw memory handed in by the caller, so
//! the unit tests exercise the real code paths on the host with a
//! buffer-backed "physical" range.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(target_arch = "x86_64", feature(abi_x86_interrupt))]

pub mod arch_impl;
pub mod console;
pub mod drivers;
pub mod irq;
pub mod logger;
pub mod memory;
pub mod panic;
pub mod task;
pub mod time;

#[cfg(target_arch = "x86_64")]
pub mod serial;
#[cfg(target_arch = "aarch64")]
pub mod serial_aarch64;
#[cfg(target_arch = "aarch64")]
pub use serial_aarch64 as serial;
