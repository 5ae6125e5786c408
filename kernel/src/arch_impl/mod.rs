//! Architecture back-ends.
//!
//! The neutral core reaches the hardware only through this module. Both
//! back-ends are always declared; the register-touching and assembly parts
//! inside them are gated on the target, while the pure pieces (page-table
//! entry codecs) compile everywhere for the host tests.

pub mod traits;

pub mod aarch64;
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub use aarch64 as current;
#[cfg(target_arch = "x86_64")]
pub use x86_64 as current;

/// Run `f` with IRQs masked at the CPU level.
///
/// Every mutation of a kernel singleton goes through this, which is what
/// makes single-core locking sound: a spinlock can only deadlock here if the
/// holder can be interrupted. Hosted builds (unit tests) have no interrupt
/// plane to mask.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    #[cfg(all(target_os = "none", target_arch = "x86_64"))]
    {
        ::x86_64::instructions::interrupts::without_interrupts(f)
    }
    #[cfg(all(target_os = "none", target_arch = "aarch64"))]
    {
        aarch64::cpu::without_interrupts(f)
    }
    #[cfg(not(target_os = "none"))]
    {
        f()
    }
}
