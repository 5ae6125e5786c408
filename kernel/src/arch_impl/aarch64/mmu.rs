//! aarch64 MMU bring-up: MAIR/TCR/TTBR0 programming and the identity map.
//!
//! The kernel runs identity-mapped across the translation-off to
//! translation-on transition; the UART and GIC windows are mapped as device
//! memory so logging and interrupt delivery survive the switch. Caches stay
//! off at first bring-up.

use aarch64_cpu::asm::barrier;
use aarch64_cpu::registers::{MAIR_EL1, SCTLR_EL1, TCR_EL1, TTBR0_EL1};
use conquer_once::spin::OnceCell;
use spin::Mutex;
use tock_registers::interfaces::{ReadWriteable, Writeable};

use crate::arch_impl::aarch64::paging::Aarch64PageTable;
use crate::arch_impl::traits::MapFlags;
use crate::memory::frame_allocator::GlobalFrames;
use crate::memory::layout;
use crate::memory::paging::{AddressSpace, MapError};
use crate::memory::PAGE_SIZE;

pub type KernelSpace = AddressSpace<Aarch64PageTable>;

static KERNEL_SPACE: OnceCell<Mutex<KernelSpace>> = OnceCell::uninit();

/// Build the kernel space, program the translation registers, set the
/// enable bit.
pub fn init() -> Result<(), MapError> {
    let mut frames = GlobalFrames;
    let mut space = KernelSpace::new(&mut frames).ok_or(MapError::OutOfMemory)?;

    let mut pages = 0u64;
    let mut addr = layout::KERNEL_MAP_START;
    while addr < layout::KERNEL_MAP_END {
        space.map(addr, addr, MapFlags::NORMAL, &mut frames)?;
        addr += PAGE_SIZE as u64;
        pages += 1;
    }
    log::info!("identity mapped {} pages ({} MiB)", pages, pages / 256);

    // The console must keep working the instant translation turns on.
    space.map(
        layout::UART_MMIO,
        layout::UART_MMIO,
        MapFlags::DEVICE,
        &mut frames,
    )?;

    let mut addr = layout::GIC_MMIO_START;
    while addr < layout::GIC_MMIO_END {
        space.map(addr, addr, MapFlags::DEVICE, &mut frames)?;
        addr += PAGE_SIZE as u64;
    }

    // Memory attribute indirection: index 0 = Device-nGnRnE, 1 = Normal
    // non-cacheable, 2 = Normal write-back. Matches the PTE codec.
    MAIR_EL1.set(0x0000_0000_00FF_4400);

    // 48-bit VAs on both halves, 4 KiB granule, inner-shareable write-back
    // walks, TTBR1 walks off for now, 36-bit physical space.
    let tcr: u64 = (16 << 0)        // T0SZ
        | (3 << 8)                  // IRGN0
        | (3 << 10)                 // ORGN0
        | (3 << 12)                 // SH0
        | (16 << 16)                // T1SZ
        | (1 << 23)                 // EPD1
        | (3 << 24)                 // IRGN1
        | (3 << 26)                 // ORGN1
        | (3 << 28)                 // SH1
        | (1 << 32); // IPS = 36 bits
    TCR_EL1.set(tcr);

    let root = space.root();
    KERNEL_SPACE.init_once(|| Mutex::new(space));

    TTBR0_EL1.set_baddr(root);
    flush_tlb();

    // Translation on; D and I caches deliberately stay off at bring-up.
    SCTLR_EL1.modify(SCTLR_EL1::M::Enable);
    barrier::isb(barrier::SY);

    log::info!("MMU live, kernel root at {:#x}", root);
    Ok(())
}

/// Install `root` as the active translation and drop every cached entry.
pub fn switch_table(root: u64) {
    TTBR0_EL1.set_baddr(root);
    flush_tlb();
}

fn flush_tlb() {
    unsafe {
        core::arch::asm!("tlbi vmalle1", "dsb sy", "isb", options(nostack));
    }
}

/// Run `f` against the kernel address space (e.g. to map more MMIO).
pub fn with_kernel_space<R>(f: impl FnOnce(&mut KernelSpace) -> R) -> Option<R> {
    let space = KERNEL_SPACE.try_get().ok()?;
    Some(f(&mut space.lock()))
}
