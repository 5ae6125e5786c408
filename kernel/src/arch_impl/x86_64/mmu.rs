//! x86_64 MMU bring-up: kernel address space construction and CR3 plumbing.
//!
//! Early boot already runs with paging on; this replaces the boot tables
//! with ones owned by the PMM. Everything is identity-mapped so the
//! translation swap is invisible to running code.

use conquer_once::spin::OnceCell;
use spin::Mutex;
use x86_64::registers::control::{Cr0, Cr0Flags, Cr3, Cr3Flags};
use x86_64::structures::paging::PhysFrame;
use x86_64::PhysAddr;

use crate::arch_impl::traits::MapFlags;
use crate::arch_impl::x86_64::paging::X86PageTable;
use crate::memory::frame_allocator::GlobalFrames;
use crate::memory::layout;
use crate::memory::paging::{AddressSpace, MapError};
use crate::memory::PAGE_SIZE;

pub type KernelSpace = AddressSpace<X86PageTable>;

static KERNEL_SPACE: OnceCell<Mutex<KernelSpace>> = OnceCell::uninit();

/// Identity map the 8 MiB kernel window (image + heap + stacks) and the VGA
/// text page, then install the new root.
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

    // Console output must survive the translation swap.
    space.map(
        layout::VGA_TEXT_BUFFER,
        layout::VGA_TEXT_BUFFER,
        MapFlags::DEVICE,
        &mut frames,
    )?;

    let root = space.root();
    KERNEL_SPACE.init_once(|| Mutex::new(space));
    switch_table(root);

    // Boot enabled CR0.PG; write protection is our addition.
    unsafe { Cr0::update(|flags| flags.insert(Cr0Flags::WRITE_PROTECT)) };

    log::info!("MMU live, kernel root at {:#x}", root);
    Ok(())
}

/// Install `root` as the active translation. A CR3 load flushes the
/// non-global TLB as a side effect.
pub fn switch_table(root: u64) {
    let frame = PhysFrame::containing_address(PhysAddr::new(root));
    unsafe { Cr3::write(frame, Cr3Flags::empty()) };
}

/// Run `f` against the kernel address space (e.g. to map more MMIO).
pub fn with_kernel_space<R>(f: impl FnOnce(&mut KernelSpace) -> R) -> Option<R> {
    let space = KERNEL_SPACE.try_get().ok()?;
    Some(f(&mut space.lock()))
}
