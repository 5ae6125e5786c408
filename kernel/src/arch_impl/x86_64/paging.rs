//! x86_64 page-table entry encoding (PML4 -> PDPT -> PD -> PT).

use crate::arch_impl::traits::{MapFlags, PageTableFormat};

pub const PTE_PRESENT: u64 = 1 << 0;
pub const PTE_WRITE: u64 = 1 << 1;
pub const PTE_USER: u64 = 1 << 2;
pub const PTE_WRITETHROUGH: u64 = 1 << 3;
pub const PTE_NOCACHE: u64 = 1 << 4;
pub const PTE_ACCESSED: u64 = 1 << 5;
/// PS bit: a 2 MiB / 1 GiB block when set at a non-leaf level.
pub const PTE_LARGE: u64 = 1 << 7;

/// Bits 12..51, assuming 52-bit physical addressing.
pub const PTE_ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

pub struct X86PageTable;

impl PageTableFormat for X86PageTable {
    fn table_descriptor(pa: u64) -> u64 {
        (pa & PTE_ADDR_MASK) | PTE_PRESENT | PTE_WRITE
    }

    fn leaf_descriptor(pa: u64, flags: MapFlags) -> u64 {
        let mut pte = (pa & PTE_ADDR_MASK) | PTE_PRESENT | PTE_ACCESSED;
        if flags.write {
            pte |= PTE_WRITE;
        }
        if flags.device {
            // MMIO bypasses the caches.
            pte |= PTE_NOCACHE | PTE_WRITETHROUGH;
        }
        pte
    }

    fn is_present(entry: u64) -> bool {
        entry & PTE_PRESENT != 0
    }

    fn is_table(entry: u64) -> bool {
        entry & PTE_PRESENT != 0 && entry & PTE_LARGE == 0
    }

    fn entry_address(entry: u64) -> u64 {
        entry & PTE_ADDR_MASK
    }

    fn is_device(entry: u64) -> bool {
        entry & PTE_NOCACHE != 0
    }

    fn flush_tlb_page(va: u64) {
        #[cfg(all(target_arch = "x86_64", target_os = "none"))]
        ::x86_64::instructions::tlb::flush(::x86_64::VirtAddr::new(va));
        #[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
        let _ = va;
    }

    fn flush_tlb_all() {
        #[cfg(all(target_arch = "x86_64", target_os = "none"))]
        ::x86_64::instructions::tlb::flush_all();
    }
}
