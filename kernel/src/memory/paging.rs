//! Shared four-level page-table mapper.
//!
//! One walker serves both architectures; the per-architecture entry encoding
//! comes in through [`PageTableFormat`]. Table memory is pulled from a
//! [`FrameSource`] and reached through the identity mapping, so a table's
//! physical address doubles as its pointer. 48-bit virtual addresses, 9 bits
//! of index per level, 4 KiB leaves.

use core::marker::PhantomData;

use crate::arch_impl::traits::{MapFlags, PageTableFormat};
use crate::memory::frame_allocator::FrameSource;
use crate::memory::PAGE_SIZE;

pub const ENTRIES_PER_TABLE: usize = 512;
const LEVELS: usize = 4;
const INDEX_MASK: u64 = 0x1FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapError {
    /// A table allocation failed mid-walk.
    OutOfMemory,
    /// An existing non-table entry blocks the path.
    Conflict,
}

fn level_shift(level: usize) -> u64 {
    // 39, 30, 21, 12.
    39 - 9 * level as u64
}

fn table_index(va: u64, level: usize) -> usize {
    ((va >> level_shift(level)) & INDEX_MASK) as usize
}

fn entry_ptr(table: u64, index: usize) -> *mut u64 {
    (table as usize as *mut u64).wrapping_add(index)
}

fn alloc_table(frames: &mut dyn FrameSource) -> Option<u64> {
    let page = frames.alloc_page()?;
    unsafe { core::ptr::write_bytes(page as usize as *mut u8, 0, PAGE_SIZE) };
    Some(page)
}

/// A page-table tree rooted in one PMM page.
pub struct AddressSpace<S: PageTableFormat> {
    root: u64,
    _format: PhantomData<S>,
}

impl<S: PageTableFormat> AddressSpace<S> {
    /// Allocate a zeroed root table.
    pub fn new(frames: &mut dyn FrameSource) -> Option<Self> {
        Some(Self {
            root: alloc_table(frames)?,
            _format: PhantomData,
        })
    }

    /// Physical address of the root, ready for the translation-base register.
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Install `va -> pa`. Both addresses are page-aligned downward; missing
    /// intermediate tables are grown on the way, and an existing leaf is
    /// overwritten (with its stale translation flushed).
    pub fn map(
        &mut self,
        va: u64,
        pa: u64,
        flags: MapFlags,
        frames: &mut dyn FrameSource,
    ) -> Result<(), MapError> {
        let va = va & !(PAGE_SIZE as u64 - 1);
        let pa = pa & !(PAGE_SIZE as u64 - 1);

        let mut table = self.root;
        for level in 0..LEVELS - 1 {
            let slot = entry_ptr(table, table_index(va, level));
            let entry = unsafe { slot.read() };
            table = if S::is_present(entry) {
                if !S::is_table(entry) {
                    return Err(MapError::Conflict);
                }
                S::entry_address(entry)
            } else {
                let next = alloc_table(frames).ok_or(MapError::OutOfMemory)?;
                unsafe { slot.write(S::table_descriptor(next)) };
                next
            };
        }

        let slot = entry_ptr(table, table_index(va, LEVELS - 1));
        let old = unsafe { slot.read() };
        unsafe { slot.write(S::leaf_descriptor(pa, flags)) };
        if S::is_present(old) {
            // A live translation changed underneath the TLB.
            S::flush_tlb_page(va);
        }
        Ok(())
    }

    /// Remove the leaf for `va`, tolerating holes anywhere on the path.
    pub fn unmap(&mut self, va: u64) {
        let va = va & !(PAGE_SIZE as u64 - 1);
        let mut table = self.root;
        for level in 0..LEVELS - 1 {
            let entry = unsafe { entry_ptr(table, table_index(va, level)).read() };
            if !S::is_table(entry) {
                return;
            }
            table = S::entry_address(entry);
        }
        let slot = entry_ptr(table, table_index(va, LEVELS - 1));
        if S::is_present(unsafe { slot.read() }) {
            unsafe { slot.write(0) };
            S::flush_tlb_page(va);
        }
    }

    /// Software walk: what the hardware would resolve `va` to, plus whether
    /// the leaf carries the device memory type.
    pub fn translate(&self, va: u64) -> Option<(u64, bool)> {
        let offset = va & (PAGE_SIZE as u64 - 1);
        let mut table = self.root;
        for level in 0..LEVELS - 1 {
            let entry = unsafe { entry_ptr(table, table_index(va, level)).read() };
            if !S::is_table(entry) {
                return None;
            }
            table = S::entry_address(entry);
        }
        let entry = unsafe { entry_ptr(table, table_index(va, LEVELS - 1)).read() };
        if !S::is_present(entry) {
            return None;
        }
        Some((S::entry_address(entry) + offset, S::is_device(entry)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch_impl::aarch64::paging::Aarch64PageTable;
    use crate::arch_impl::x86_64::paging::X86PageTable;
    use crate::memory::frame_allocator::BitmapFrameAllocator;
    use crate::memory::testutil::TestRegion;

    fn pmm(region: &TestRegion) -> BitmapFrameAllocator {
        let mut pmm = BitmapFrameAllocator::empty();
        unsafe { pmm.init(region.base(), region.end()).unwrap() };
        pmm
    }

    fn map_walk_roundtrip<S: PageTableFormat>() {
        let region = TestRegion::new(64);
        let mut frames = pmm(&region);
        let mut space = AddressSpace::<S>::new(&mut frames).unwrap();

        space
            .map(0x0900_0000, 0x0900_0000, MapFlags::DEVICE, &mut frames)
            .unwrap();
        let (pa, device) = space.translate(0x0900_0000).unwrap();
        assert_eq!(pa, 0x0900_0000);
        assert!(device);

        // Remap overwrites the leaf in place.
        space
            .map(0x0900_0000, 0x0900_1000, MapFlags::DEVICE, &mut frames)
            .unwrap();
        assert_eq!(space.translate(0x0900_0000).unwrap().0, 0x0900_1000);

        // Normal memory does not carry the device attribute, and the page
        // offset survives translation.
        space
            .map(0x4000_2000, 0x4000_2000, MapFlags::NORMAL, &mut frames)
            .unwrap();
        let (pa, device) = space.translate(0x4000_2abc).unwrap();
        assert_eq!(pa, 0x4000_2abc);
        assert!(!device);
    }

    #[test]
    fn map_walk_roundtrip_on_both_encodings() {
        map_walk_roundtrip::<Aarch64PageTable>();
        map_walk_roundtrip::<X86PageTable>();
    }

    fn unmap_clears_and_tolerates_holes<S: PageTableFormat>() {
        let region = TestRegion::new(64);
        let mut frames = pmm(&region);
        let mut space = AddressSpace::<S>::new(&mut frames).unwrap();

        space
            .map(0x4000_0000, 0x4000_0000, MapFlags::NORMAL, &mut frames)
            .unwrap();
        assert!(space.translate(0x4000_0000).is_some());
        space.unmap(0x4000_0000);
        assert!(space.translate(0x4000_0000).is_none());

        // Unmapping something that was never mapped is fine.
        space.unmap(0x7000_0000);
        space.unmap(0x4000_0000);
    }

    #[test]
    fn unmap_on_both_encodings() {
        unmap_clears_and_tolerates_holes::<Aarch64PageTable>();
        unmap_clears_and_tolerates_holes::<X86PageTable>();
    }

    #[test]
    fn neighbouring_pages_share_intermediate_tables() {
        let region = TestRegion::new(64);
        let mut frames = pmm(&region);
        let mut space = AddressSpace::<Aarch64PageTable>::new(&mut frames).unwrap();

        let before = frames.free_pages();
        space
            .map(0x4000_0000, 0x4000_0000, MapFlags::NORMAL, &mut frames)
            .unwrap();
        let after_first = frames.free_pages();
        // Three intermediate tables grown for the first page of a region.
        assert_eq!(before - after_first, 3);

        space
            .map(0x4000_1000, 0x4000_1000, MapFlags::NORMAL, &mut frames)
            .unwrap();
        // The second page reuses them all.
        assert_eq!(frames.free_pages(), after_first);
    }

    #[test]
    fn conflicting_entry_fails_the_walk() {
        let region = TestRegion::new(64);
        let mut frames = pmm(&region);
        let mut space = AddressSpace::<Aarch64PageTable>::new(&mut frames).unwrap();

        // Forge a block (non-table) entry at level 0 for this address.
        let index = ((0x4000_0000u64 >> 39) & 0x1FF) as usize;
        unsafe {
            ((space.root() as usize as *mut u64).add(index)).write(0x4000_0000 | 1);
        }
        assert_eq!(
            space.map(0x4000_0000, 0x4000_0000, MapFlags::NORMAL, &mut frames),
            Err(MapError::Conflict)
        );
    }

    #[test]
    fn table_exhaustion_reports_out_of_memory() {
        // Room for the bitmap, the root and one intermediate table only.
        let region = TestRegion::new(3);
        let mut frames = pmm(&region);
        let mut space = AddressSpace::<X86PageTable>::new(&mut frames).unwrap();
        assert_eq!(
            space.map(0x4000_0000, 0x4000_0000, MapFlags::NORMAL, &mut frames),
            Err(MapError::OutOfMemory)
        );
    }
}
