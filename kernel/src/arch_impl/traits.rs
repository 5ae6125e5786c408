//! Architecture-agnostic capability traits.
//!
//! These are the seams between the neutral core and the two back-ends. They
//! are selected at build time through [`crate::arch_impl::current`]; there is
//! no runtime dispatch.

/// Architecture-neutral mapping request flags.
///
/// `device` selects the uncached device memory type for MMIO leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFlags {
    pub write: bool,
    pub device: bool,
}

impl MapFlags {
    pub const NORMAL: Self = Self { write: true, device: false };
    pub const DEVICE: Self = Self { write: true, device: true };
    pub const READ_ONLY: Self = Self { write: false, device: false };
}

/// Page-table entry codec for one architecture.
///
/// Pure bit manipulation, compiled for every target, so the shared mapper in
/// [`crate::memory::paging`] can be exercised against both encodings on the
/// host. The TLB hooks are no-ops off-target.
pub trait PageTableFormat {
    /// Descriptor pointing at the next-level table.
    fn table_descriptor(pa: u64) -> u64;

    /// Level-3 leaf descriptor carrying permissions and the memory type.
    fn leaf_descriptor(pa: u64, flags: MapFlags) -> u64;

    fn is_present(entry: u64) -> bool;

    /// Meaningful at non-leaf levels only: does this entry point at a table?
    fn is_table(entry: u64) -> bool;

    fn entry_address(entry: u64) -> u64;

    /// Does this leaf carry the device memory type?
    fn is_device(entry: u64) -> bool;

    fn flush_tlb_page(va: u64);
    fn flush_tlb_all();
}

/// Interrupt controller capability set: GICv2 on aarch64, the cascaded 8259
/// pair on x86_64, and a mock in the dispatch tests.
pub trait InterruptChip {
    /// Number of IRQ lines the dispatch table covers.
    const MAX_IRQS: usize;

    /// Mask every line, clear pending state, set priorities, enable delivery.
    fn init();

    fn enable_irq(irq: u32);
    fn disable_irq(irq: u32);
    fn set_priority(irq: u32, priority: u8);

    /// Read and accept the highest-priority pending IRQ.
    ///
    /// `None` means the controller reported its spurious sentinel; no
    /// end-of-interrupt is owed. Vectored controllers (the 8259) learn the
    /// line from the vector instead and return `None` here.
    fn acknowledge() -> Option<u32>;

    /// Signal end-of-interrupt. Must receive the exact id `acknowledge`
    /// returned, after the handler has run.
    fn end_of_interrupt(irq: u32);

    /// Per-line spurious detection for vectored delivery.
    fn is_spurious(_irq: u32) -> bool {
        false
    }
}
