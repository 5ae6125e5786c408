//! Architecture-neutral IRQ dispatch.
//!
//! A fixed table maps IRQ numbers to handlers; the controller behind it is a
//! build-time choice ([`crate::arch_impl::current::Chip`]). Two entry shapes
//! exist: [`dispatch`] for acknowledge-driven controllers (the GIC reports
//! the active id) and [`dispatch_vectored`] for the 8259, where the CPU
//! vector already names the line.
//!
//! Ordering on both paths: acknowledge, handler, end-of-interrupt with the
//! acknowledged id, then the deferred reschedule check. Preemption therefore
//! happens after EOI, still with the CPU masked, so the controller is free
//! to deliver the next tick to whichever task wins.

use spin::Mutex;

use crate::arch_impl::current::Chip;
use crate::arch_impl::traits::InterruptChip;
use crate::arch_impl::without_interrupts;
use crate::task::scheduler;

pub type IrqHandler = fn();

/// Lines covered by the dispatch table. Sized for the GIC's full id space
/// on every target (8 KiB of statics); the 8259 pair never presents a line
/// past 15 and each chip enforces its own `MAX_IRQS` bound at the hardware.
pub const IRQ_LINES: usize = 1024;

pub struct IrqTable<const N: usize> {
    handlers: [Option<IrqHandler>; N],
}

impl<const N: usize> IrqTable<N> {
    pub const fn new() -> Self {
        Self { handlers: [None; N] }
    }

    /// Last write wins; out-of-range numbers are ignored.
    pub fn install(&mut self, irq: u32, handler: IrqHandler) {
        if let Some(slot) = self.handlers.get_mut(irq as usize) {
            *slot = Some(handler);
        }
    }

    pub fn uninstall(&mut self, irq: u32) {
        if let Some(slot) = self.handlers.get_mut(irq as usize) {
            *slot = None;
        }
    }

    pub fn handler(&self, irq: u32) -> Option<IrqHandler> {
        self.handlers.get(irq as usize).copied().flatten()
    }
}

static TABLE: Mutex<IrqTable<IRQ_LINES>> = Mutex::new(IrqTable::new());

/// Configure the controller: everything masked, pending state cleared.
pub fn init() {
    Chip::init();
    log::info!("interrupt controller up, {} lines", Chip::MAX_IRQS);
}

pub fn install(irq: u32, handler: IrqHandler) {
    without_interrupts(|| TABLE.lock().install(irq, handler));
}

pub fn uninstall(irq: u32) {
    without_interrupts(|| TABLE.lock().uninstall(irq));
}

pub fn enable(irq: u32) {
    Chip::enable_irq(irq);
}

pub fn disable(irq: u32) {
    Chip::disable_irq(irq);
}

pub fn set_priority(irq: u32, priority: u8) {
    Chip::set_priority(irq, priority);
}

fn invoke(irq: u32) {
    let handler = without_interrupts(|| TABLE.lock().handler(irq));
    match handler {
        Some(handler) => handler(),
        None => log::warn!("unhandled IRQ {}", irq),
    }
}

/// Acknowledge-driven entry, called from the architecture IRQ vector with
/// the CPU masked. A spurious acknowledge returns without handler or EOI.
pub fn dispatch<C: InterruptChip>() {
    let irq = match C::acknowledge() {
        Some(irq) => irq,
        None => return,
    };
    invoke(irq);
    C::end_of_interrupt(irq);
    scheduler::preempt_point();
}

/// Vectored entry: the interrupt vector already identifies `irq`.
pub fn dispatch_vectored<C: InterruptChip>(irq: u32) {
    if C::is_spurious(irq) {
        return;
    }
    invoke(irq);
    C::end_of_interrupt(irq);
    scheduler::preempt_point();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Mutex as StdMutex, MutexGuard};

    /// The dispatch table and mock-chip state are process globals; IRQ tests
    /// run one at a time.
    static TEST_LOCK: StdMutex<()> = StdMutex::new(());

    fn serialise() -> MutexGuard<'static, ()> {
        TEST_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Acknowledge(u32),
        Handler,
        Eoi(u32),
    }

    static EVENTS: StdMutex<Vec<Event>> = StdMutex::new(Vec::new());
    static PENDING: StdMutex<Option<u32>> = StdMutex::new(None);

    struct MockChip;

    impl InterruptChip for MockChip {
        const MAX_IRQS: usize = 1024;

        fn init() {}
        fn enable_irq(_irq: u32) {}
        fn disable_irq(_irq: u32) {}
        fn set_priority(_irq: u32, _priority: u8) {}

        fn acknowledge() -> Option<u32> {
            let irq = PENDING.lock().unwrap().take()?;
            // 1020..=1023 are the GIC's reserved/spurious ids.
            if irq >= 1020 {
                return None;
            }
            EVENTS.lock().unwrap().push(Event::Acknowledge(irq));
            Some(irq)
        }

        fn end_of_interrupt(irq: u32) {
            EVENTS.lock().unwrap().push(Event::Eoi(irq));
        }
    }

    fn deliver(irq: u32) {
        *PENDING.lock().unwrap() = Some(irq);
        dispatch::<MockChip>();
    }

    fn record_handler() {
        EVENTS.lock().unwrap().push(Event::Handler);
    }

    fn take_events() -> Vec<Event> {
        EVENTS.lock().unwrap().drain(..).collect()
    }

    #[test]
    fn acknowledge_handler_eoi_in_order() {
        let _guard = serialise();
        take_events();
        install(30, record_handler);

        deliver(30);
        assert_eq!(
            take_events(),
            vec![Event::Acknowledge(30), Event::Handler, Event::Eoi(30)]
        );
        uninstall(30);
    }

    #[test]
    fn spurious_ids_touch_nothing() {
        let _guard = serialise();
        take_events();
        install(30, record_handler);

        deliver(1023);
        assert_eq!(take_events(), vec![]);
        uninstall(30);
    }

    #[test]
    fn unknown_irq_still_gets_eoi() {
        let _guard = serialise();
        take_events();

        deliver(42);
        assert_eq!(take_events(), vec![Event::Acknowledge(42), Event::Eoi(42)]);
    }

    #[test]
    fn installation_is_last_write_wins() {
        let _guard = serialise();
        take_events();

        fn silent() {}
        install(31, silent);
        install(31, record_handler);
        deliver(31);
        assert_eq!(
            take_events(),
            vec![Event::Acknowledge(31), Event::Handler, Event::Eoi(31)]
        );

        uninstall(31);
        deliver(31);
        // Uninstalled: back to the unhandled path, which still EOIs.
        assert_eq!(take_events(), vec![Event::Acknowledge(31), Event::Eoi(31)]);
    }

    #[test]
    fn vectored_dispatch_names_the_line_itself() {
        let _guard = serialise();
        take_events();
        install(0, record_handler);

        dispatch_vectored::<MockChip>(0);
        assert_eq!(take_events(), vec![Event::Handler, Event::Eoi(0)]);
        uninstall(0);
    }

    #[test]
    fn out_of_range_installs_are_ignored() {
        let _guard = serialise();
        let mut table = IrqTable::<16>::new();
        table.install(99, record_handler);
        assert!(table.handler(99).is_none());
        assert!(table.handler(15).is_none());
    }
}
