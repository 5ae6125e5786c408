//! Tick bookkeeping over the architecture timers.
//!
//! Both back-ends interrupt at [`TICK_HZ`] and route into [`tick`]; the
//! generic timer rearms itself in its handler, the PIT auto-reloads.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::task::scheduler;

pub const TICK_HZ: u64 = 100;
/// Forced reschedule period: 10 ticks = 100 ms.
pub const PREEMPT_TICKS: u64 = 10;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program the platform timer and hook it into the IRQ table.
pub fn init() {
    crate::arch_impl::current::timer::init();
}

/// One timer period has elapsed. Called from the timer IRQ handler.
///
/// Accounting runs before the preemption request, so the tick that causes a
/// switch is already charged to the outgoing task. The switch itself happens
/// on the dispatch path after end-of-interrupt.
pub fn tick() {
    let now = TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    scheduler::scheduler_tick();
    if now % TICK_HZ == 0 {
        log::debug!("tick {} ({} s uptime)", now, now / TICK_HZ);
    }
    if now % PREEMPT_TICKS == 0 {
        scheduler::set_need_resched();
    }
}

pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

pub fn uptime_ms() -> u64 {
    ticks() * 1000 / TICK_HZ
}

/// Busy wait. There is no sleep queue; callers burn the CPU knowingly.
pub fn sleep_ms(ms: u64) {
    #[cfg(all(target_arch = "aarch64", target_os = "none"))]
    crate::arch_impl::aarch64::timer::spin_wait_ms(ms);
    #[cfg(all(target_arch = "x86_64", target_os = "none"))]
    {
        let target = ticks() + ms * TICK_HZ / 1000;
        while ticks() < target {
            core::hint::spin_loop();
        }
    }
    #[cfg(not(target_os = "none"))]
    let _ = ms;
}
