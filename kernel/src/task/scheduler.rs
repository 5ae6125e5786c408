//! Yuheng, the scheduler: priority bands with round-robin inside each band.
//!
//! The ready queue is a singly linked list of arena indices ordered by
//! descending priority, FIFO within a band. Picking the next task is O(1)
//! (the head, or idle when empty); enqueue and dequeue are O(n) walks.
//!
//! `prepare_switch` makes the scheduling decision and updates all states
//! under the scheduler lock; the register-level switch runs after the lock
//! is dropped, with IRQs still masked. The very first switch has no previous
//! context to save and takes a separate load-only path, so a live register
//! set is never written into a stale slot.

use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::task::{
    SchedPolicy, Task, TaskId, TaskState, DEFAULT_TIMESLICE, IDLE_TASK, MAX_TASKS, NICE_0_WEIGHT,
};
use crate::arch_impl::current::context::{self, CpuContext};
use crate::arch_impl::without_interrupts;
use crate::memory::heap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchDecision {
    /// First-switch bootstrap: load `next`, save nothing.
    First { next: TaskId },
    /// Steady state: save into `prev`, load `next`.
    Swap { prev: TaskId, next: TaskId },
}

pub struct Scheduler {
    tasks: [Task; MAX_TASKS],
    ready_head: Option<TaskId>,
    current: Option<TaskId>,
    started: bool,
    /// Monotonic tick clock; the only time source for accounting.
    clock: u64,
    next_pid: usize,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [Task::EMPTY; MAX_TASKS],
            ready_head: None,
            current: None,
            started: false,
            clock: 0,
            next_pid: 1,
        }
    }

    /// Install the idle task in slot 0 and make it current. The caller's
    /// context (the boot thread) runs as idle until the first real switch.
    pub fn init(&mut self, idle_entry: fn()) -> Result<(), &'static str> {
        self.setup_slot(IDLE_TASK, "idle", idle_entry, 0, 4096)?;
        self.tasks[IDLE_TASK].state = TaskState::Running;
        self.current = Some(IDLE_TASK);
        Ok(())
    }

    fn setup_slot(
        &mut self,
        slot: TaskId,
        name: &str,
        entry: fn(),
        priority: u8,
        stack_size: usize,
    ) -> Result<(), &'static str> {
        let stack = heap::kmalloc(stack_size).ok_or("task stack allocation failed")?;
        let task = &mut self.tasks[slot];
        *task = Task::EMPTY;
        task.pid = slot as u32;
        task.set_name(name);
        task.priority = priority;
        task.policy = SchedPolicy::RoundRobin;
        task.state = TaskState::Ready;
        task.time_slice = DEFAULT_TIMESLICE;
        task.weight = NICE_0_WEIGHT;
        task.kernel_stack = stack.as_ptr() as usize;
        task.kernel_stack_size = stack_size;
        context::setup_task_context(
            &mut task.context,
            task.kernel_stack + stack_size,
            entry,
        );
        Ok(())
    }

    /// Allocate a PCB and stack; the task is READY but not yet queued.
    pub fn create_task(
        &mut self,
        name: &str,
        entry: fn(),
        priority: u8,
        stack_size: usize,
    ) -> Option<TaskId> {
        if self.next_pid >= MAX_TASKS {
            log::error!("task table full ({} slots)", MAX_TASKS);
            return None;
        }
        let slot = self.next_pid;
        match self.setup_slot(slot, name, entry, priority, stack_size) {
            Ok(()) => {
                self.next_pid += 1;
                log::info!(
                    "task {} created (pid={}, priority={})",
                    self.tasks[slot].name(),
                    slot,
                    priority
                );
                Some(slot)
            }
            Err(err) => {
                log::error!("task {} not created: {}", name, err);
                None
            }
        }
    }

    /// Insert into the ready queue: descending priority, FIFO within a band.
    /// Idle is the implicit fallback and never enters the queue.
    pub fn enqueue(&mut self, id: TaskId) {
        if id == IDLE_TASK || id >= MAX_TASKS {
            return;
        }
        if self.tasks[id].state == TaskState::Unused || self.in_ready_queue(id) {
            return;
        }
        self.tasks[id].state = TaskState::Ready;

        match self.ready_head {
            None => {
                self.tasks[id].next = None;
                self.ready_head = Some(id);
            }
            Some(head) if self.tasks[id].priority > self.tasks[head].priority => {
                self.tasks[id].next = Some(head);
                self.ready_head = Some(id);
            }
            Some(head) => {
                // Walk past every peer of equal or higher priority.
                let mut cursor = head;
                while let Some(next) = self.tasks[cursor].next {
                    if self.tasks[next].priority < self.tasks[id].priority {
                        break;
                    }
                    cursor = next;
                }
                self.tasks[id].next = self.tasks[cursor].next;
                self.tasks[cursor].next = Some(id);
            }
        }
    }

    fn in_ready_queue(&self, id: TaskId) -> bool {
        let mut cursor = self.ready_head;
        while let Some(current) = cursor {
            if current == id {
                return true;
            }
            cursor = self.tasks[current].next;
        }
        false
    }

    pub fn dequeue(&mut self, id: TaskId) {
        match self.ready_head {
            Some(head) if head == id => {
                self.ready_head = self.tasks[id].next;
            }
            Some(head) => {
                let mut cursor = head;
                while let Some(next) = self.tasks[cursor].next {
                    if next == id {
                        self.tasks[cursor].next = self.tasks[id].next;
                        break;
                    }
                    cursor = next;
                }
            }
            None => {}
        }
        self.tasks[id].next = None;
    }

    /// Head of the queue, or idle when nothing is ready.
    pub fn pick_next(&self) -> TaskId {
        self.ready_head.unwrap_or(IDLE_TASK)
    }

    /// One timer tick of accounting for the running task.
    pub fn tick(&mut self) {
        self.clock += 1;
        let Some(current) = self.current else { return };
        if current == IDLE_TASK {
            return;
        }
        {
            let task = &mut self.tasks[current];
            task.total_runtime += 1;
            if task.policy == SchedPolicy::RoundRobin && task.time_slice > 0 {
                task.time_slice -= 1;
            }
        }
        self.update_curr_runtime(current, 1);
    }

    /// Map a 0-9 priority onto a load weight. Placeholder until the
    /// fair-share path is enabled.
    pub fn priority_to_weight(_priority: u8) -> u32 {
        NICE_0_WEIGHT
    }

    /// Advance the running task's accounted and virtual runtime. vruntime
    /// still moves linearly; the weight scaling
    /// (`delta * NICE_0_WEIGHT / weight`) lands with the fair-share policy.
    fn update_curr_runtime(&mut self, id: TaskId, delta: u64) {
        if id == IDLE_TASK {
            return;
        }
        let task = &mut self.tasks[id];
        task.sum_exec_runtime += delta;
        task.vruntime += delta;
    }

    /// Fair-share preemption test (`next.vruntime + threshold <
    /// curr.vruntime`); not yet consulted by `prepare_switch`.
    pub fn check_preempt_curr(&self, _curr: TaskId, _next: TaskId) -> bool {
        false
    }

    /// Decide the next switch and update every task state accordingly.
    /// Returns `None` when nothing changes hands.
    pub fn prepare_switch(&mut self) -> Option<SwitchDecision> {
        let current = self.current?;

        if !self.started {
            return self.first_switch();
        }

        let next = self.pick_next();
        if next == current {
            return None;
        }

        if self.tasks[current].state == TaskState::Running {
            self.tasks[current].state = TaskState::Ready;
            if current != IDLE_TASK {
                if self.tasks[current].time_slice == 0 {
                    self.tasks[current].time_slice = DEFAULT_TIMESLICE;
                }
                self.enqueue(current);
            }
        }

        if next != IDLE_TASK {
            self.dequeue(next);
        }
        self.run(next);
        Some(SwitchDecision::Swap { prev: current, next })
    }

    /// First-switch bootstrap: there is no coherent previous register set,
    /// so the boot context is abandoned, never saved.
    fn first_switch(&mut self) -> Option<SwitchDecision> {
        self.started = true;
        let next = self.pick_next();
        if next == IDLE_TASK {
            // Nothing ready yet; the boot context keeps running as idle.
            return None;
        }
        if let Some(current) = self.current {
            if self.tasks[current].state == TaskState::Running {
                self.tasks[current].state = TaskState::Ready;
            }
        }
        self.dequeue(next);
        self.run(next);
        log::info!(
            "first switch to {} (pid={})",
            self.tasks[next].name(),
            next
        );
        Some(SwitchDecision::First { next })
    }

    fn run(&mut self, next: TaskId) {
        self.tasks[next].state = TaskState::Running;
        self.tasks[next].switches += 1;
        self.tasks[next].exec_start = self.clock;
        self.current = Some(next);
    }

    /// Zombify the running task and release its stack. The caller must
    /// reschedule; the zombie is never picked again.
    pub fn exit_current(&mut self) -> Option<TaskId> {
        let current = self.current?;
        if current == IDLE_TASK {
            return None;
        }
        let task = &mut self.tasks[current];
        task.state = TaskState::Zombie;
        let stack = task.kernel_stack;
        task.kernel_stack = 0;
        task.kernel_stack_size = 0;
        if stack != 0 {
            heap::kfree(stack as *mut u8);
        }
        Some(current)
    }

    pub fn context_ptr(&mut self, id: TaskId) -> *mut CpuContext {
        &mut self.tasks[id].context as *mut CpuContext
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn started(&self) -> bool {
        self.started
    }

    pub fn task(&self, id: TaskId) -> &Task {
        &self.tasks[id]
    }

    /// Slots handed out so far, idle included.
    pub fn task_count(&self) -> usize {
        self.next_pid
    }
}

static SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());
static NEED_RESCHED: AtomicBool = AtomicBool::new(false);

/// Bring Yuheng up: idle task in slot 0, boot context becomes the current
/// task. Requires a live heap.
pub fn init() {
    without_interrupts(|| SCHEDULER.lock().init(idle_task_entry))
        .expect("scheduler bring-up needs a working heap");
    log::info!("Yuheng scheduler initialized");
}

/// Idle: wait for the next interrupt, forever. Runs only when the ready
/// queue is empty.
fn idle_task_entry() {
    loop {
        crate::arch_impl::current::cpu::wait_for_interrupt();
    }
}

pub fn task_create(name: &str, entry: fn(), priority: u8, stack_size: usize) -> Option<TaskId> {
    without_interrupts(|| SCHEDULER.lock().create_task(name, entry, priority, stack_size))
}

pub fn task_ready(id: TaskId) {
    without_interrupts(|| SCHEDULER.lock().enqueue(id));
}

/// Timer-driven accounting; strictly precedes any `schedule` for this tick.
pub fn scheduler_tick() {
    without_interrupts(|| SCHEDULER.lock().tick());
}

pub fn scheduler_clock() -> u64 {
    without_interrupts(|| SCHEDULER.lock().clock())
}

pub fn current_pid() -> Option<u32> {
    without_interrupts(|| {
        let sched = SCHEDULER.lock();
        sched.current().map(|id| sched.task(id).pid)
    })
}

pub fn set_need_resched() {
    NEED_RESCHED.store(true, Ordering::Relaxed);
}

/// Deferred-preemption check, run on the IRQ path after end-of-interrupt.
pub fn preempt_point() {
    if NEED_RESCHED.swap(false, Ordering::Relaxed) {
        schedule();
    }
}

/// Pick the next task and switch to it. The decision happens under the
/// scheduler lock; the register switch happens after it is dropped, with
/// IRQs masked throughout.
pub fn schedule() {
    without_interrupts(|| {
        let decision = SCHEDULER.lock().prepare_switch();
        match decision {
            None => {}
            Some(SwitchDecision::First { next }) => {
                let next_ctx = SCHEDULER.lock().context_ptr(next);
                unsafe { context::switch_to_first(next_ctx) }
            }
            Some(SwitchDecision::Swap { prev, next }) => {
                let (prev_ctx, next_ctx) = {
                    let mut sched = SCHEDULER.lock();
                    (sched.context_ptr(prev), sched.context_ptr(next))
                };
                unsafe { context::switch_context(prev_ctx, next_ctx) }
            }
        }
    })
}

pub fn task_yield() {
    schedule();
}

/// Terminate the running task: state to ZOMBIE, stack freed, reschedule.
/// Reached by explicit call or by falling off the end of the task body
/// (the entry trampoline lands here). Never returns.
pub extern "C" fn task_exit() -> ! {
    without_interrupts(|| {
        if let Some(id) = SCHEDULER.lock().exit_current() {
            log::info!("task pid={} exited", id);
        }
    });
    schedule();
    // A zombie is never rescheduled; spinning here means the switch failed.
    loop {
        crate::arch_impl::current::cpu::wait_for_interrupt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::PAGE_SIZE;
    use std::sync::Once;

    /// The global heap backs task stacks; give it a leaked region once.
    fn heap_for_tests() {
        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let pages = 512;
            let layout = std::alloc::Layout::from_size_align(pages * PAGE_SIZE, PAGE_SIZE).unwrap();
            let base = unsafe { std::alloc::alloc_zeroed(layout) } as usize;
            assert_ne!(base, 0);
            unsafe { heap::init(base, pages * PAGE_SIZE) };
        });
    }

    fn noop() {}

    fn fresh() -> Scheduler {
        heap_for_tests();
        let mut sched = Scheduler::new();
        sched.init(noop).unwrap();
        sched
    }

    fn ready_priorities(sched: &Scheduler) -> Vec<(TaskId, u8)> {
        let mut out = Vec::new();
        let mut cursor = sched.ready_head;
        while let Some(id) = cursor {
            out.push((id, sched.task(id).priority));
            cursor = sched.task(id).next;
        }
        out
    }

    fn running_count(sched: &Scheduler) -> usize {
        (0..sched.task_count())
            .filter(|&id| sched.task(id).state == TaskState::Running)
            .count()
    }

    #[test]
    fn queue_is_descending_with_fifo_bands() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 3, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        let c = sched.create_task("c", noop, 5, 2048).unwrap();
        let d = sched.create_task("d", noop, 1, 2048).unwrap();
        let e = sched.create_task("e", noop, 9, 2048).unwrap();
        for id in [a, b, c, d, e] {
            sched.enqueue(id);
        }

        let queue = ready_priorities(&sched);
        assert_eq!(queue, vec![(e, 9), (b, 5), (c, 5), (a, 3), (d, 1)]);

        // Priorities never increase head to tail.
        assert!(queue.windows(2).all(|w| w[0].1 >= w[1].1));

        // Enqueue is idempotent: a task sits in the queue at most once.
        sched.enqueue(b);
        assert_eq!(ready_priorities(&sched).len(), 5);
    }

    #[test]
    fn idle_never_enters_the_queue() {
        let mut sched = fresh();
        sched.enqueue(IDLE_TASK);
        assert!(sched.ready_head.is_none());

        // With an empty queue, idle is what gets picked.
        assert_eq!(sched.pick_next(), IDLE_TASK);
    }

    #[test]
    fn first_switch_runs_once_then_general_path() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        sched.enqueue(b);

        assert!(!sched.started());
        match sched.prepare_switch() {
            Some(SwitchDecision::First { next }) => assert_eq!(next, a),
            other => panic!("expected first-switch bootstrap, got {:?}", other),
        }
        assert!(sched.started());
        assert_eq!(running_count(&sched), 1);

        // Every later decision takes the save-and-load path.
        match sched.prepare_switch() {
            Some(SwitchDecision::Swap { prev, next }) => {
                assert_eq!(prev, a);
                assert_eq!(next, b);
            }
            other => panic!("expected a swap, got {:?}", other),
        }
        assert_eq!(running_count(&sched), 1);
    }

    #[test]
    fn empty_queue_bootstrap_leaves_boot_context_running() {
        let mut sched = fresh();
        assert_eq!(sched.prepare_switch(), None);
        assert!(sched.started());
        // A task arriving afterwards is reached through the general path.
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        assert_eq!(
            sched.prepare_switch(),
            Some(SwitchDecision::Swap { prev: IDLE_TASK, next: a })
        );
    }

    #[test]
    fn round_robin_preemption_accounting() {
        // Three round-robin tasks at priorities 5, 5, 3: the two 5s split
        // the CPU, the 3 starves until they are done.
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        let c = sched.create_task("c", noop, 3, 2048).unwrap();
        for id in [a, b, c] {
            sched.enqueue(id);
        }
        sched.prepare_switch(); // bootstrap into a

        for tick in 1..=100u64 {
            sched.tick();
            if tick % 10 == 0 {
                sched.prepare_switch();
            }
            assert_eq!(running_count(&sched), 1);
        }

        assert_eq!(sched.clock(), 100);
        assert!(sched.task(a).total_runtime >= 40);
        assert!(sched.task(b).total_runtime >= 40);
        assert!(sched.task(c).total_runtime <= 20);
        // The accounting mirrors into the fair-share fields.
        assert_eq!(sched.task(a).sum_exec_runtime, sched.task(a).total_runtime);
        assert_eq!(sched.task(a).vruntime, sched.task(a).total_runtime);
    }

    #[test]
    fn expired_slice_is_recharged_on_requeue() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        sched.enqueue(b);
        sched.prepare_switch();

        for _ in 0..DEFAULT_TIMESLICE {
            sched.tick();
        }
        assert_eq!(sched.task(a).time_slice, 0);
        sched.prepare_switch();
        assert_eq!(sched.task(a).state, TaskState::Ready);
        assert_eq!(sched.task(a).time_slice, DEFAULT_TIMESLICE);
        assert_eq!(sched.task(b).state, TaskState::Running);
    }

    #[test]
    fn yield_keeps_remaining_slice() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        sched.enqueue(b);
        sched.prepare_switch();

        sched.tick();
        sched.tick();
        // Voluntary yield: a goes back with 8 ticks left, b takes over.
        sched.prepare_switch();
        assert_eq!(sched.task(a).time_slice, DEFAULT_TIMESLICE - 2);
        assert_eq!(sched.current(), Some(b));
    }

    #[test]
    fn exited_task_is_never_requeued() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        let b = sched.create_task("b", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        sched.enqueue(b);
        sched.prepare_switch();

        assert_eq!(sched.exit_current(), Some(a));
        assert_eq!(sched.task(a).state, TaskState::Zombie);
        assert_eq!(sched.task(a).kernel_stack, 0);

        match sched.prepare_switch() {
            Some(SwitchDecision::Swap { prev, next }) => {
                assert_eq!(prev, a);
                assert_eq!(next, b);
            }
            other => panic!("expected a swap, got {:?}", other),
        }
        // The zombie is gone from the queue for good.
        assert!(ready_priorities(&sched).iter().all(|&(id, _)| id != a));
    }

    #[test]
    fn idle_runs_exactly_when_queue_is_empty() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 5, 2048).unwrap();
        sched.enqueue(a);
        sched.prepare_switch();

        sched.exit_current();
        match sched.prepare_switch() {
            Some(SwitchDecision::Swap { prev, next }) => {
                assert_eq!(prev, a);
                assert_eq!(next, IDLE_TASK);
            }
            other => panic!("expected a swap to idle, got {:?}", other),
        }
        assert_eq!(running_count(&sched), 1);

        // New work preempts idle at the next decision point.
        let b = sched.create_task("b", noop, 2, 2048).unwrap();
        sched.enqueue(b);
        assert_eq!(
            sched.prepare_switch(),
            Some(SwitchDecision::Swap { prev: IDLE_TASK, next: b })
        );
    }

    #[test]
    fn fair_share_hooks_are_inert_for_now() {
        let mut sched = fresh();
        let a = sched.create_task("a", noop, 9, 2048).unwrap();
        let b = sched.create_task("b", noop, 1, 2048).unwrap();
        sched.enqueue(a);
        sched.enqueue(b);
        sched.prepare_switch();

        // Weights are flat and vruntime never forces a preemption yet.
        assert_eq!(Scheduler::priority_to_weight(0), NICE_0_WEIGHT);
        assert_eq!(Scheduler::priority_to_weight(9), NICE_0_WEIGHT);
        sched.tick();
        assert!(!sched.check_preempt_curr(a, b));
        assert_eq!(sched.task(a).weight, NICE_0_WEIGHT);
        assert_eq!(sched.task(a).vruntime, 1);
    }

    #[test]
    fn names_truncate_to_fifteen_bytes() {
        let mut sched = fresh();
        let id = sched
            .create_task("a-task-name-well-beyond-fifteen", noop, 4, 2048)
            .unwrap();
        assert_eq!(sched.task(id).name(), "a-task-name-wel");
    }

    #[test]
    fn creation_fails_when_the_table_is_full() {
        heap_for_tests();
        let mut sched = Scheduler::new();
        sched.init(noop).unwrap();
        let mut created = 0;
        while sched.create_task("filler", noop, 1, 64).is_some() {
            created += 1;
        }
        assert_eq!(created, MAX_TASKS - 1);
        assert!(sched.create_task("one-too-many", noop, 1, 64).is_none());
    }

    #[test]
    fn creation_fails_when_the_stack_cannot_be_allocated() {
        let mut sched = fresh();
        assert!(sched.create_task("hog", noop, 1, usize::MAX / 2).is_none());
    }
}
