//! Task control blocks.
//!
//! PCBs live in a fixed arena indexed by [`TaskId`]; the ready queue is
//! threaded through the `next` field as indices, never pointers. Slot 0 is
//! the idle task.

use crate::arch_impl::current::context::CpuContext;

pub const MAX_TASKS: usize = 256;
pub const TASK_NAME_LEN: usize = 16;
/// 10 ticks = 100 ms at 100 Hz.
pub const DEFAULT_TIMESLICE: u32 = 10;
/// Load weight of a nice-0 task; every task starts here until the
/// fair-share policy is switched on.
pub const NICE_0_WEIGHT: u32 = 1024;

pub type TaskId = usize;
pub const IDLE_TASK: TaskId = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Arena slot not in use.
    Unused,
    Running,
    Ready,
    /// Present in the model; no current transition enters it.
    Blocked,
    /// Present in the model; no current transition enters it.
    Sleeping,
    Zombie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedPolicy {
    Fifo,
    RoundRobin,
    Normal,
}

pub struct Task {
    pub pid: u32,
    pub name: [u8; TASK_NAME_LEN],

    pub priority: u8,
    pub policy: SchedPolicy,
    pub state: TaskState,
    /// Ticks left in the current quantum (round-robin only).
    pub time_slice: u32,
    pub total_runtime: u64,

    // Fair-share accounting: kept current, not yet consulted by pick_next.
    pub vruntime: u64,
    pub exec_start: u64,
    pub weight: u32,
    pub sum_exec_runtime: u64,

    pub context: CpuContext,

    /// Heap-allocated stack base; 0 once the task has exited.
    pub kernel_stack: usize,
    pub kernel_stack_size: usize,

    /// Ready-queue linkage.
    pub next: Option<TaskId>,
    pub switches: u64,
}

impl Task {
    pub const EMPTY: Task = Task {
        pid: 0,
        name: [0; TASK_NAME_LEN],
        priority: 0,
        policy: SchedPolicy::RoundRobin,
        state: TaskState::Unused,
        time_slice: 0,
        total_runtime: 0,
        vruntime: 0,
        exec_start: 0,
        weight: NICE_0_WEIGHT,
        sum_exec_runtime: 0,
        context: CpuContext::zeroed(),
        kernel_stack: 0,
        kernel_stack_size: 0,
        next: None,
        switches: 0,
    };

    /// Copy `name`, truncated to 15 bytes plus terminator.
    pub fn set_name(&mut self, name: &str) {
        self.name = [0; TASK_NAME_LEN];
        for (slot, byte) in self.name[..TASK_NAME_LEN - 1].iter_mut().zip(name.bytes()) {
            *slot = byte;
        }
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(TASK_NAME_LEN);
        core::str::from_utf8(&self.name[..len]).unwrap_or("<invalid>")
    }
}
