//! Tasks and the Yuheng scheduler.

pub mod scheduler;
pub mod task;

pub use self::scheduler::{schedule, task_exit, task_yield};
pub use self::task::{SchedPolicy, Task, TaskId, TaskState, DEFAULT_TIMESLICE, MAX_TASKS};
