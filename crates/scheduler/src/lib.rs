//! 优先级任务调度器
//!
//! 每个派发周期最多推进一个任务；超时看门狗独立运行。

pub mod queue;
pub mod scheduler;

pub use queue::PriorityTaskQueue;
pub use scheduler::TaskScheduler;
