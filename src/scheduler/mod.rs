//! Scheduler: periodic sweeps that queue stale watchers.

pub mod control;
pub mod submit;

pub use control::{Scheduler, SchedulerConfig, SchedulerState, SweepReport};
pub use submit::{HttpSubmitter, JobSubmitter, LocalSubmitter};
