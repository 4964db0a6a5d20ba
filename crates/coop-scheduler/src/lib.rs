//! Cooperative coroutine scheduler
//!
//! Tasks are plain futures started on a [`Scheduler`]. They suspend only by
//! awaiting [`Scheduler::sleep`] (resumed by [`Scheduler::advance`] once enough
//! virtual time has passed) or [`Scheduler::wait_event`] (resumed by
//! [`Scheduler::signal`]). A [`FrameDriver`] can own the per-frame tick and
//! accept signals from other threads.
//!
//! ```
//! use std::time::Duration;
//!
//! use coop_scheduler::Scheduler;
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheduler = Scheduler::new();
//! let s = scheduler.clone();
//! let handle = scheduler.spawn(move || async move {
//!     s.wait_event("go").await;
//!     s.sleep(Duration::from_secs(1)).await;
//!     Ok(42)
//! });
//!
//! scheduler.signal("go");
//! scheduler.advance(Duration::from_millis(1100));
//! assert_eq!(handle.take_result(), Some(Ok(42)));
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod scheduler;
pub mod suspend;
pub mod task;
pub mod timer;

pub use clock::{StepPolicy, VirtualClock, VirtualTime, WakeBoundary};
pub use config::{ConfigLoadError, CoopConfig, DriverConfig, SchedulerConfig};
pub use driver::{DriverCommand, DriverError, DriverHandle, DriverSummary, FrameDriver};
pub use error::SchedulerError;
pub use event::{EventName, EventRegistry};
pub use scheduler::{Scheduler, SchedulerStats};
pub use suspend::{Sleep, WaitEvent};
pub use task::{TaskError, TaskHandle, TaskId, TaskStatus, WorkItem};
pub use timer::SleepRegistry;
