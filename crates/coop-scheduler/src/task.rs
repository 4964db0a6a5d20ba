use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use thiserror::Error;

use crate::clock::VirtualTime;
use crate::event::EventName;

/// Unique identifier for a task, never reused within one scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Why a task ended without producing a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The work item returned an error
    #[error("task failed: {0}")]
    Failed(String),
    /// The work item panicked during a run segment
    #[error("task panicked: {0}")]
    Panicked(String),
    /// The task was cancelled before it finished
    #[error("task was cancelled")]
    Cancelled,
}

impl TaskError {
    /// Build a `Panicked` error from a `catch_unwind` payload
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(message)
    }
}

/// Task lifecycle states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Created, or parked after suspending on something the scheduler doesn't own
    Ready,
    /// Currently executing a run segment
    Running,
    /// Suspended until the clock passes `wake_at`
    Sleeping { wake_at: VirtualTime },
    /// Suspended until `name` is signaled
    WaitingEvent { name: EventName },
    /// Finished successfully
    Done,
    /// Finished with an error or panic
    Failed(TaskError),
    /// Cancelled before finishing
    Cancelled,
}

impl TaskStatus {
    /// Check if the task will never run again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed(_) | TaskStatus::Cancelled
        )
    }

    /// Check if the task is parked in a sleep or event registry
    pub fn is_suspended(&self) -> bool {
        matches!(
            self,
            TaskStatus::Sleeping { .. } | TaskStatus::WaitingEvent { .. }
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Ready => write!(f, "ready"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Sleeping { wake_at } => write!(f, "sleeping until {}", wake_at),
            TaskStatus::WaitingEvent { name } => write!(f, "waiting for '{}'", name),
            TaskStatus::Done => write!(f, "done"),
            TaskStatus::Failed(err) => write!(f, "failed ({})", err),
            TaskStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Future produced by a work item
pub type TaskFuture<T> = Pin<Box<dyn Future<Output = anyhow::Result<T>>>>;

/// A zero-argument unit of work that can be started as a task
pub struct WorkItem<T> {
    name: Option<String>,
    make: Box<dyn FnOnce() -> TaskFuture<T>>,
}

impl<T: 'static> WorkItem<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        Self {
            name: None,
            make: Box::new(move || Box::pin(f())),
        }
    }

    /// Attach a name used in log output
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn into_parts(self) -> (Option<String>, TaskFuture<T>) {
        (self.name, (self.make)())
    }
}

impl<T> fmt::Debug for WorkItem<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkItem").field("name", &self.name).finish()
    }
}

/// State shared between a task's scheduler record and its handle
#[derive(Debug)]
pub(crate) struct TaskShared {
    name: Option<String>,
    status: RefCell<TaskStatus>,
}

impl TaskShared {
    pub(crate) fn new(name: Option<String>) -> Self {
        Self {
            name,
            status: RefCell::new(TaskStatus::Ready),
        }
    }

    pub(crate) fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub(crate) fn status(&self) -> TaskStatus {
        self.status.borrow().clone()
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        *self.status.borrow_mut() = status;
    }
}

/// Handle to a started task
///
/// The handle stays valid after the scheduler has released the task, so the
/// final status and output can be read at any time.
pub struct TaskHandle<T> {
    id: TaskId,
    shared: Rc<TaskShared>,
    output: Rc<RefCell<Option<T>>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(id: TaskId, shared: Rc<TaskShared>, output: Rc<RefCell<Option<T>>>) -> Self {
        Self { id, shared, output }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.shared.name()
    }

    pub fn status(&self) -> TaskStatus {
        self.shared.status()
    }

    pub fn is_finished(&self) -> bool {
        self.shared.status().is_terminal()
    }

    /// Take the task's outcome once it has finished
    ///
    /// Returns `None` while the task is still live, and for a successful task
    /// whose value was already taken.
    pub fn take_result(&self) -> Option<Result<T, TaskError>> {
        match self.shared.status() {
            TaskStatus::Done => self.output.borrow_mut().take().map(Ok),
            TaskStatus::Failed(err) => Some(Err(err)),
            TaskStatus::Cancelled => Some(Err(TaskError::Cancelled)),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("name", &self.shared.name())
            .field("status", &self.shared.status())
            .finish()
    }
}
