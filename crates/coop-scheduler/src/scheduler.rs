use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::clock::{VirtualClock, VirtualTime, saturating_secs};
use crate::config::SchedulerConfig;
use crate::error::SchedulerError;
use crate::event::{EventName, EventRegistry};
use crate::suspend::{Sleep, WaitEvent};
use crate::task::{TaskError, TaskHandle, TaskId, TaskShared, TaskStatus, WorkItem};
use crate::timer::SleepRegistry;

/// A task's suspended execution state, type-erased
type Continuation = Pin<Box<dyn Future<Output = Result<(), TaskError>>>>;

/// Scheduler-side record of a live task
struct TaskRecord {
    shared: Rc<TaskShared>,
    /// `None` while the task is executing a run segment
    continuation: Option<Continuation>,
    /// Ticket of the sleep/event registration the task is parked on
    ticket: Option<u64>,
}

/// Outcome of a suspension point asking to park the current task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Registration {
    /// No task of this scheduler is running; the call is a no-op
    NoTask,
    /// The running task is registered and must yield
    Parked { task: TaskId, ticket: u64 },
    /// The running task was cancelled during this run segment
    Cancelled,
}

/// Snapshot of scheduler counters, for leak detection and diagnostics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub now: VirtualTime,
    /// Tasks that have not reached a terminal state
    pub live: usize,
    pub sleeping: usize,
    pub waiting: usize,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

struct Inner {
    config: SchedulerConfig,
    clock: VirtualClock,
    tasks: HashMap<TaskId, TaskRecord>,
    sleepers: SleepRegistry,
    waiters: EventRegistry,
    /// Tasks that went pending without registering, polled again on the next advance
    parked: Vec<TaskId>,
    current: Option<TaskId>,
    next_task_id: u64,
    next_ticket: u64,
    started: u64,
    completed: u64,
    failed: u64,
    cancelled: u64,
}

impl Inner {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            clock: VirtualClock::new(),
            tasks: HashMap::new(),
            sleepers: SleepRegistry::new(),
            waiters: EventRegistry::new(),
            parked: Vec::new(),
            current: None,
            next_task_id: 1,
            next_ticket: 0,
            started: 0,
            completed: 0,
            failed: 0,
            cancelled: 0,
        }
    }

    fn allocate_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    /// Drop whatever sleep/event registration `task` holds
    fn clear_registration(&mut self, task: TaskId) {
        let Some(record) = self.tasks.get_mut(&task) else {
            return;
        };
        if record.ticket.take().is_none() {
            return;
        }

        match record.shared.status() {
            TaskStatus::Sleeping { .. } => {
                self.sleepers.cancel(task);
            }
            TaskStatus::WaitingEvent { name } => {
                self.waiters.remove(&name, task);
            }
            _ => {}
        }
    }

    /// Pick the running task and hand out a fresh ticket for its next registration
    fn begin_suspend(&mut self) -> Result<(TaskId, u64), Registration> {
        let Some(task) = self.current else {
            return Err(Registration::NoTask);
        };
        let Some(record) = self.tasks.get(&task) else {
            return Err(Registration::Cancelled);
        };

        if record.ticket.is_some() {
            warn!(
                target: "scheduler",
                "Task {} registered a new suspension while still {}; dropping the old registration",
                task,
                record.shared.status()
            );
            self.clear_registration(task);
        }

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        Ok((task, ticket))
    }

    fn park(&mut self, task: TaskId, ticket: u64, status: TaskStatus) {
        if let Some(record) = self.tasks.get_mut(&task) {
            record.ticket = Some(ticket);
            record.shared.set_status(status);
        }
    }

    /// Release a finished task's record and publish its final status
    fn finish(&mut self, task: TaskId, status: TaskStatus) {
        // Already gone if it cancelled itself during the last segment
        let Some(record) = self.tasks.remove(&task) else {
            return;
        };

        match &status {
            TaskStatus::Done => {
                self.completed += 1;
                debug!(target: "scheduler", "Task {} finished", task);
            }
            TaskStatus::Failed(err) => {
                self.failed += 1;
                warn!(
                    target: "scheduler",
                    "Task {} ({}) failed: {}",
                    task,
                    record.shared.name().unwrap_or("unnamed"),
                    err
                );
            }
            _ => {}
        }

        record.shared.set_status(status);
    }
}

/// Cooperative task scheduler
///
/// Tasks are futures polled on the caller's thread. A task runs until it awaits
/// [`Scheduler::sleep`] or [`Scheduler::wait_event`], or until it finishes.
/// Sleepers are resumed by [`Scheduler::advance`], event waiters by
/// [`Scheduler::signal`]. Every entry point may be called re-entrantly from
/// inside a running task.
///
/// `Scheduler` is a cheap, clonable handle; tasks usually capture a clone to
/// reach the suspension points. Because of that, a scheduler dropped with live
/// tasks keeps them alive; call [`Scheduler::cancel_all`] when tearing down.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<Inner>>,
}

impl Scheduler {
    /// Create a scheduler with default configuration
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new(config))),
        }
    }

    pub fn config(&self) -> SchedulerConfig {
        self.inner.borrow().config
    }

    // ===== Task Lifecycle =====

    /// Start a task from a work item and run it until its first suspension
    ///
    /// Returns `None` without creating anything when `work` is absent. A task
    /// that finishes in its first segment is already terminal in the returned
    /// handle and holds no scheduler state.
    pub fn start<T: 'static>(&self, work: Option<WorkItem<T>>) -> Option<TaskHandle<T>> {
        let Some(work) = work else {
            debug!(target: "scheduler", "start called without a work item, ignoring");
            return None;
        };
        Some(self.start_work(work))
    }

    /// Start a task from a closure
    pub fn spawn<T, F, Fut>(&self, f: F) -> TaskHandle<T>
    where
        T: 'static,
        F: FnOnce() -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
    {
        self.start_work(WorkItem::new(f))
    }

    fn start_work<T: 'static>(&self, work: WorkItem<T>) -> TaskHandle<T> {
        let (name, future) = work.into_parts();
        let output = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&output);

        let continuation: Continuation = Box::pin(async move {
            match future.await {
                Ok(value) => {
                    *slot.borrow_mut() = Some(value);
                    Ok(())
                }
                Err(err) => Err(TaskError::Failed(format!("{:#}", err))),
            }
        });

        let shared = Rc::new(TaskShared::new(name));
        let id = {
            let mut inner = self.inner.borrow_mut();
            let id = inner.allocate_id();
            inner.tasks.insert(
                id,
                TaskRecord {
                    shared: Rc::clone(&shared),
                    continuation: Some(continuation),
                    ticket: None,
                },
            );
            inner.started += 1;
            id
        };

        debug!(
            target: "scheduler",
            "Started task {} ({})",
            id,
            shared.name().unwrap_or("unnamed")
        );

        self.resume(id);
        TaskHandle::new(id, shared, output)
    }

    /// Cancel a live task
    ///
    /// The task's registration is removed and its continuation dropped without
    /// being resumed. A task cancelling itself stops at its next suspension
    /// point. Returns `false` for finished or unknown tasks.
    pub fn cancel(&self, task: TaskId) -> bool {
        let continuation = {
            let mut inner = self.inner.borrow_mut();
            inner.clear_registration(task);
            inner.parked.retain(|parked| *parked != task);

            let Some(mut record) = inner.tasks.remove(&task) else {
                return false;
            };
            inner.cancelled += 1;
            record.shared.set_status(TaskStatus::Cancelled);
            record.continuation.take()
        };

        debug!(target: "scheduler", "Cancelled task {}", task);
        // Dropped outside the borrow: suspension futures deregister on drop
        drop(continuation);
        true
    }

    /// Cancel every live task, returning how many were cancelled
    pub fn cancel_all(&self) -> usize {
        let mut ids: Vec<TaskId> = self.inner.borrow().tasks.keys().copied().collect();
        ids.sort();
        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    // ===== Suspension Points =====

    /// Suspend the running task for `duration` of virtual time
    ///
    /// Awaited outside any task of this scheduler it completes immediately.
    pub fn sleep(&self, duration: Duration) -> Sleep {
        Sleep::new(self.clone(), duration)
    }

    /// Like [`Scheduler::sleep`], taking seconds
    ///
    /// Negative and NaN values sleep zero. `+inf` and values too large for a
    /// `Duration` sleep forever.
    pub fn sleep_secs(&self, secs: f64) -> Sleep {
        self.sleep(saturating_secs(secs))
    }

    /// Suspend the running task until `name` is signaled
    ///
    /// Awaited outside any task of this scheduler it completes immediately.
    pub fn wait_event(&self, name: impl Into<EventName>) -> WaitEvent {
        WaitEvent::new(self.clone(), name.into())
    }

    pub(crate) fn register_sleep(&self, duration: Duration) -> Registration {
        let mut inner = self.inner.borrow_mut();
        let (task, ticket) = match inner.begin_suspend() {
            Ok(parked) => parked,
            Err(registration) => return registration,
        };

        let wake_at = inner.clock.now().saturating_add(duration);
        inner.sleepers.schedule(task, wake_at, ticket);
        inner.park(task, ticket, TaskStatus::Sleeping { wake_at });
        trace!(target: "scheduler", "Task {} sleeping until {}", task, wake_at);

        Registration::Parked { task, ticket }
    }

    pub(crate) fn register_wait(&self, name: &EventName) -> Registration {
        let mut inner = self.inner.borrow_mut();
        let (task, ticket) = match inner.begin_suspend() {
            Ok(parked) => parked,
            Err(registration) => return registration,
        };

        inner.waiters.register(name.clone(), task, ticket);
        inner.park(task, ticket, TaskStatus::WaitingEvent { name: name.clone() });
        trace!(target: "scheduler", "Task {} waiting for '{}'", task, name);

        Registration::Parked { task, ticket }
    }

    /// Check if `task` is still parked on the registration identified by `ticket`
    pub(crate) fn holds_registration(&self, task: TaskId, ticket: u64) -> bool {
        self.inner
            .borrow()
            .tasks
            .get(&task)
            .is_some_and(|record| record.ticket == Some(ticket))
    }

    /// Drop a registration whose suspension future went away before being resumed
    pub(crate) fn release_registration(&self, task: TaskId, ticket: u64) {
        let Ok(mut inner) = self.inner.try_borrow_mut() else {
            return;
        };
        let held = inner
            .tasks
            .get(&task)
            .is_some_and(|record| record.ticket == Some(ticket));
        if held {
            inner.clear_registration(task);
        }
    }

    // ===== Driving =====

    /// Move virtual time forward by `dt` and resume every sleeper that became due
    ///
    /// Due sleepers resume in ascending wake time, ties in the order they went to
    /// sleep. Returns the number of tasks resumed.
    pub fn advance(&self, dt: Duration) -> usize {
        let (now, parked, due) = {
            let mut inner = self.inner.borrow_mut();
            let now = inner.clock.advance(dt);
            let parked = std::mem::take(&mut inner.parked);
            let boundary = inner.config.wake_boundary;
            let due = inner.sleepers.tick(now, boundary);
            (now, parked, due)
        };

        let mut resumed = 0;

        for task in parked {
            if self.resume_parked(task) {
                resumed += 1;
            }
        }

        for sleeper in due {
            if self.wake(sleeper.task, sleeper.ticket) {
                resumed += 1;
            }
        }

        if resumed > 0 {
            debug!(target: "scheduler", "Advanced to {}, resumed {} task(s)", now, resumed);
        } else {
            trace!(target: "scheduler", "Advanced to {}", now);
        }

        resumed
    }

    /// Advance by a step in seconds as reported by an engine
    ///
    /// Negative steps follow the configured `StepPolicy`; non-finite steps are rejected.
    pub fn advance_secs(&self, secs: f64) -> Result<usize, SchedulerError> {
        let dt = self.config().negative_step.step_from_secs(secs)?;
        Ok(self.advance(dt))
    }

    /// Resume every task waiting on `name`, in registration order
    ///
    /// The waiter list is detached before anything is resumed, so tasks that wait
    /// on `name` again during the drain land on a new list. Returns the number of
    /// tasks resumed; signaling a name nobody waits on does nothing.
    pub fn signal(&self, name: impl Into<EventName>) -> usize {
        let name = name.into();
        let waiters = self.inner.borrow_mut().waiters.take(&name);

        let Some(waiters) = waiters else {
            trace!(target: "scheduler", "Signal '{}' has no waiters", name);
            return 0;
        };

        debug!(target: "scheduler", "Signal '{}' draining {} waiter(s)", name, waiters.len());

        waiters
            .into_iter()
            .filter(|waiter| self.wake(waiter.task, waiter.ticket))
            .count()
    }

    /// Resume a task taken out of a registry, unless it moved on since
    fn wake(&self, task: TaskId, ticket: u64) -> bool {
        if !self.holds_registration(task, ticket) {
            trace!(target: "scheduler", "Skipping stale wake for task {}", task);
            return false;
        }
        self.resume(task);
        true
    }

    fn resume_parked(&self, task: TaskId) -> bool {
        let runnable = self.inner.borrow().tasks.get(&task).is_some_and(|record| {
            record.ticket.is_none()
                && record.continuation.is_some()
                && record.shared.status() == TaskStatus::Ready
        });
        if runnable {
            self.resume(task);
        }
        runnable
    }

    /// Run one segment of `task`, until it suspends or terminates
    fn resume(&self, task: TaskId) {
        let (mut continuation, previous) = {
            let mut inner = self.inner.borrow_mut();
            let Some(record) = inner.tasks.get_mut(&task) else {
                return;
            };
            let Some(continuation) = record.continuation.take() else {
                warn!(target: "scheduler", "Task {} is already running, not resuming", task);
                return;
            };
            record.ticket = None;
            record.shared.set_status(TaskStatus::Running);
            let previous = inner.current.replace(task);
            (continuation, previous)
        };

        trace!(target: "scheduler", "Resuming task {}", task);

        let mut cx = Context::from_waker(Waker::noop());
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| continuation.as_mut().poll(&mut cx)));

        let mut inner = self.inner.borrow_mut();
        inner.current = previous;

        match outcome {
            Ok(Poll::Pending) => {
                let Some(record) = inner.tasks.get_mut(&task) else {
                    // Cancelled itself during the segment
                    drop(inner);
                    drop(continuation);
                    return;
                };
                record.continuation = Some(continuation);
                if record.ticket.is_none() {
                    debug!(
                        target: "scheduler",
                        "Task {} yielded without a scheduler suspension, parking until next advance",
                        task
                    );
                    record.shared.set_status(TaskStatus::Ready);
                    inner.parked.push(task);
                }
            }
            Ok(Poll::Ready(Ok(()))) => {
                inner.finish(task, TaskStatus::Done);
                drop(inner);
                drop(continuation);
            }
            Ok(Poll::Ready(Err(err))) => {
                inner.finish(task, TaskStatus::Failed(err));
                drop(inner);
                drop(continuation);
            }
            Err(payload) => {
                inner.finish(task, TaskStatus::Failed(TaskError::from_panic(payload)));
                drop(inner);
                drop(continuation);
            }
        }
    }

    // ===== Introspection =====

    /// Current virtual time
    pub fn now(&self) -> VirtualTime {
        self.inner.borrow().clock.now()
    }

    /// Status of a live task; `None` once the task has finished
    pub fn status(&self, task: TaskId) -> Option<TaskStatus> {
        self.inner
            .borrow()
            .tasks
            .get(&task)
            .map(|record| record.shared.status())
    }

    /// Task whose segment is executing right now
    pub fn current_task(&self) -> Option<TaskId> {
        self.inner.borrow().current
    }

    pub fn live_tasks(&self) -> usize {
        self.inner.borrow().tasks.len()
    }

    pub fn sleeping_count(&self) -> usize {
        self.inner.borrow().sleepers.len()
    }

    /// Number of tasks waiting on `name`
    pub fn waiting_count(&self, name: impl Into<EventName>) -> usize {
        self.inner.borrow().waiters.waiting_on(&name.into())
    }

    /// Event names that currently have waiters, sorted
    pub fn pending_events(&self) -> Vec<EventName> {
        self.inner.borrow().waiters.event_names()
    }

    /// Earliest wake time among sleeping tasks
    pub fn next_wake(&self) -> Option<VirtualTime> {
        self.inner.borrow().sleepers.next_wake()
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = self.inner.borrow();
        SchedulerStats {
            now: inner.clock.now(),
            live: inner.tasks.len(),
            sleeping: inner.sleepers.len(),
            waiting: inner.waiters.len(),
            started: inner.started,
            completed: inner.completed,
            failed: inner.failed,
            cancelled: inner.cancelled,
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::WakeBoundary;
    use std::cell::Cell;

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_task_without_suspension_finishes_in_start() {
        let scheduler = Scheduler::new();
        let handle = scheduler.spawn(|| async { Ok(7) });

        assert_eq!(handle.status(), TaskStatus::Done);
        assert_eq!(handle.take_result(), Some(Ok(7)));
        assert_eq!(scheduler.live_tasks(), 0);
        assert_eq!(scheduler.status(handle.id()), None);
    }

    #[test]
    fn test_start_without_work_item() {
        let scheduler = Scheduler::new();
        let handle = scheduler.start::<()>(None);

        assert!(handle.is_none());
        assert_eq!(scheduler.stats(), SchedulerStats::default());
    }

    #[test]
    fn test_sleep_outside_task_is_noop() {
        let scheduler = Scheduler::new();
        let mut sleep = std::pin::pin!(scheduler.sleep(secs(5.0)));
        let mut cx = Context::from_waker(Waker::noop());

        assert_eq!(sleep.as_mut().poll(&mut cx), Poll::Ready(()));
        assert_eq!(scheduler.sleeping_count(), 0);
    }

    #[test]
    fn test_wait_event_outside_task_is_noop() {
        let scheduler = Scheduler::new();
        let mut wait = std::pin::pin!(scheduler.wait_event("go"));
        let mut cx = Context::from_waker(Waker::noop());

        assert_eq!(wait.as_mut().poll(&mut cx), Poll::Ready(()));
        assert_eq!(scheduler.waiting_count("go"), 0);
    }

    #[test]
    fn test_status_follows_lifecycle() {
        let scheduler = Scheduler::new();
        let s = scheduler.clone();
        let handle = scheduler.spawn(move || async move {
            s.sleep(secs(1.0)).await;
            s.wait_event("go").await;
            Ok(())
        });

        assert_eq!(
            handle.status(),
            TaskStatus::Sleeping {
                wake_at: VirtualTime::from_secs_f64(1.0)
            }
        );

        scheduler.advance(secs(1.5));
        assert_eq!(
            handle.status(),
            TaskStatus::WaitingEvent {
                name: EventName::from("go")
            }
        );
        assert_eq!(scheduler.sleeping_count(), 0);
        assert_eq!(scheduler.waiting_count("go"), 1);

        scheduler.signal("go");
        assert_eq!(handle.status(), TaskStatus::Done);
        assert_eq!(scheduler.stats().completed, 1);
    }

    #[test]
    fn test_current_task_is_set_during_segment() {
        let scheduler = Scheduler::new();
        let s = scheduler.clone();
        let seen = Rc::new(Cell::new(None));
        let seen_in_task = Rc::clone(&seen);

        let handle = scheduler.spawn(move || async move {
            seen_in_task.set(s.current_task());
            Ok(())
        });

        assert_eq!(seen.get(), Some(handle.id()));
        assert_eq!(scheduler.current_task(), None);
    }

    #[test]
    fn test_error_is_captured_with_context() {
        let scheduler = Scheduler::new();
        let handle = scheduler.spawn(|| async {
            Err::<u32, _>(anyhow::anyhow!("bad input").context("loading level"))
        });

        assert_eq!(
            handle.take_result(),
            Some(Err(TaskError::Failed("loading level: bad input".to_string())))
        );
        assert_eq!(scheduler.stats().failed, 1);
    }

    #[test]
    fn test_panic_is_captured() {
        let scheduler = Scheduler::new();
        let s = scheduler.clone();
        let handle: TaskHandle<()> = scheduler.spawn(move || async move {
            s.sleep(secs(0.1)).await;
            let exploded = true;
            if exploded {
                panic!("script exploded");
            }
            Ok(())
        });

        scheduler.advance(secs(0.2));
        assert_eq!(
            handle.status(),
            TaskStatus::Failed(TaskError::Panicked("script exploded".to_string()))
        );
        assert_eq!(scheduler.live_tasks(), 0);

        // Scheduler still usable
        let after = scheduler.spawn(|| async { Ok("fine") });
        assert_eq!(after.take_result(), Some(Ok("fine")));
    }

    #[test]
    fn test_cancel_sleeping_task() {
        let scheduler = Scheduler::new();
        let s = scheduler.clone();
        let resumed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&resumed);

        let handle = scheduler.spawn(move || async move {
            s.sleep(secs(1.0)).await;
            flag.set(true);
            Ok(())
        });

        assert!(scheduler.cancel(handle.id()));
        assert_eq!(scheduler.sleeping_count(), 0);
        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert_eq!(handle.take_result(), Some(Err(TaskError::Cancelled)));

        scheduler.advance(secs(5.0));
        assert!(!resumed.get());
        assert!(!scheduler.cancel(handle.id()));
    }

    #[test]
    fn test_cancel_waiting_task_keeps_other_waiters() {
        let scheduler = Scheduler::new();
        let mut handles = Vec::new();
        for _ in 0..3 {
            let s = scheduler.clone();
            handles.push(scheduler.spawn(move || async move {
                s.wait_event("go").await;
                Ok(())
            }));
        }

        scheduler.cancel(handles[1].id());
        assert_eq!(scheduler.waiting_count("go"), 2);
        assert_eq!(scheduler.signal("go"), 2);
        assert_eq!(handles[0].status(), TaskStatus::Done);
        assert_eq!(handles[1].status(), TaskStatus::Cancelled);
        assert_eq!(handles[2].status(), TaskStatus::Done);
    }

    #[test]
    fn test_cancel_during_drain_skips_later_waiter() {
        let scheduler = Scheduler::new();
        let victim_id = Rc::new(Cell::new(None));

        let s = scheduler.clone();
        let target = Rc::clone(&victim_id);
        scheduler.spawn(move || async move {
            s.wait_event("go").await;
            if let Some(id) = target.get() {
                s.cancel(id);
            }
            Ok(())
        });

        let s = scheduler.clone();
        let victim = scheduler.spawn(move || async move {
            s.wait_event("go").await;
            Ok(())
        });
        victim_id.set(Some(victim.id()));

        assert_eq!(scheduler.signal("go"), 1);
        assert_eq!(victim.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn test_task_cancelling_itself_stops_at_next_suspension() {
        let scheduler = Scheduler::new();
        let s = scheduler.clone();
        let reached = Rc::new(Cell::new(false));
        let flag = Rc::clone(&reached);

        let handle = scheduler.spawn(move || async move {
            if let Some(me) = s.current_task() {
                s.cancel(me);
            }
            s.sleep(secs(0.0)).await;
            flag.set(true);
            Ok(())
        });

        assert_eq!(handle.status(), TaskStatus::Cancelled);
        assert_eq!(scheduler.live_tasks(), 0);
        scheduler.advance(secs(1.0));
        assert!(!reached.get());
    }

    #[test]
    fn test_cancel_all() {
        let scheduler = Scheduler::new();
        for i in 0..4 {
            let s = scheduler.clone();
            scheduler.spawn(move || async move {
                if i % 2 == 0 {
                    s.sleep(secs(10.0)).await;
                } else {
                    s.wait_event("never").await;
                }
                Ok(())
            });
        }

        assert_eq!(scheduler.live_tasks(), 4);
        assert_eq!(scheduler.cancel_all(), 4);
        let stats = scheduler.stats();
        assert_eq!(stats.live, 0);
        assert_eq!(stats.sleeping, 0);
        assert_eq!(stats.waiting, 0);
        assert_eq!(stats.cancelled, 4);
    }

    #[test]
    fn test_inclusive_boundary_config() {
        let scheduler = Scheduler::with_config(SchedulerConfig {
            wake_boundary: WakeBoundary::Inclusive,
            ..SchedulerConfig::default()
        });
        let s = scheduler.clone();
        let handle = scheduler.spawn(move || async move {
            s.sleep(secs(1.0)).await;
            Ok(())
        });

        scheduler.advance(secs(1.0));
        assert_eq!(handle.status(), TaskStatus::Done);
    }

    #[test]
    fn test_advance_secs_rejects_non_finite() {
        let scheduler = Scheduler::new();
        assert!(scheduler.advance_secs(f64::INFINITY).is_err());
        assert_eq!(scheduler.advance_secs(-3.0), Ok(0));
        assert_eq!(scheduler.now(), VirtualTime::ZERO);
        assert_eq!(scheduler.advance_secs(0.5), Ok(0));
        assert_eq!(scheduler.now(), VirtualTime::from_secs_f64(0.5));
    }

    #[test]
    fn test_foreign_pending_task_is_retried_on_advance() {
        struct YieldOnce(bool);
        impl Future for YieldOnce {
            type Output = ();
            fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
                if self.0 {
                    Poll::Ready(())
                } else {
                    self.0 = true;
                    Poll::Pending
                }
            }
        }

        let scheduler = Scheduler::new();
        let handle = scheduler.spawn(|| async {
            YieldOnce(false).await;
            Ok(3)
        });

        assert_eq!(handle.status(), TaskStatus::Ready);
        assert_eq!(scheduler.live_tasks(), 1);

        assert_eq!(scheduler.advance(Duration::ZERO), 1);
        assert_eq!(handle.take_result(), Some(Ok(3)));
    }
}
