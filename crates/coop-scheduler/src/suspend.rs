//! Suspension points awaited by tasks.
//!
//! The first poll registers the running task with the scheduler and yields.
//! The scheduler only polls the task again after removing that registration,
//! at which point the future completes.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::event::EventName;
use crate::scheduler::{Registration, Scheduler};
use crate::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    Registered { task: TaskId, ticket: u64 },
    /// The owning task was cancelled mid-segment; never completes
    Orphaned,
    Done,
}

impl State {
    fn from_registration(registration: Registration) -> (Self, Poll<()>) {
        match registration {
            Registration::NoTask => (State::Done, Poll::Ready(())),
            Registration::Parked { task, ticket } => {
                (State::Registered { task, ticket }, Poll::Pending)
            }
            Registration::Cancelled => (State::Orphaned, Poll::Pending),
        }
    }

    fn poll_registered(&mut self, scheduler: &Scheduler) -> Poll<()> {
        match *self {
            State::Registered { task, ticket } => {
                if scheduler.holds_registration(task, ticket) {
                    Poll::Pending
                } else {
                    *self = State::Done;
                    Poll::Ready(())
                }
            }
            State::Orphaned => Poll::Pending,
            State::Init | State::Done => Poll::Ready(()),
        }
    }

    fn release(&self, scheduler: &Scheduler) {
        if let State::Registered { task, ticket } = *self {
            scheduler.release_registration(task, ticket);
        }
    }
}

/// Future returned by [`Scheduler::sleep`]
#[must_use = "sleep does nothing unless awaited"]
#[derive(Debug)]
pub struct Sleep {
    scheduler: Scheduler,
    duration: Duration,
    state: State,
}

impl Sleep {
    pub(crate) fn new(scheduler: Scheduler, duration: Duration) -> Self {
        Self {
            scheduler,
            duration,
            state: State::Init,
        }
    }
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.state != State::Init {
            return this.state.poll_registered(&this.scheduler);
        }

        let (state, poll) =
            State::from_registration(this.scheduler.register_sleep(this.duration));
        this.state = state;
        poll
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.state.release(&self.scheduler);
    }
}

/// Future returned by [`Scheduler::wait_event`]
#[must_use = "wait_event does nothing unless awaited"]
#[derive(Debug)]
pub struct WaitEvent {
    scheduler: Scheduler,
    name: EventName,
    state: State,
}

impl WaitEvent {
    pub(crate) fn new(scheduler: Scheduler, name: EventName) -> Self {
        Self {
            scheduler,
            name,
            state: State::Init,
        }
    }
}

impl Future for WaitEvent {
    type Output = ();

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        if this.state != State::Init {
            return this.state.poll_registered(&this.scheduler);
        }

        let (state, poll) = State::from_registration(this.scheduler.register_wait(&this.name));
        this.state = state;
        poll
    }
}

impl Drop for WaitEvent {
    fn drop(&mut self) {
        self.state.release(&self.scheduler);
    }
}
