use std::collections::{BTreeMap, HashMap};

use crate::clock::{VirtualTime, WakeBoundary};
use crate::task::TaskId;

/// Key ordering sleepers by wake time, then by the order they went to sleep
type SleepKey = (VirtualTime, u64);

/// A sleeper that became due during `tick`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSleeper {
    pub task: TaskId,
    pub ticket: u64,
    pub wake_at: VirtualTime,
}

/// Tracks tasks suspended until a virtual wake time
///
/// Each task appears at most once. Scheduling a task that is already present
/// replaces its previous entry.
#[derive(Debug, Default)]
pub struct SleepRegistry {
    queue: BTreeMap<SleepKey, TaskId>,
    index: HashMap<TaskId, SleepKey>,
}

impl SleepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` to wake at `wake_at`
    ///
    /// `ticket` must increase with every call on the same registry so equal wake
    /// times come back out in scheduling order.
    pub fn schedule(&mut self, task: TaskId, wake_at: VirtualTime, ticket: u64) {
        self.cancel(task);
        let key = (wake_at, ticket);
        self.queue.insert(key, task);
        self.index.insert(task, key);
    }

    /// Remove a task's entry
    pub fn cancel(&mut self, task: TaskId) -> bool {
        match self.index.remove(&task) {
            Some(key) => {
                self.queue.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Remove and return every sleeper due at `now`, earliest first
    pub fn tick(&mut self, now: VirtualTime, boundary: WakeBoundary) -> Vec<DueSleeper> {
        let mut due = Vec::new();

        while let Some((&(wake_at, ticket), &task)) = self.queue.first_key_value() {
            if !boundary.is_due(wake_at, now) {
                break;
            }
            self.queue.pop_first();
            self.index.remove(&task);
            due.push(DueSleeper {
                task,
                ticket,
                wake_at,
            });
        }

        due
    }

    /// Earliest pending wake time
    pub fn next_wake(&self) -> Option<VirtualTime> {
        self.queue.keys().next().map(|(wake_at, _)| *wake_at)
    }

    /// Get the number of sleeping tasks
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
