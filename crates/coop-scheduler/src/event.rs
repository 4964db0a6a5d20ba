use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::task::TaskId;

/// Name used to match `signal` calls with `wait_event` registrations
///
/// Cheap to clone and safe to send to the driver thread. Two names are equal
/// exactly when their strings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventName(Arc<str>);

impl EventName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventName {
    fn from(name: &str) -> Self {
        Self(Arc::from(name))
    }
}

impl From<String> for EventName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&EventName> for EventName {
    fn from(name: &EventName) -> Self {
        name.clone()
    }
}

/// A task registered on an event list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Waiter {
    pub task: TaskId,
    pub ticket: u64,
}

/// Tasks suspended until a named event is signaled, in registration order
#[derive(Debug, Default)]
pub struct EventRegistry {
    waiters: HashMap<EventName, Vec<Waiter>>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `task` to the waiter list for `name`
    pub fn register(&mut self, name: EventName, task: TaskId, ticket: u64) {
        self.waiters
            .entry(name)
            .or_default()
            .push(Waiter { task, ticket });
    }

    /// Detach and return the whole waiter list for `name`
    ///
    /// Registrations made after this call start a new list.
    pub fn take(&mut self, name: &EventName) -> Option<Vec<Waiter>> {
        self.waiters.remove(name)
    }

    /// Remove `task` from the list for `name`, dropping the list when it empties
    pub fn remove(&mut self, name: &EventName, task: TaskId) -> bool {
        let Some(list) = self.waiters.get_mut(name) else {
            return false;
        };

        let before = list.len();
        list.retain(|waiter| waiter.task != task);
        let removed = list.len() != before;

        if list.is_empty() {
            self.waiters.remove(name);
        }

        removed
    }

    /// Number of tasks waiting on `name`
    pub fn waiting_on(&self, name: &EventName) -> usize {
        self.waiters.get(name).map_or(0, Vec::len)
    }

    /// Number of tasks waiting on any event
    pub fn len(&self) -> usize {
        self.waiters.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Names that currently have at least one waiter
    pub fn event_names(&self) -> Vec<EventName> {
        let mut names: Vec<EventName> = self.waiters.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_name_equality_follows_string() {
        assert_eq!(EventName::from("go"), EventName::from(String::from("go")));
        assert_ne!(EventName::from("go"), EventName::from("Go"));
        assert_eq!(EventName::new("round_start").to_string(), "round_start");
    }

    #[test]
    fn test_take_returns_registration_order() {
        let mut registry = EventRegistry::new();
        let go = EventName::from("go");
        registry.register(go.clone(), TaskId::new(3), 0);
        registry.register(go.clone(), TaskId::new(1), 1);
        registry.register(EventName::from("other"), TaskId::new(2), 2);

        let waiters = registry.take(&go).unwrap();
        let tasks: Vec<TaskId> = waiters.iter().map(|w| w.task).collect();
        assert_eq!(tasks, vec![TaskId::new(3), TaskId::new(1)]);

        // List is gone, other events untouched
        assert!(registry.take(&go).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_after_take_starts_new_list() {
        let mut registry = EventRegistry::new();
        let go = EventName::from("go");
        registry.register(go.clone(), TaskId::new(1), 0);

        let drained = registry.take(&go).unwrap();
        registry.register(go.clone(), TaskId::new(1), 1);

        assert_eq!(drained.len(), 1);
        assert_eq!(registry.waiting_on(&go), 1);
        assert_eq!(registry.take(&go).unwrap()[0].ticket, 1);
    }

    #[test]
    fn test_remove_drops_empty_list() {
        let mut registry = EventRegistry::new();
        let go = EventName::from("go");
        registry.register(go.clone(), TaskId::new(1), 0);

        assert!(registry.remove(&go, TaskId::new(1)));
        assert!(!registry.remove(&go, TaskId::new(1)));
        assert!(registry.is_empty());
        assert!(registry.event_names().is_empty());
    }
}
