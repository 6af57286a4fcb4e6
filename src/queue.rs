//! In-memory job queues, one per supported domain.
//!
//! Queues hold point-in-time copies of watchers. They are volatile and are
//! lost on restart. A watcher id appears at most once per queue.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use opentelemetry::KeyValue;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::DomainRegistry;
use crate::error::{Error, Result};
use crate::model::Watcher;
use crate::telemetry::metrics;

/// What happened when a watcher was submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitResult {
    /// Appended to the back of the queue.
    Enqueued,
    /// The same watcher id was already waiting; nothing changed.
    AlreadyQueued,
}

/// Registry of named FIFO queues behind a single lock.
#[derive(Debug, Default)]
pub struct QueueManager {
    queues: Mutex<BTreeMap<String, VecDeque<Watcher>>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// One empty queue per registry entry.
    pub fn for_registry(registry: &DomainRegistry) -> Result<Self> {
        let manager = Self::new();
        for name in registry.queue_names() {
            debug!(queue = %name, "creating queue");
            manager.create_queue(&name)?;
        }
        Ok(manager)
    }

    /// Register an empty queue. Names are unique.
    pub fn create_queue(&self, name: &str) -> Result<()> {
        let mut queues = self.queues.lock();
        if queues.contains_key(name) {
            return Err(Error::AlreadyExists(format!("queue '{name}'")));
        }
        queues.insert(name.to_string(), VecDeque::new());
        drop(queues);

        record(name, "create");
        Ok(())
    }

    /// Append `watcher` unless an entry with the same id is already waiting.
    pub fn submit(&self, name: &str, watcher: Watcher) -> Result<SubmitResult> {
        let mut queues = self.queues.lock();
        let queue = queues.get_mut(name).ok_or_else(|| missing(name))?;

        let result = if queue.iter().any(|queued| queued.id == watcher.id) {
            SubmitResult::AlreadyQueued
        } else {
            queue.push_back(watcher);
            SubmitResult::Enqueued
        };
        drop(queues);

        record(
            name,
            match result {
                SubmitResult::Enqueued => "submit",
                SubmitResult::AlreadyQueued => "submit_duplicate",
            },
        );
        Ok(result)
    }

    /// Remove and return the front entry. `Ok(None)` means the queue exists
    /// but is empty.
    pub fn pop(&self, name: &str) -> Result<Option<Watcher>> {
        let watcher = self
            .queues
            .lock()
            .get_mut(name)
            .ok_or_else(|| missing(name))?
            .pop_front();

        record(name, if watcher.is_some() { "pop" } else { "pop_empty" });
        Ok(watcher)
    }

    /// Snapshot of the queue, front to back.
    pub fn peek(&self, name: &str) -> Result<Vec<Watcher>> {
        let queues = self.queues.lock();
        let queue = queues.get(name).ok_or_else(|| missing(name))?;
        Ok(queue.iter().cloned().collect())
    }

    pub fn len(&self, name: &str) -> Result<usize> {
        let queues = self.queues.lock();
        queues.get(name).map(VecDeque::len).ok_or_else(|| missing(name))
    }

    pub fn queue_names(&self) -> BTreeSet<String> {
        self.queues.lock().keys().cloned().collect()
    }
}

fn missing(name: &str) -> Error {
    Error::NotFound(format!("queue '{name}'"))
}

fn record(queue: &str, operation: &'static str) {
    metrics::queue_operations().add(
        1,
        &[
            KeyValue::new("queue", queue.to_string()),
            KeyValue::new("operation", operation),
        ],
    );
}
