use scrape_logging::{scrape_debug, scrape_error, scrape_info, scrape_warn};
use serde::{Deserialize, Serialize};

use crate::event::StatusPatch;
use crate::storage::{MemoryStorage, TaskRecord, TaskStorage};
use crate::task::{Task, TaskStatus};

/// Default number of tasks kept in history.
pub const DEFAULT_CAPACITY: usize = 10;

/// Which task leaves the history when it is over capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Drop the least recently upserted task.
    #[default]
    Oldest,
    /// Drop the least recently upserted finished task; pending and running
    /// tasks are only dropped when nothing else is left.
    PinActive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreSettings {
    pub capacity: usize,
    pub eviction: EvictionPolicy,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            eviction: EvictionPolicy::default(),
        }
    }
}

/// An inbound update that would break a task invariant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnomalyError {
    #[error("task {task_id} is already {from}, refusing move to {to}")]
    TerminalTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error("task {task_id} cannot go back from {from} to {to}")]
    Regression {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    UnknownTask,
    Rejected(AnomalyError),
}

/// Bounded task history, most recent first.
///
/// Every mutation is written through to the storage it was hydrated from.
/// Storage failures are logged and otherwise ignored.
pub struct TaskStore {
    tasks: Vec<Task>,
    settings: StoreSettings,
    storage: Box<dyn TaskStorage>,
}

impl TaskStore {
    /// Loads the persisted history. Unreadable or malformed state yields an
    /// empty store.
    pub fn hydrate(storage: Box<dyn TaskStorage>, settings: StoreSettings) -> Self {
        let records = match storage.load() {
            Ok(records) => records,
            Err(err) => {
                scrape_warn!("Ignoring persisted task history: {}", err);
                Vec::new()
            }
        };

        let mut tasks: Vec<Task> = Vec::with_capacity(records.len());
        for record in records {
            match record.into_task() {
                Ok(task) if tasks.iter().any(|t| t.id() == task.id()) => {
                    scrape_warn!("Dropping duplicate persisted task {}", task.id());
                }
                Ok(task) => tasks.push(task),
                Err(err) => scrape_warn!("Dropping persisted task: {}", err),
            }
        }

        let mut store = Self {
            tasks,
            settings,
            storage,
        };
        store.enforce_capacity();
        scrape_info!("Hydrated task store with {} task(s)", store.tasks.len());
        store
    }

    /// A store backed by a fresh [`MemoryStorage`].
    pub fn in_memory(settings: StoreSettings) -> Self {
        Self::hydrate(Box::new(MemoryStorage::new()), settings)
    }

    pub fn settings(&self) -> StoreSettings {
        self.settings
    }

    /// Tasks, most recent first.
    pub fn list(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id() == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Inserts or replaces a task and makes it the most recent one.
    pub fn upsert(&mut self, task: Task) {
        self.tasks.retain(|t| t.id() != task.id());
        scrape_debug!("Upserting task {} ({})", task.id(), task.status());
        self.tasks.insert(0, task);
        self.enforce_capacity();
        self.persist();
    }

    /// Applies a status update to a known task.
    ///
    /// Unknown ids are ignored. Updates that would leave a terminal state or
    /// move backwards are logged and dropped. A completed task still waiting
    /// for its data takes the first completed update that carries a result.
    pub fn update_status(&mut self, id: &str, status: TaskStatus, patch: StatusPatch) -> UpdateOutcome {
        let Some(task) = self.tasks.iter_mut().find(|t| t.id() == id) else {
            scrape_debug!("Status update for unknown task {} ignored", id);
            return UpdateOutcome::UnknownTask;
        };

        match task.apply(status, patch) {
            Ok(()) => {
                scrape_debug!(
                    "Task {} is now {} (progress {:?})",
                    id,
                    task.status(),
                    task.progress()
                );
                self.persist();
                UpdateOutcome::Applied
            }
            Err(anomaly) => {
                scrape_warn!("Dropping status update: {}", anomaly);
                UpdateOutcome::Rejected(anomaly)
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id() == id)?;
        let removed = self.tasks.remove(index);
        self.persist();
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
        self.persist();
    }

    fn enforce_capacity(&mut self) {
        while self.tasks.len() > self.settings.capacity {
            let victim = self.eviction_index();
            let evicted = self.tasks.remove(victim);
            scrape_debug!("Evicted task {} from history", evicted.id());
        }
    }

    fn eviction_index(&self) -> usize {
        let last = self.tasks.len() - 1;
        match self.settings.eviction {
            EvictionPolicy::Oldest => last,
            // The front entry is the one just upserted; never evict it in
            // favour of an older active task.
            EvictionPolicy::PinActive => self
                .tasks
                .iter()
                .enumerate()
                .skip(1)
                .rev()
                .find(|(_, t)| t.status().is_terminal())
                .map_or(last, |(index, _)| index),
        }
    }

    fn persist(&self) {
        let records: Vec<TaskRecord> = self.tasks.iter().map(TaskRecord::from_task).collect();
        if let Err(err) = self.storage.save(&records) {
            scrape_error!("Failed to persist task history: {}", err);
        }
    }
}
