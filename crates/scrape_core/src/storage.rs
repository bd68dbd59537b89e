use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::task::{RequestConfig, Task, TaskState, TaskStatus, DEFAULT_FAILURE};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("task storage unreadable: {0}")]
    Unreadable(String),
    #[error("persisted task state is malformed: {0}")]
    Malformed(String),
    #[error("task storage write failed: {0}")]
    Write(String),
}

/// Durable home of the task history. Implementations only move records in
/// and out; ordering and capacity are the store's concern.
pub trait TaskStorage: Send {
    fn load(&self) -> Result<Vec<TaskRecord>, StorageError>;
    fn save(&self, records: &[TaskRecord]) -> Result<(), StorageError>;
}

/// Serializable form of a [`Task`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub status: TaskStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub request: RequestConfig,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub output_file: Option<String>,
    /// Result kept as a JSON document so arbitrary payloads survive any
    /// storage format unchanged.
    #[serde(default)]
    pub result_json: Option<String>,
}

impl TaskRecord {
    pub fn from_task(task: &Task) -> Self {
        let result_json = task
            .result()
            .map(|result| serde_json::Value::Object(result.clone()).to_string());
        Self {
            id: task.id().to_string(),
            url: task.url().to_string(),
            created_at: task.created_at(),
            status: task.status(),
            progress: task.progress().unwrap_or(0),
            request: task.request().clone(),
            error: task.error().map(ToOwned::to_owned),
            message: task.message().map(ToOwned::to_owned),
            output_file: task.output_file().map(ToOwned::to_owned),
            result_json,
        }
    }

    pub fn into_task(self) -> Result<Task, StorageError> {
        if self.id.trim().is_empty() {
            return Err(StorageError::Malformed("record without id".to_string()));
        }
        let url = Url::parse(&self.url)
            .map_err(|err| StorageError::Malformed(format!("task {}: {err}", self.id)))?;

        let state = match self.status {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Running => TaskState::Running {
                progress: self.progress.min(100),
            },
            TaskStatus::Completed => {
                let result = match self.result_json.as_deref() {
                    Some(text) => Some(serde_json::from_str(text).map_err(|err| {
                        StorageError::Malformed(format!("task {} result: {err}", self.id))
                    })?),
                    None => None,
                };
                TaskState::Completed { result }
            }
            TaskStatus::Failed => TaskState::Failed {
                error: self.error.unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
            },
        };

        Ok(
            Task::with_state(self.id, url, self.request, self.created_at, state)
                .with_details(self.message, self.output_file),
        )
    }
}

/// Storage kept in memory; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<Mutex<Vec<TaskRecord>>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<TaskRecord>) -> Self {
        let storage = Self::default();
        if let Ok(mut guard) = storage.records.lock() {
            *guard = records;
        }
        storage
    }

    pub fn records(&self) -> Vec<TaskRecord> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    /// Number of completed `save` calls.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl TaskStorage for MemoryStorage {
    fn load(&self) -> Result<Vec<TaskRecord>, StorageError> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .map_err(|err| StorageError::Unreadable(err.to_string()))
    }

    fn save(&self, records: &[TaskRecord]) -> Result<(), StorageError> {
        let mut guard = self
            .records
            .lock()
            .map_err(|err| StorageError::Write(err.to_string()))?;
        *guard = records.to_vec();
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
