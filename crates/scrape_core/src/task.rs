use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::event::StatusPatch;
use crate::store::AnomalyError;

/// Identifier assigned by the remote service when a job is accepted.
pub type TaskId = String;

/// Extracted data keyed by element category, in the order the service sent it.
pub type TaskResult = serde_json::Map<String, serde_json::Value>;

/// Failure reason used when a `failed` status arrives without one.
pub(crate) const DEFAULT_FAILURE: &str = "extraction failed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Position in the lifecycle; a task never moves to a lower rank.
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state. A result exists only once completed, an error only once
/// failed.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskState {
    Pending,
    Running { progress: u8 },
    /// `result` is `None` when the completion notice came without data; a
    /// later task lookup fills it in.
    Completed { result: Option<TaskResult> },
    Failed { error: String },
}

impl TaskState {
    pub fn status(&self) -> TaskStatus {
        match self {
            TaskState::Pending => TaskStatus::Pending,
            TaskState::Running { .. } => TaskStatus::Running,
            TaskState::Completed { .. } => TaskStatus::Completed,
            TaskState::Failed { .. } => TaskStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    #[default]
    #[serde(rename = "JSON")]
    Json,
    #[serde(rename = "CSV")]
    Csv,
    #[serde(rename = "Excel")]
    Excel,
    #[serde(rename = "Texte")]
    Text,
}

impl OutputFormat {
    /// Label expected by the extraction service.
    pub fn wire_label(self) -> &'static str {
        match self {
            OutputFormat::Json => "JSON",
            OutputFormat::Csv => "CSV",
            OutputFormat::Excel => "Excel",
            OutputFormat::Text => "Texte",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown output format {0:?} (expected json, csv, excel or text)")]
pub struct ParseOutputFormatError(String);

impl FromStr for OutputFormat {
    type Err = ParseOutputFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "excel" | "xlsx" | "spreadsheet" => Ok(OutputFormat::Excel),
            "text" | "texte" | "txt" => Ok(OutputFormat::Text),
            _ => Err(ParseOutputFormatError(s.to_string())),
        }
    }
}

/// Submission parameters captured when the job was accepted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RequestConfig {
    pub elements: Vec<String>,
    pub use_dynamic_rendering: bool,
    pub paginate: bool,
    /// Only meaningful when `paginate` is set.
    pub max_pages: Option<u32>,
    pub output_format: OutputFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    id: TaskId,
    url: Url,
    created_at: DateTime<Utc>,
    request: RequestConfig,
    state: TaskState,
    message: Option<String>,
    output_file: Option<String>,
}

impl Task {
    /// A task the service has not started yet.
    pub fn new(id: impl Into<TaskId>, url: Url, request: RequestConfig) -> Self {
        Self::with_state(id, url, request, Utc::now(), TaskState::Pending)
    }

    /// A freshly acknowledged job; the service starts it immediately.
    pub fn submitted(id: impl Into<TaskId>, url: Url, request: RequestConfig) -> Self {
        Self::with_state(
            id,
            url,
            request,
            Utc::now(),
            TaskState::Running { progress: 0 },
        )
    }

    pub(crate) fn with_state(
        id: impl Into<TaskId>,
        url: Url,
        request: RequestConfig,
        created_at: DateTime<Utc>,
        state: TaskState,
    ) -> Self {
        Self {
            id: id.into(),
            url,
            created_at,
            request,
            state,
            message: None,
            output_file: None,
        }
    }

    pub(crate) fn with_details(mut self, message: Option<String>, output_file: Option<String>) -> Self {
        self.message = message;
        self.output_file = output_file;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn request(&self) -> &RequestConfig {
        &self.request
    }

    pub fn state(&self) -> &TaskState {
        &self.state
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    /// Progress percentage; `None` unless the task is running.
    pub fn progress(&self) -> Option<u8> {
        match self.state {
            TaskState::Running { progress } => Some(progress),
            _ => None,
        }
    }

    pub fn result(&self) -> Option<&TaskResult> {
        match &self.state {
            TaskState::Completed { result } => result.as_ref(),
            _ => None,
        }
    }

    /// Completed, but the extracted data has not been received yet.
    pub fn awaits_result(&self) -> bool {
        matches!(self.state, TaskState::Completed { result: None })
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            TaskState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Last progress message reported by the service.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Download handle of the exported file, once the service produced one.
    pub fn output_file(&self) -> Option<&str> {
        self.output_file.as_deref()
    }

    /// Applies a status transition. Terminal tasks and backwards moves are
    /// rejected without touching the task, except that a completed task still
    /// missing its result accepts a completed update that carries one.
    pub(crate) fn apply(&mut self, status: TaskStatus, patch: StatusPatch) -> Result<(), AnomalyError> {
        let current = self.status();
        if self.awaits_result() && status == TaskStatus::Completed && patch.result.is_some() {
            self.state = TaskState::Completed {
                result: patch.result,
            };
            self.merge_details(patch.message, patch.output_file);
            return Ok(());
        }
        if current.is_terminal() {
            return Err(AnomalyError::TerminalTransition {
                task_id: self.id.clone(),
                from: current,
                to: status,
            });
        }
        if status.rank() < current.rank() {
            return Err(AnomalyError::Regression {
                task_id: self.id.clone(),
                from: current,
                to: status,
            });
        }

        let StatusPatch {
            progress,
            result,
            error,
            message,
            output_file,
        } = patch;

        self.state = match status {
            TaskStatus::Pending => TaskState::Pending,
            TaskStatus::Running => {
                let previous = self.progress().unwrap_or(0);
                let next = progress.map_or(previous, |p| p.min(100)).max(previous);
                TaskState::Running { progress: next }
            }
            TaskStatus::Completed => TaskState::Completed { result },
            TaskStatus::Failed => TaskState::Failed {
                error: error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE.to_string()),
            },
        };
        self.merge_details(message, output_file);
        Ok(())
    }

    fn merge_details(&mut self, message: Option<String>, output_file: Option<String>) {
        if message.is_some() {
            self.message = message;
        }
        if output_file.is_some() {
            self.output_file = output_file;
        }
    }
}
