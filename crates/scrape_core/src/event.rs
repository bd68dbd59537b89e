use serde::Deserialize;
use serde_json::Value;

use crate::task::{TaskResult, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event is not valid json: {0}")]
    Json(String),
    #[error("event has an empty status")]
    MissingStatus,
    #[error("event result is not an object")]
    InvalidResult,
}

/// Fields a status update may carry alongside the status itself.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatusPatch {
    pub progress: Option<u8>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub message: Option<String>,
    pub output_file: Option<String>,
}

/// One status update for a task, as pushed on its stream or returned by a
/// task lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusEvent {
    pub task_id: Option<String>,
    pub status: TaskStatus,
    pub patch: StatusPatch,
}

#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(default)]
    task_id: Option<String>,
    status: String,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    output_file: Option<String>,
}

impl StatusEvent {
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let wire: WireEvent =
            serde_json::from_str(text).map_err(|err| EventError::Json(err.to_string()))?;
        Self::from_wire(wire)
    }

    pub fn from_value(value: Value) -> Result<Self, EventError> {
        let wire: WireEvent =
            serde_json::from_value(value).map_err(|err| EventError::Json(err.to_string()))?;
        Self::from_wire(wire)
    }

    /// Status that ends the task's lifecycle.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn from_wire(wire: WireEvent) -> Result<Self, EventError> {
        let raw_status = wire.status.trim();
        if raw_status.is_empty() {
            return Err(EventError::MissingStatus);
        }

        let result = match wire.result {
            None | Some(Value::Null) => None,
            Some(Value::Object(map)) => Some(map),
            Some(_) => return Err(EventError::InvalidResult),
        };

        let mut patch = StatusPatch {
            progress: wire.progress.map(|p| p.clamp(0.0, 100.0).round() as u8),
            result,
            error: wire.error,
            message: wire.message,
            output_file: wire.output_file,
        };

        // The service reports free-form progress text in `status` while a
        // job runs, and `cancelled` when a client aborted it.
        let status = match raw_status.to_ascii_lowercase().as_str() {
            "pending" => TaskStatus::Pending,
            "running" => TaskStatus::Running,
            "completed" => TaskStatus::Completed,
            "failed" => TaskStatus::Failed,
            "cancelled" | "canceled" => {
                patch.error.get_or_insert_with(|| "cancelled".to_string());
                TaskStatus::Failed
            }
            _ => {
                patch.message.get_or_insert_with(|| raw_status.to_string());
                TaskStatus::Running
            }
        };

        Ok(Self {
            task_id: wire.task_id,
            status,
            patch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_progress_event() {
        let event = StatusEvent::parse(r#"{"status":"running","progress":42}"#).unwrap();
        assert_eq!(event.status, TaskStatus::Running);
        assert_eq!(event.patch.progress, Some(42));
        assert!(!event.is_terminal());
    }

    #[test]
    fn free_form_status_becomes_running_message() {
        let event = StatusEvent::parse(
            r#"{"task_id":"t","status":"Téléchargement de la page...","progress":30}"#,
        )
        .unwrap();
        assert_eq!(event.status, TaskStatus::Running);
        assert_eq!(event.patch.message.as_deref(), Some("Téléchargement de la page..."));
        assert_eq!(event.task_id.as_deref(), Some("t"));
    }

    #[test]
    fn cancelled_maps_to_failed() {
        let event = StatusEvent::parse(r#"{"status":"cancelled"}"#).unwrap();
        assert_eq!(event.status, TaskStatus::Failed);
        assert_eq!(event.patch.error.as_deref(), Some("cancelled"));
    }

    #[test]
    fn completed_carries_result_in_order() {
        let event = StatusEvent::from_value(json!({
            "status": "completed",
            "progress": 100,
            "result": {"Titres": ["A", "B"], "Liens": []},
            "output_file": "export.json"
        }))
        .unwrap();
        let keys: Vec<_> = event.patch.result.as_ref().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["Titres", "Liens"]);
        assert_eq!(event.patch.output_file.as_deref(), Some("export.json"));
    }

    #[test]
    fn malformed_events_are_errors() {
        assert!(matches!(StatusEvent::parse("not json"), Err(EventError::Json(_))));
        assert!(matches!(StatusEvent::parse(r#"{"progress":1}"#), Err(EventError::Json(_))));
        assert_eq!(
            StatusEvent::parse(r#"{"status":"  "}"#).unwrap_err(),
            EventError::MissingStatus
        );
        assert_eq!(
            StatusEvent::parse(r#"{"status":"completed","result":[1]}"#).unwrap_err(),
            EventError::InvalidResult
        );
    }
}
