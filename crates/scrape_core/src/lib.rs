//! Scrape core: task lifecycle state, bounded task history and result views.
//!
//! Nothing in this crate performs I/O. Durable storage is reached through the
//! [`TaskStorage`] trait; network and streaming live in `scrape_client`.
mod event;
mod history;
mod render;
mod request;
mod storage;
mod store;
mod task;

pub use event::{EventError, StatusEvent, StatusPatch};
pub use history::{
    history_view, HistoryQuery, HistoryView, SortDirection, SortField, StatusCounts, TaskRowView,
};
pub use render::{
    is_link, string_form, Cell, FieldProjection, FieldShape, ListMode, ProjectionBody, ResultView,
    ShapeKind,
};
pub use request::{
    parse_target_url, ElementSummary, JobRequest, ValidJob, ValidationError, DEFAULT_MAX_PAGES,
};
pub use storage::{MemoryStorage, StorageError, TaskRecord, TaskStorage};
pub use store::{
    AnomalyError, EvictionPolicy, StoreSettings, TaskStore, UpdateOutcome, DEFAULT_CAPACITY,
};
pub use task::{
    OutputFormat, ParseOutputFormatError, RequestConfig, Task, TaskId, TaskResult, TaskState,
    TaskStatus,
};
