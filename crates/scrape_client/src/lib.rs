//! Scrape client: talks to the extraction service and keeps the local task
//! history in step with it.
mod api;
mod config;
mod persist;
mod poll;
mod progress;
mod submit;
mod types;
mod workflow;
mod ws;

pub use api::{HttpScrapeApi, ScrapeApi};
pub use config::ClientSettings;
pub use persist::{
    ensure_state_dir, AtomicFileWriter, PersistError, RonFileStorage, HISTORY_FILENAME,
};
pub use poll::refresh_task;
pub use progress::{
    ProgressHub, ProgressNotice, StatusStream, StreamConnector, StreamError, SubscriptionState,
    CANCEL_COMMAND,
};
pub use submit::{ProbeError, SubmissionClient, SubmissionError, SubmitError};
pub use types::{ApiError, ApiFailure, JobAck};
pub use workflow::ExtractionWorkflow;
pub use ws::WsConnector;
