use std::sync::Arc;

use scrape_core::{
    parse_target_url, ElementSummary, JobRequest, Task, TaskId, TaskStore, ValidationError,
};
use scrape_logging::{scrape_info, scrape_warn};
use tokio_util::sync::CancellationToken;

use crate::api::ScrapeApi;
use crate::types::ApiError;

/// The service refused or never answered a job creation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job submission failed: {0}")]
pub struct SubmissionError(pub ApiError);

impl SubmissionError {
    /// Explanation to show the user, as sent by the service when it sent one.
    pub fn upstream_message(&self) -> &str {
        &self.0.message
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    InvalidUrl(ValidationError),
    #[error("could not list page elements ({0}); the page may need dynamic rendering")]
    Service(ApiError),
    #[error("the client was closed before the answer arrived")]
    Disposed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error("the client was closed before the answer arrived")]
    Disposed,
}

/// Validates job requests and hands them to the service.
#[derive(Clone)]
pub struct SubmissionClient {
    api: Arc<dyn ScrapeApi>,
}

impl SubmissionClient {
    pub fn new(api: Arc<dyn ScrapeApi>) -> Self {
        Self { api }
    }

    /// Asks the service which element categories exist on `url`.
    pub async fn probe(
        &self,
        url: &str,
        liveness: &CancellationToken,
    ) -> Result<ElementSummary, ProbeError> {
        let target = parse_target_url(url).map_err(ProbeError::InvalidUrl)?;
        let outcome = self.api.element_summary(&target).await;
        if liveness.is_cancelled() {
            return Err(ProbeError::Disposed);
        }
        outcome.map_err(|err| {
            scrape_warn!("Element probe for {} failed: {}", target, err);
            ProbeError::Service(err)
        })
    }

    /// Creates the job and records it as running at 0%.
    ///
    /// Invalid requests never reach the service. Nothing is recorded when the
    /// service refuses the job or when `liveness` is cancelled while waiting.
    pub async fn submit(
        &self,
        store: &mut TaskStore,
        request: &JobRequest,
        liveness: &CancellationToken,
    ) -> Result<TaskId, SubmitError> {
        let job = request.validate()?;
        let outcome = self.api.create_job(&job).await;
        if liveness.is_cancelled() {
            return Err(SubmitError::Disposed);
        }
        let ack = outcome.map_err(|err| {
            scrape_warn!("Submission for {} failed: {}", job.url, err);
            SubmissionError(err)
        })?;

        scrape_info!(
            "Task {} created for {}{}",
            ack.task_id,
            job.url,
            ack.message
                .as_deref()
                .map(|m| format!(" ({m})"))
                .unwrap_or_default()
        );
        store.upsert(Task::submitted(ack.task_id.clone(), job.url, job.config));
        Ok(ack.task_id)
    }
}
