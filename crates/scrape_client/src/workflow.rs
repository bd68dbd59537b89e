use std::sync::Arc;

use scrape_core::{ElementSummary, JobRequest, Task, TaskId, TaskStatus, TaskStore, UpdateOutcome};
use scrape_logging::{scrape_debug, scrape_info, scrape_warn};

use crate::api::ScrapeApi;
use crate::poll::refresh_task;
use crate::progress::{ProgressHub, ProgressNotice, StreamConnector};
use crate::submit::{ProbeError, SubmissionClient, SubmitError};
use crate::types::ApiError;

/// Submission and live progress for one caller, sharing one lifetime.
///
/// Disposing the workflow closes its streams and makes in-flight submissions
/// and probes discard their answers.
pub struct ExtractionWorkflow {
    api: Arc<dyn ScrapeApi>,
    submitter: SubmissionClient,
    hub: ProgressHub,
}

impl ExtractionWorkflow {
    pub fn new(api: Arc<dyn ScrapeApi>, connector: Arc<dyn StreamConnector>) -> Self {
        Self {
            submitter: SubmissionClient::new(Arc::clone(&api)),
            api,
            hub: ProgressHub::new(connector),
        }
    }

    pub async fn probe(&self, url: &str) -> Result<ElementSummary, ProbeError> {
        self.submitter.probe(url, self.hub.liveness()).await
    }

    /// Submits the job and starts following its progress.
    pub async fn submit(
        &mut self,
        store: &mut TaskStore,
        request: &JobRequest,
    ) -> Result<TaskId, SubmitError> {
        let task_id = self
            .submitter
            .submit(store, request, self.hub.liveness())
            .await?;
        self.hub.subscribe(&task_id);
        Ok(task_id)
    }

    /// Starts following a task again, e.g. after its stream was lost.
    /// Finished tasks are not followed.
    pub fn resubscribe(&mut self, store: &TaskStore, task_id: &str) -> bool {
        match store.get(task_id) {
            Some(task) if !task.status().is_terminal() => self.hub.subscribe(task_id),
            Some(_) => {
                scrape_debug!("Task {} already finished, not subscribing", task_id);
                false
            }
            None => false,
        }
    }

    /// Next progress notice, applied to `store`.
    ///
    /// When a task completes without its data attached, the result is looked
    /// up before the notice is returned.
    pub async fn next_notice(&mut self, store: &mut TaskStore) -> Option<ProgressNotice> {
        let notice = self.hub.next(store).await?;
        if let ProgressNotice::Finished {
            task_id,
            status: TaskStatus::Completed,
            ..
        } = &notice
        {
            if store.get(task_id).is_some_and(Task::awaits_result) {
                self.fetch_result(store, task_id).await;
            }
        }
        Some(notice)
    }

    async fn fetch_result(&self, store: &mut TaskStore, task_id: &str) {
        scrape_debug!("Task {} completed without data, looking it up", task_id);
        match self.refresh(store, task_id).await {
            Ok(UpdateOutcome::Applied) => {
                scrape_info!("Fetched result of {}", task_id);
            }
            Ok(outcome) => {
                scrape_warn!("Lookup of {} brought no result: {:?}", task_id, outcome);
            }
            Err(err) => scrape_warn!("Could not fetch result of {}: {}", task_id, err),
        }
    }

    /// Asks the service to abort a task that is being followed.
    pub fn cancel(&mut self, task_id: &str) -> bool {
        self.hub.cancel_task(task_id)
    }

    pub async fn refresh(
        &self,
        store: &mut TaskStore,
        task_id: &str,
    ) -> Result<UpdateOutcome, ApiError> {
        refresh_task(self.api.as_ref(), store, task_id).await
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub fn dispose(&mut self) {
        self.hub.dispose();
    }

    pub async fn shutdown(self) {
        self.hub.shutdown().await;
    }
}
