use scrape_core::{TaskStore, UpdateOutcome};
use scrape_logging::scrape_debug;

use crate::api::ScrapeApi;
use crate::types::ApiError;

/// Pulls the current status of one task and folds it into the store.
///
/// Used when no stream is open for the task, e.g. after a restart.
pub async fn refresh_task(
    api: &dyn ScrapeApi,
    store: &mut TaskStore,
    task_id: &str,
) -> Result<UpdateOutcome, ApiError> {
    let event = api.task_snapshot(task_id).await?;
    scrape_debug!("Snapshot of {}: {}", task_id, event.status);
    Ok(store.update_status(task_id, event.status, event.patch))
}
