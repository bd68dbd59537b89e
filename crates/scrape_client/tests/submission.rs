use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};

use scrape_client::{
    ApiError, ApiFailure, JobAck, ProbeError, ScrapeApi, SubmissionClient, SubmitError,
};
use scrape_core::{
    ElementSummary, JobRequest, StatusEvent, StoreSettings, TaskState, TaskStatus, TaskStore,
    ValidJob, ValidationError,
};
use tokio_util::sync::CancellationToken;
use url::Url;

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(scrape_logging::initialize_for_tests);
}

/// Answers every call the same way and counts them.
struct FakeApi {
    answer: Result<String, ApiError>,
    calls: AtomicUsize,
    cancel_on_call: Option<CancellationToken>,
}

impl FakeApi {
    fn accepting(task_id: &str) -> Self {
        Self {
            answer: Ok(task_id.to_string()),
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    fn refusing(message: &str) -> Self {
        Self {
            answer: Err(ApiError {
                kind: ApiFailure::HttpStatus(400),
                message: message.to_string(),
            }),
            calls: AtomicUsize::new(0),
            cancel_on_call: None,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_call {
            token.cancel();
        }
    }
}

#[async_trait::async_trait]
impl ScrapeApi for FakeApi {
    async fn create_job(&self, _job: &ValidJob) -> Result<JobAck, ApiError> {
        self.record_call();
        self.answer.clone().map(|task_id| JobAck {
            task_id,
            message: None,
        })
    }

    async fn element_summary(&self, _url: &Url) -> Result<ElementSummary, ApiError> {
        self.record_call();
        self.answer.clone().map(|_| {
            ElementSummary::from_counts([("Titres".to_string(), 3), ("Images".to_string(), 0)])
        })
    }

    async fn task_snapshot(&self, _task_id: &str) -> Result<StatusEvent, ApiError> {
        unreachable!("submission never polls")
    }
}

#[tokio::test]
async fn empty_elements_fail_validation_without_network() {
    init_logging();
    let api = Arc::new(FakeApi::accepting("t-1"));
    let client = SubmissionClient::new(api.clone());
    let mut store = TaskStore::in_memory(StoreSettings::default());

    let request = JobRequest::new("https://example.com", Vec::<String>::new());
    let err = client
        .submit(&mut store, &request, &CancellationToken::new())
        .await
        .unwrap_err();

    assert_eq!(err, SubmitError::Validation(ValidationError::NoElements));
    assert_eq!(api.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn bad_url_and_page_limit_fail_validation() {
    let api = Arc::new(FakeApi::accepting("t-1"));
    let client = SubmissionClient::new(api.clone());
    let mut store = TaskStore::in_memory(StoreSettings::default());
    let liveness = CancellationToken::new();

    let request = JobRequest::new("ftp://example.com", ["Titres"]);
    let err = client.submit(&mut store, &request, &liveness).await;
    assert!(matches!(
        err,
        Err(SubmitError::Validation(ValidationError::UnsupportedScheme(_)))
    ));

    let mut request = JobRequest::new("https://example.com", ["Titres"]);
    request.paginate = true;
    request.max_pages = 101;
    let err = client.submit(&mut store, &request, &liveness).await;
    assert_eq!(
        err,
        Err(SubmitError::Validation(ValidationError::PageLimitOutOfRange(
            101
        )))
    );

    assert_eq!(api.calls(), 0);
    assert!(store.is_empty());
}

#[tokio::test]
async fn accepted_job_is_recorded_running_at_zero() {
    init_logging();
    let api = Arc::new(FakeApi::accepting("t-42"));
    let client = SubmissionClient::new(api.clone());
    let mut store = TaskStore::in_memory(StoreSettings::default());

    let request = JobRequest::new("https://example.com", ["Titres"]);
    let task_id = client
        .submit(&mut store, &request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(task_id, "t-42");
    assert_eq!(store.len(), 1);
    let task = store.get("t-42").unwrap();
    assert_eq!(task.status(), TaskStatus::Running);
    assert_eq!(task.state(), &TaskState::Running { progress: 0 });
    assert_eq!(task.url().as_str(), "https://example.com/");
    assert_eq!(task.request().elements, vec!["Titres".to_string()]);
}

#[tokio::test]
async fn refused_job_leaves_store_unchanged() {
    init_logging();
    let api = Arc::new(FakeApi::refusing("Format inconnu"));
    let client = SubmissionClient::new(api.clone());
    let mut store = TaskStore::in_memory(StoreSettings::default());

    let request = JobRequest::new("https://example.com", ["Titres"]);
    let err = client
        .submit(&mut store, &request, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        SubmitError::Submission(err) => assert_eq!(err.upstream_message(), "Format inconnu"),
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(api.calls(), 1);
    assert!(store.is_empty());
}

#[tokio::test]
async fn answer_after_dispose_is_discarded() {
    let liveness = CancellationToken::new();
    let api = Arc::new(FakeApi {
        cancel_on_call: Some(liveness.clone()),
        ..FakeApi::accepting("t-late")
    });
    let client = SubmissionClient::new(api.clone());
    let mut store = TaskStore::in_memory(StoreSettings::default());

    let request = JobRequest::new("https://example.com", ["Titres"]);
    let err = client.submit(&mut store, &request, &liveness).await;
    assert_eq!(err, Err(SubmitError::Disposed));
    assert_eq!(api.calls(), 1);
    assert!(store.is_empty());

    let probe = client.probe("https://example.com", &liveness).await;
    assert_eq!(probe, Err(ProbeError::Disposed));
}

#[tokio::test]
async fn probe_lists_selectable_categories() {
    let api = Arc::new(FakeApi::accepting("unused"));
    let client = SubmissionClient::new(api.clone());

    let summary = client
        .probe("https://example.com", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(summary.selectable(), vec!["Titres"]);

    let err = client
        .probe("not a url", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::InvalidUrl(_)));
    assert_eq!(api.calls(), 1);
}

#[tokio::test]
async fn failed_probe_suggests_dynamic_rendering() {
    let api = Arc::new(FakeApi::refusing("timeout"));
    let client = SubmissionClient::new(api);

    let err = client
        .probe("https://example.com", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ProbeError::Service(_)));
    assert!(err.to_string().contains("dynamic rendering"));
}
