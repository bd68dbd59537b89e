use reqwest::StatusCode;
use scrape_core::{ElementSummary, OutputFormat, StatusEvent, ValidJob};
use scrape_logging::{scrape_debug, scrape_warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::ClientSettings;
use crate::types::{ApiError, ApiFailure, JobAck};

/// Request/response side of the extraction service.
#[async_trait::async_trait]
pub trait ScrapeApi: Send + Sync {
    /// `POST /scrape`.
    async fn create_job(&self, job: &ValidJob) -> Result<JobAck, ApiError>;

    /// `GET /elements?url=…`.
    async fn element_summary(&self, url: &Url) -> Result<ElementSummary, ApiError>;

    /// `GET /tasks/{id}`, read as a status update.
    async fn task_snapshot(&self, task_id: &str) -> Result<StatusEvent, ApiError>;
}

#[derive(Debug, Serialize)]
struct CreateJobBody<'a> {
    url: &'a str,
    elements: &'a [String],
    use_selenium: bool,
    handle_pagination: bool,
    max_pages: u32,
    output_format: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    task_id: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpScrapeApi {
    client: reqwest::Client,
    settings: ClientSettings,
}

impl HttpScrapeApi {
    pub fn new(settings: ClientSettings) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| ApiError::new(ApiFailure::Network, err.to_string()))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Link to an exported file; the handle becomes one encoded path segment.
    pub fn download_url(&self, file_ref: &str) -> Result<Url, ApiError> {
        self.resource(&["download", file_ref])
    }

    fn resource(&self, segments: &[&str]) -> Result<Url, ApiError> {
        self.settings.api_resource(segments).map_err(|err| {
            ApiError::new(
                ApiFailure::InvalidEndpoint,
                format!("{}: {err}", self.settings.api_base),
            )
        })
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<String, ApiError> {
        let status = response.status();
        let body = response.text().await.map_err(map_reqwest_error)?;
        if !status.is_success() {
            return Err(ApiError::new(
                ApiFailure::HttpStatus(status.as_u16()),
                upstream_message(status, &body),
            ));
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl ScrapeApi for HttpScrapeApi {
    async fn create_job(&self, job: &ValidJob) -> Result<JobAck, ApiError> {
        let endpoint = parse_endpoint(&self.settings.api_endpoint("scrape"))?;
        let body = CreateJobBody {
            url: job.url.as_str(),
            elements: &job.config.elements,
            use_selenium: job.config.use_dynamic_rendering,
            handle_pagination: job.config.paginate,
            max_pages: job.wire_max_pages(),
            output_format: job.config.output_format,
        };
        scrape_debug!("POST {} for {}", endpoint, job.url);

        let response = self
            .client
            .post(endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let text = self.read_body(response).await?;

        let parsed: CreateJobResponse = serde_json::from_str(&text)
            .map_err(|err| ApiError::new(ApiFailure::MalformedBody, err.to_string()))?;
        if parsed.task_id.trim().is_empty() {
            return Err(ApiError::new(ApiFailure::MalformedBody, "empty task id"));
        }
        Ok(JobAck {
            task_id: parsed.task_id,
            message: parsed.message,
        })
    }

    async fn element_summary(&self, url: &Url) -> Result<ElementSummary, ApiError> {
        let endpoint = Url::parse_with_params(
            &self.settings.api_endpoint("elements"),
            [("url", url.as_str())],
        )
        .map_err(|err| ApiError::new(ApiFailure::InvalidEndpoint, err.to_string()))?;
        scrape_debug!("GET {}", endpoint);

        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let text = self.read_body(response).await?;

        let counts: serde_json::Map<String, Value> = serde_json::from_str(&text)
            .map_err(|err| ApiError::new(ApiFailure::MalformedBody, err.to_string()))?;
        Ok(ElementSummary::from_counts(counts.into_iter().map(
            |(category, count)| {
                let count = count.as_u64().unwrap_or_else(|| {
                    scrape_warn!("Ignoring non-numeric count for {}: {}", category, count);
                    0
                });
                (category, count)
            },
        )))
    }

    async fn task_snapshot(&self, task_id: &str) -> Result<StatusEvent, ApiError> {
        let endpoint = self.resource(&["tasks", task_id])?;
        let response = self
            .client
            .get(endpoint)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let text = self.read_body(response).await?;
        StatusEvent::parse(&text)
            .map_err(|err| ApiError::new(ApiFailure::MalformedBody, err.to_string()))
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ApiError> {
    Url::parse(raw).map_err(|err| ApiError::new(ApiFailure::InvalidEndpoint, format!("{raw}: {err}")))
}

/// Best explanation the service gave: `detail` or `message` from a JSON body,
/// else the raw body, else the status reason.
fn upstream_message(status: StatusCode, body: &str) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
        for key in ["detail", "message", "error"] {
            if let Some(Value::String(text)) = map.get(key) {
                return text.clone();
            }
        }
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .map_or_else(|| status.to_string(), ToOwned::to_owned)
}

fn map_reqwest_error(err: reqwest::Error) -> ApiError {
    if err.is_timeout() {
        return ApiError::new(ApiFailure::Timeout, err.to_string());
    }
    ApiError::new(ApiFailure::Network, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_prefers_detail() {
        assert_eq!(
            upstream_message(StatusCode::BAD_REQUEST, r#"{"detail":"URL invalide"}"#),
            "URL invalide"
        );
        assert_eq!(
            upstream_message(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "upstream down"
        );
        assert_eq!(
            upstream_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }
}
