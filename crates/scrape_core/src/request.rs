use url::Url;

use crate::task::{OutputFormat, RequestConfig};

/// Page limit sent to the service when pagination is off.
pub const DEFAULT_MAX_PAGES: u32 = 5;

const PAGE_LIMIT_RANGE: std::ops::RangeInclusive<u32> = 1..=100;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid url {input:?}: {reason}")]
    InvalidUrl { input: String, reason: String },
    #[error("unsupported url scheme {0:?}, expected http or https")]
    UnsupportedScheme(String),
    #[error("no elements selected")]
    NoElements,
    #[error("page limit {0} out of range 1..=100")]
    PageLimitOutOfRange(u32),
}

/// Raw user input for a new extraction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub url: String,
    pub elements: Vec<String>,
    pub use_dynamic_rendering: bool,
    pub paginate: bool,
    pub max_pages: u32,
    pub output_format: OutputFormat,
}

impl JobRequest {
    pub fn new(url: impl Into<String>, elements: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            url: url.into(),
            elements: elements.into_iter().map(Into::into).collect(),
            use_dynamic_rendering: false,
            paginate: false,
            max_pages: DEFAULT_MAX_PAGES,
            output_format: OutputFormat::Json,
        }
    }

    /// Checks the request without touching the network.
    ///
    /// Element names are trimmed and deduplicated, keeping first occurrence.
    pub fn validate(&self) -> Result<ValidJob, ValidationError> {
        let url = parse_target_url(&self.url)?;

        let mut elements: Vec<String> = Vec::with_capacity(self.elements.len());
        for element in self.elements.iter().map(|e| e.trim()) {
            if !element.is_empty() && !elements.iter().any(|e| e == element) {
                elements.push(element.to_string());
            }
        }
        if elements.is_empty() {
            return Err(ValidationError::NoElements);
        }

        let max_pages = if self.paginate {
            if !PAGE_LIMIT_RANGE.contains(&self.max_pages) {
                return Err(ValidationError::PageLimitOutOfRange(self.max_pages));
            }
            Some(self.max_pages)
        } else {
            None
        };

        Ok(ValidJob {
            url,
            config: RequestConfig {
                elements,
                use_dynamic_rendering: self.use_dynamic_rendering,
                paginate: self.paginate,
                max_pages,
                output_format: self.output_format,
            },
        })
    }
}

/// Parses an absolute `http`/`https` URL.
pub fn parse_target_url(input: &str) -> Result<Url, ValidationError> {
    let trimmed = input.trim();
    let url = Url::parse(trimmed).map_err(|err| ValidationError::InvalidUrl {
        input: trimmed.to_string(),
        reason: err.to_string(),
    })?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(url),
        "http" | "https" => Err(ValidationError::InvalidUrl {
            input: trimmed.to_string(),
            reason: "missing host".to_string(),
        }),
        other => Err(ValidationError::UnsupportedScheme(other.to_string())),
    }
}

/// A request that passed validation and may be sent to the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidJob {
    pub url: Url,
    pub config: RequestConfig,
}

impl ValidJob {
    /// Page limit to put on the wire.
    pub fn wire_max_pages(&self) -> u32 {
        self.config.max_pages.unwrap_or(DEFAULT_MAX_PAGES)
    }
}

/// Element categories detected on a page, with how many of each were found.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementSummary {
    counts: Vec<(String, u64)>,
}

impl ElementSummary {
    pub fn from_counts(counts: impl IntoIterator<Item = (String, u64)>) -> Self {
        Self {
            counts: counts.into_iter().collect(),
        }
    }

    pub fn counts(&self) -> &[(String, u64)] {
        &self.counts
    }

    pub fn count(&self, category: &str) -> Option<u64> {
        self.counts
            .iter()
            .find(|(name, _)| name == category)
            .map(|(_, count)| *count)
    }

    /// Categories a user may pick: those with at least one match.
    pub fn selectable(&self) -> Vec<&str> {
        self.counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// True when nothing selectable was found; usually a hint to retry with
    /// dynamic rendering.
    pub fn is_empty(&self) -> bool {
        self.selectable().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_minimal_request() {
        let job = JobRequest::new("https://example.com", ["Titres"])
            .validate()
            .unwrap();
        assert_eq!(job.url.as_str(), "https://example.com/");
        assert_eq!(job.config.elements, vec!["Titres".to_string()]);
        assert_eq!(job.config.max_pages, None);
        assert_eq!(job.wire_max_pages(), DEFAULT_MAX_PAGES);
    }

    #[test]
    fn rejects_relative_and_non_http_urls() {
        let err = JobRequest::new("example.com", ["Titres"]).validate().unwrap_err();
        assert!(matches!(err, ValidationError::InvalidUrl { .. }));

        let err = JobRequest::new("ftp://example.com", ["Titres"])
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedScheme("ftp".to_string()));
    }

    #[test]
    fn blank_elements_count_as_none() {
        let err = JobRequest::new("https://example.com", ["  ", ""])
            .validate()
            .unwrap_err();
        assert_eq!(err, ValidationError::NoElements);
    }

    #[test]
    fn page_limit_checked_only_when_paginating() {
        let mut request = JobRequest::new("https://example.com", ["Liens", "Liens"]);
        request.max_pages = 0;
        let job = request.validate().unwrap();
        assert_eq!(job.config.elements, vec!["Liens".to_string()]);

        request.paginate = true;
        assert_eq!(
            request.validate().unwrap_err(),
            ValidationError::PageLimitOutOfRange(0)
        );

        request.max_pages = 100;
        assert_eq!(request.validate().unwrap().config.max_pages, Some(100));
    }

    #[test]
    fn summary_excludes_zero_counts() {
        let summary = ElementSummary::from_counts([
            ("Titres".to_string(), 4),
            ("Images".to_string(), 0),
            ("Liens".to_string(), 12),
        ]);
        assert_eq!(summary.selectable(), vec!["Titres", "Liens"]);
        assert_eq!(summary.count("Images"), Some(0));
        assert!(!summary.is_empty());
        assert!(ElementSummary::default().is_empty());
    }
}
