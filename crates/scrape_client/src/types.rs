use std::fmt;

/// Acknowledgement of a newly created job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAck {
    pub task_id: String,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct ApiError {
    pub kind: ApiFailure,
    /// Upstream explanation when the service sent one, otherwise a
    /// transport description.
    pub message: String,
}

impl ApiError {
    pub(crate) fn new(kind: ApiFailure, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiFailure {
    InvalidEndpoint,
    HttpStatus(u16),
    Timeout,
    Network,
    MalformedBody,
}

impl fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiFailure::InvalidEndpoint => write!(f, "invalid endpoint"),
            ApiFailure::HttpStatus(code) => write!(f, "http status {code}"),
            ApiFailure::Timeout => write!(f, "timeout"),
            ApiFailure::Network => write!(f, "network error"),
            ApiFailure::MalformedBody => write!(f, "malformed response"),
        }
    }
}
