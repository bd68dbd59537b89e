use std::time::Duration;

use url::Url;

/// Where the extraction service lives and how long to wait for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    /// Base of the REST endpoints, e.g. `http://localhost:8000/api`.
    pub api_base: String,
    /// Base of the per-task status streams, e.g. `ws://localhost:8000/ws`.
    pub stream_base: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/api".to_string(),
            stream_base: "ws://localhost:8000/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ClientSettings {
    pub(crate) fn api_endpoint(&self, path: &str) -> String {
        join(&self.api_base, path)
    }

    /// `{api_base}/{segments..}`, each segment percent-encoded.
    pub(crate) fn api_resource(&self, segments: &[&str]) -> Result<Url, url::ParseError> {
        with_segments(&self.api_base, segments)
    }

    pub(crate) fn stream_endpoint(&self, task_id: &str) -> Result<Url, url::ParseError> {
        with_segments(&self.stream_base, &[task_id])
    }
}

fn with_segments(base: &str, segments: &[&str]) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_tolerate_slashes() {
        let settings = ClientSettings {
            api_base: "http://host/api/".to_string(),
            ..ClientSettings::default()
        };
        assert_eq!(settings.api_endpoint("/scrape"), "http://host/api/scrape");
        assert_eq!(
            settings.stream_endpoint("abc").unwrap().as_str(),
            "ws://localhost:8000/ws/abc"
        );
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let settings = ClientSettings {
            api_base: "http://host/api/".to_string(),
            ..ClientSettings::default()
        };
        assert_eq!(
            settings.api_resource(&["tasks", "a/b?c"]).unwrap().as_str(),
            "http://host/api/tasks/a%2Fb%3Fc"
        );
        assert_eq!(
            settings.stream_endpoint("../x y").unwrap().as_str(),
            "ws://localhost:8000/ws/..%2Fx%20y"
        );
        assert!(ClientSettings {
            api_base: "mailto:ops@example.com".to_string(),
            ..ClientSettings::default()
        }
        .api_resource(&["tasks"])
        .is_err());
    }
}
