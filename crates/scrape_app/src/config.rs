//! Application settings: an optional RON file, then command-line overrides.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use scrape_client::ClientSettings;
use scrape_core::{EvictionPolicy, StoreSettings, DEFAULT_CAPACITY};
use scrape_logging::scrape_debug;
use serde::Deserialize;

use crate::cli::GlobalArgs;

pub const DEFAULT_CONFIG_FILE: &str = "scrape.ron";
pub const DEFAULT_STATE_DIR: &str = ".scrape_state";
const LOG_FILENAME: &str = "scrape.log";

/// Everything the config file may set. Missing keys keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    api_base: Option<String>,
    stream_base: Option<String>,
    state_dir: Option<PathBuf>,
    capacity: Option<usize>,
    eviction: Option<EvictionPolicy>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub client: ClientSettings,
    pub store: StoreSettings,
    pub state_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            client: ClientSettings::default(),
            store: StoreSettings::default(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
        }
    }
}

impl AppConfig {
    /// Reads `path`, or `./scrape.ron` when no path is given. Only an
    /// explicitly named file has to exist.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound && !required => {
                scrape_debug!("No config file at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        Self::from_ron(&content).with_context(|| format!("parsing {}", path.display()))
    }

    fn from_ron(content: &str) -> anyhow::Result<Self> {
        let file: FileConfig = ron::from_str(content)?;
        let mut config = Self::default();
        if let Some(api_base) = file.api_base {
            config.client.api_base = api_base;
        }
        if let Some(stream_base) = file.stream_base {
            config.client.stream_base = stream_base;
        }
        if let Some(state_dir) = file.state_dir {
            config.state_dir = state_dir;
        }
        if let Some(capacity) = file.capacity {
            anyhow::ensure!(capacity > 0, "capacity must be at least 1");
            config.store.capacity = capacity;
        }
        if let Some(eviction) = file.eviction {
            config.store.eviction = eviction;
        }
        if let Some(secs) = file.connect_timeout_secs {
            config.client.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = file.request_timeout_secs {
            config.client.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }

    pub fn apply_overrides(&mut self, args: &GlobalArgs) {
        if let Some(api) = &args.api {
            self.client.api_base.clone_from(api);
        }
        if let Some(ws) = &args.ws {
            self.client.stream_base.clone_from(ws);
        }
        if let Some(dir) = &args.state_dir {
            self.state_dir.clone_from(dir);
        }
        if args.pin_active {
            self.store.eviction = EvictionPolicy::PinActive;
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join(LOG_FILENAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_default_file_gives_defaults() {
        let config = AppConfig::from_ron("()").unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.store.capacity, DEFAULT_CAPACITY);
        assert_eq!(config.client.api_base, "http://localhost:8000/api");
    }

    #[test]
    fn file_values_replace_defaults() {
        let config = AppConfig::from_ron(
            r#"(
                api_base: Some("http://scraper:9000/api"),
                capacity: Some(25),
                eviction: Some(pin_active),
                request_timeout_secs: Some(90),
            )"#,
        )
        .unwrap();
        assert_eq!(config.client.api_base, "http://scraper:9000/api");
        assert_eq!(config.client.stream_base, "ws://localhost:8000/ws");
        assert_eq!(config.store.capacity, 25);
        assert_eq!(config.store.eviction, EvictionPolicy::PinActive);
        assert_eq!(config.client.request_timeout, Duration::from_secs(90));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(AppConfig::from_ron("(capacity: Some(0))").is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.ron");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn command_line_wins_over_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("scrape.ron");
        fs::write(&path, r#"(api_base: Some("http://from-file/api"))"#).unwrap();

        let mut config = AppConfig::load(Some(&path)).unwrap();
        config.apply_overrides(&GlobalArgs {
            api: Some("http://from-cli/api".to_string()),
            state_dir: Some(temp.path().join("state")),
            ..GlobalArgs::default()
        });
        assert_eq!(config.client.api_base, "http://from-cli/api");
        assert_eq!(config.state_dir, temp.path().join("state"));
        assert_eq!(config.log_path(), temp.path().join("state").join("scrape.log"));
    }
}
