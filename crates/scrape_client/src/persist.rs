use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use scrape_core::{StorageError, TaskRecord, TaskStorage};
use scrape_logging::scrape_debug;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// File holding the task history inside the state directory.
pub const HISTORY_FILENAME: &str = "tasks.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Makes sure `dir` exists and accepts new files.
pub fn ensure_state_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StateDir(format!(
                "{} is not a directory",
                dir.display()
            )));
        }
    } else {
        fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
    }
    NamedTempFile::new_in(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
    Ok(())
}

/// Writes whole files through a temp file and a rename, so readers see the
/// old content or the new one and nothing in between.
///
/// The directory is expected to exist; see [`ensure_state_dir`].
pub struct AtomicFileWriter {
    dir: PathBuf,
}

impl AtomicFileWriter {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn write(&self, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
        let target = self.dir.join(filename);
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.flush()?;
        tmp.as_file_mut().sync_all()?;

        tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
        Ok(target)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedHistory {
    #[serde(default)]
    tasks: Vec<TaskRecord>,
}

/// Task history kept as RON in `{dir}/tasks.ron`.
pub struct RonFileStorage {
    writer: AtomicFileWriter,
    path: PathBuf,
}

impl RonFileStorage {
    /// Prepares `dir` (see [`ensure_state_dir`]) and reads and writes the
    /// history file inside it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let dir = dir.into();
        ensure_state_dir(&dir)?;
        let path = dir.join(HISTORY_FILENAME);
        Ok(Self {
            writer: AtomicFileWriter::new(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskStorage for RonFileStorage {
    fn load(&self) -> Result<Vec<TaskRecord>, StorageError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                scrape_debug!("No task history at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(err) => {
                return Err(StorageError::Unreadable(format!(
                    "{}: {err}",
                    self.path.display()
                )))
            }
        };

        let history: PersistedHistory = ron::from_str(&content)
            .map_err(|err| StorageError::Malformed(format!("{}: {err}", self.path.display())))?;
        Ok(history.tasks)
    }

    fn save(&self, records: &[TaskRecord]) -> Result<(), StorageError> {
        let history = PersistedHistory {
            tasks: records.to_vec(),
        };
        let pretty = ron::ser::PrettyConfig::new();
        let content = ron::ser::to_string_pretty(&history, pretty)
            .map_err(|err| StorageError::Write(err.to_string()))?;
        self.writer
            .write(HISTORY_FILENAME, &content)
            .map_err(|err| StorageError::Write(err.to_string()))?;
        Ok(())
    }
}
