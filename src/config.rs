//! Manager configuration: defaults, TOML file, environment overrides.

use crate::recorder::writer::{DEFAULT_QUEUE_CAPACITY, DEFAULT_WRITE_BUFFER_SIZE};
use crate::utils::error::{RecordingError, RecordingResult};
use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level config file structure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub recording: RecordingSection,
}

/// `[recording]` section of the config TOML.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordingSection {
    #[serde(default = "default_upload_folder")]
    pub upload_folder: String,
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_session_timeout_minutes")]
    pub session_timeout_minutes: u64,
    /// Takes precedence over `session_timeout_minutes` when set
    #[serde(default)]
    pub session_timeout_secs: Option<u64>,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_write_buffer_size")]
    pub write_buffer_size: usize,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

impl Default for RecordingSection {
    fn default() -> Self {
        Self {
            upload_folder: default_upload_folder(),
            max_sessions: default_max_sessions(),
            session_timeout_minutes: default_session_timeout_minutes(),
            session_timeout_secs: None,
            queue_capacity: default_queue_capacity(),
            write_buffer_size: default_write_buffer_size(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
        }
    }
}

fn default_upload_folder() -> String {
    "./recordings".to_string()
}
fn default_max_sessions() -> usize {
    10
}
fn default_session_timeout_minutes() -> u64 {
    30
}
fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}
fn default_write_buffer_size() -> usize {
    DEFAULT_WRITE_BUFFER_SIZE
}
fn default_file_prefix() -> String {
    "recording_".to_string()
}
fn default_file_extension() -> String {
    "webm".to_string()
}

/// Resolved manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Directory the session files are written to
    pub output_dir: PathBuf,
    /// Maximum number of live sessions
    pub max_sessions: usize,
    /// Maximum lifetime of a session, measured from creation
    pub session_timeout: Duration,
    /// Chunks buffered per session before new ones are dropped
    pub queue_capacity: usize,
    /// Size of each writer's in-memory buffer
    pub write_buffer_size: usize,
    pub file_prefix: String,
    pub file_extension: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(default_upload_folder()),
            max_sessions: default_max_sessions(),
            session_timeout: Duration::from_secs(default_session_timeout_minutes() * 60),
            queue_capacity: default_queue_capacity(),
            write_buffer_size: default_write_buffer_size(),
            file_prefix: default_file_prefix(),
            file_extension: default_file_extension(),
        }
    }
}

impl ManagerConfig {
    /// Defaults with the given output directory
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_max_sessions(mut self, max_sessions: usize) -> Self {
        self.max_sessions = max_sessions;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    fn from_section(section: RecordingSection) -> RecordingResult<Self> {
        let session_timeout = match section.session_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => minutes_to_duration(section.session_timeout_minutes).ok_or_else(|| {
                RecordingError::Config(format!(
                    "session_timeout_minutes out of range: {}",
                    section.session_timeout_minutes
                ))
            })?,
        };
        Ok(Self {
            output_dir: PathBuf::from(section.upload_folder),
            max_sessions: section.max_sessions,
            session_timeout,
            queue_capacity: section.queue_capacity,
            write_buffer_size: section.write_buffer_size,
            file_prefix: section.file_prefix,
            file_extension: section.file_extension,
        })
    }

    /// Parse a TOML document with a `[recording]` section
    pub fn from_toml_str(content: &str) -> RecordingResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| RecordingError::Config(format!("config parse error: {e}")))?;
        let config = Self::from_section(file.recording)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML config file; a missing file yields the defaults
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config file {:?} not found, using defaults", path);
            return Ok(Self::default());
        }
        tracing::info!("Loading config file {:?}", path);
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("loading {}", path.display()))
    }

    /// Defaults overridden by `UPLOAD_FOLDER`, `MAX_SESSIONS`,
    /// `SESSION_TIMEOUT_MINUTES` and `CHUNK_QUEUE_CAPACITY`
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup. Unparseable or out-of-range numbers
    /// are ignored.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(folder) = non_empty("UPLOAD_FOLDER") {
            self.output_dir = PathBuf::from(folder);
        }
        if let Some(n) = non_empty("MAX_SESSIONS").and_then(|v| v.parse().ok()) {
            self.max_sessions = n;
        }
        if let Some(timeout) = non_empty("SESSION_TIMEOUT_MINUTES")
            .and_then(|v| v.parse::<u64>().ok())
            .and_then(minutes_to_duration)
        {
            self.session_timeout = timeout;
        }
        if let Some(n) = non_empty("CHUNK_QUEUE_CAPACITY").and_then(|v| v.parse().ok()) {
            self.queue_capacity = n;
        }
        self
    }

    pub fn validate(&self) -> RecordingResult<()> {
        if self.max_sessions == 0 {
            return Err(RecordingError::Config("max_sessions must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(RecordingError::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.write_buffer_size == 0 {
            return Err(RecordingError::Config("write_buffer_size must be at least 1".to_string()));
        }
        if self.session_timeout.is_zero() {
            return Err(RecordingError::Config("session timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Deterministic output file for a session id
    pub fn output_path_for(&self, session_id: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}{}.{}", self.file_prefix, session_id, self.file_extension))
    }
}

fn minutes_to_duration(minutes: u64) -> Option<Duration> {
    minutes.checked_mul(60).map(Duration::from_secs)
}
