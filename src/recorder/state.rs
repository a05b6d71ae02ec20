//! Recording state management
//!
//! Defines the session state machine and the snapshot types handed back to
//! callers.

use crate::utils::error::RecordingError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Lifecycle state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingState {
    /// Created, writer not started yet
    Idle,
    /// Writer active, chunks accepted
    Recording,
    /// Writer flushed and file closed
    Stopped,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingState::Recording)
    }
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
            RecordingState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Producer a chunk came from
///
/// Only screen chunks are persisted to the session's output file. Webcam
/// chunks go through the same checks and are then discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSource {
    Screen,
    Webcam,
}

impl ChunkSource {
    /// Whether chunks from this source end up in the output file
    pub fn is_persisted(&self) -> bool {
        matches!(self, ChunkSource::Screen)
    }
}

impl FromStr for ChunkSource {
    type Err = RecordingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "screen" => Ok(ChunkSource::Screen),
            "webcam" => Ok(ChunkSource::Webcam),
            other => Err(RecordingError::InvalidSource(other.to_string())),
        }
    }
}

impl fmt::Display for ChunkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkSource::Screen => f.write_str("screen"),
            ChunkSource::Webcam => f.write_str("webcam"),
        }
    }
}

/// What happened to an accepted chunk
///
/// Callers are told success either way; the distinction exists for logging
/// and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Chunk queued for the writer
    Queued,
    /// Queue was full, chunk discarded
    Dropped,
    /// Chunk came from a source that is not persisted
    Ignored,
}

/// Chunk counters for one session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    /// Chunks handed to the writer queue
    pub queued_chunks: u64,

    /// Bytes handed to the writer queue
    pub queued_bytes: u64,

    /// Chunks discarded because the queue was full
    pub dropped_chunks: u64,

    /// Chunks accepted from non-persisted sources
    pub ignored_chunks: u64,
}

/// Final accounting published by an output writer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriterReport {
    /// Chunks committed to the file
    pub chunks_written: u64,

    /// Bytes committed to the file
    pub bytes_written: u64,

    /// First I/O failure, if any
    pub error: Option<String>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub id: String,

    pub state: RecordingState,

    /// When the session was created
    pub start_time: DateTime<Utc>,

    /// When the writer was started
    pub recording_started_at: Option<DateTime<Utc>>,

    /// When the stop was requested
    pub recording_stopped_at: Option<DateTime<Utc>>,

    pub output_path: PathBuf,

    /// Whether an external connection is attached
    pub has_connection: bool,

    pub stats: ChunkStats,

    /// Writer outcome, once the writer has finished
    pub writer: Option<WriterReport>,
}

impl SessionStatus {
    /// Milliseconds spent recording so far (or in total, once stopped)
    pub fn duration_ms(&self) -> i64 {
        match self.recording_started_at {
            Some(started) => {
                let end = self.recording_stopped_at.unwrap_or_else(Utc::now);
                (end - started).num_milliseconds().max(0)
            }
            None => 0,
        }
    }
}
