//! Recording session
//!
//! Per-session state machine (Idle -> Recording -> Stopped). All mutable
//! fields sit behind a lock owned by the session itself, so operations on one
//! session never contend with the registry or with other sessions.

use super::connection::ConnectionHandle;
use super::state::{
    AppendOutcome, ChunkSource, ChunkStats, RecordingState, SessionStatus, WriterReport,
};
use super::writer::{OutputWriter, WriterDone};
use crate::utils::error::{RecordingError, RecordingResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

/// Mutable part of a session, guarded by the session lock
#[derive(Default)]
struct SessionInner {
    state: RecordingState,

    /// Set while the output file is being created
    starting: bool,

    /// Set once a removal has claimed the session
    removed: bool,

    /// Producer end of the chunk queue, present only while recording
    chunk_tx: Option<mpsc::Sender<Vec<u8>>>,

    /// Writer completion signal, present once recording has started
    writer_done: Option<WriterDone>,

    connection: Option<ConnectionHandle>,

    /// Lifetime timer armed by the supervisor
    timer: Option<JoinHandle<()>>,

    recording_started_at: Option<DateTime<Utc>>,
    recording_stopped_at: Option<DateTime<Utc>>,
}

/// Writer settings a session is started with
#[derive(Debug, Clone, Copy)]
pub struct WriterSettings {
    pub queue_capacity: usize,
    pub buffer_size: usize,
}

/// One recording lifecycle bound to one output file
pub struct RecordingSession {
    id: String,
    output_path: PathBuf,
    start_time: DateTime<Utc>,
    inner: RwLock<SessionInner>,

    queued_chunks: AtomicU64,
    queued_bytes: AtomicU64,
    dropped_chunks: AtomicU64,
    ignored_chunks: AtomicU64,
}

impl RecordingSession {
    /// Create an idle session
    pub fn new(id: String, output_path: PathBuf) -> Self {
        Self {
            id,
            output_path,
            start_time: Utc::now(),
            inner: RwLock::new(SessionInner::default()),
            queued_chunks: AtomicU64::new(0),
            queued_bytes: AtomicU64::new(0),
            dropped_chunks: AtomicU64::new(0),
            ignored_chunks: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn state(&self) -> RecordingState {
        self.inner.read().state
    }

    /// Chunk counters
    pub fn stats(&self) -> ChunkStats {
        ChunkStats {
            queued_chunks: self.queued_chunks.load(Ordering::Relaxed),
            queued_bytes: self.queued_bytes.load(Ordering::Relaxed),
            dropped_chunks: self.dropped_chunks.load(Ordering::Relaxed),
            ignored_chunks: self.ignored_chunks.load(Ordering::Relaxed),
        }
    }

    /// Snapshot taken under a single read of the session lock
    pub fn status(&self) -> SessionStatus {
        let inner = self.inner.read();
        SessionStatus {
            id: self.id.clone(),
            state: inner.state,
            start_time: self.start_time,
            recording_started_at: inner.recording_started_at,
            recording_stopped_at: inner.recording_stopped_at,
            output_path: self.output_path.clone(),
            has_connection: inner.connection.is_some(),
            stats: self.stats(),
            writer: inner.writer_done.as_ref().and_then(WriterDone::report),
        }
    }

    /// Idle -> Recording
    ///
    /// Truncates the output file and launches the writer. On failure the
    /// session stays idle and the call may be retried.
    pub async fn start(&self, settings: WriterSettings) -> RecordingResult<()> {
        {
            let mut inner = self.inner.write();
            if inner.removed {
                return Err(RecordingError::SessionNotFound(self.id.clone()));
            }
            let state = inner.state;
            match state {
                RecordingState::Recording => return Err(RecordingError::AlreadyRecording),
                RecordingState::Stopped => return Err(RecordingError::AlreadyStopped),
                RecordingState::Idle if inner.starting => {
                    return Err(RecordingError::AlreadyRecording)
                }
                RecordingState::Idle => inner.starting = true,
            }
        }

        let spawned = OutputWriter::new(&self.output_path)
            .queue_capacity(settings.queue_capacity)
            .buffer_size(settings.buffer_size)
            .spawn()
            .await;

        let (tx, done) = {
            let mut inner = self.inner.write();
            inner.starting = false;
            let (tx, done) = spawned?;
            if !inner.removed {
                inner.chunk_tx = Some(tx);
                inner.writer_done = Some(done);
                inner.state = RecordingState::Recording;
                inner.recording_started_at = Some(Utc::now());
                tracing::info!(
                    "Recording started for session {} -> {:?}",
                    self.id,
                    self.output_path
                );
                return Ok(());
            }
            (tx, done)
        };

        // Removed while the file was being created: finalize the empty file.
        drop(tx);
        done.wait().await;
        Err(RecordingError::SessionNotFound(self.id.clone()))
    }

    /// Queue a chunk for the writer without ever waiting
    ///
    /// When the queue is full the chunk is dropped and `Ok(Dropped)` is
    /// returned: a slow disk must not stall the producers.
    pub fn append(&self, source: ChunkSource, payload: &[u8]) -> RecordingResult<AppendOutcome> {
        if payload.is_empty() {
            return Err(RecordingError::EmptyChunk);
        }

        let inner = self.inner.read();
        let tx = match &inner.chunk_tx {
            Some(tx) if inner.state.is_recording() => tx,
            _ => return Err(RecordingError::NotRecording),
        };

        if !source.is_persisted() {
            self.ignored_chunks.fetch_add(1, Ordering::Relaxed);
            return Ok(AppendOutcome::Ignored);
        }

        match tx.try_send(payload.to_vec()) {
            Ok(()) => {
                self.queued_chunks.fetch_add(1, Ordering::Relaxed);
                self.queued_bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);
                Ok(AppendOutcome::Queued)
            }
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_chunks.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(
                    "Chunk queue full for session {}, dropped {} bytes ({} dropped so far)",
                    self.id,
                    payload.len(),
                    dropped
                );
                Ok(AppendOutcome::Dropped)
            }
            Err(TrySendError::Closed(_)) => Err(RecordingError::StorageUnavailable(format!(
                "writer for session {} is no longer running",
                self.id
            ))),
        }
    }

    /// Recording -> Stopped, then wait for the writer to finalize the file
    ///
    /// A session that is already stopped waits on the same barrier, so every
    /// caller returns only once the file is durable.
    pub async fn stop(&self) -> RecordingResult<WriterReport> {
        let done = {
            let mut inner = self.inner.write();
            let state = inner.state;
            match state {
                RecordingState::Idle => return Err(RecordingError::NotRecording),
                RecordingState::Recording => {
                    inner.chunk_tx = None;
                    inner.state = RecordingState::Stopped;
                    inner.recording_stopped_at = Some(Utc::now());
                    tracing::info!("Stopping recording for session {}", self.id);
                }
                RecordingState::Stopped => {}
            }
            inner.writer_done.clone()
        };

        let report = match done {
            Some(done) => done.wait().await,
            None => WriterReport::default(),
        };

        if let Some(e) = &report.error {
            return Err(RecordingError::StorageUnavailable(format!(
                "recording {:?} incomplete: {}",
                self.output_path, e
            )));
        }
        Ok(report)
    }

    /// Stop if a writer was ever started, otherwise do nothing
    pub(crate) async fn stop_if_started(&self) -> RecordingResult<()> {
        match self.stop().await {
            Ok(_) | Err(RecordingError::NotRecording) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Store the transport connection; returns the one it replaces
    pub(crate) fn attach_connection(
        &self,
        connection: ConnectionHandle,
    ) -> RecordingResult<Option<ConnectionHandle>> {
        let mut inner = self.inner.write();
        if inner.removed {
            return Err(RecordingError::SessionNotFound(self.id.clone()));
        }
        Ok(inner.connection.replace(connection))
    }

    pub(crate) fn take_connection(&self) -> Option<ConnectionHandle> {
        self.inner.write().connection.take()
    }

    pub(crate) fn set_timer(&self, timer: JoinHandle<()>) {
        let mut inner = self.inner.write();
        if inner.removed {
            timer.abort();
        } else {
            inner.timer = Some(timer);
        }
    }

    pub(crate) fn take_timer(&self) -> Option<JoinHandle<()>> {
        self.inner.write().timer.take()
    }

    /// Claim the session for removal; false if another removal got there first
    pub(crate) fn mark_removed(&self) -> bool {
        let mut inner = self.inner.write();
        !std::mem::replace(&mut inner.removed, true)
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("id", &self.id)
            .field("output_path", &self.output_path)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SETTINGS: WriterSettings = WriterSettings {
        queue_capacity: 16,
        buffer_size: 64,
    };

    fn session_in(dir: &Path) -> RecordingSession {
        RecordingSession::new("s1".to_string(), dir.join("recording_s1.webm"))
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        session.start(SETTINGS).await.unwrap();
        assert!(matches!(session.start(SETTINGS).await, Err(RecordingError::AlreadyRecording)));

        session.stop().await.unwrap();
        assert!(matches!(session.start(SETTINGS).await, Err(RecordingError::AlreadyStopped)));
    }

    #[tokio::test]
    async fn test_append_requires_recording() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());

        assert!(matches!(
            session.append(ChunkSource::Screen, b"early"),
            Err(RecordingError::NotRecording)
        ));
        assert!(!session.output_path().exists());

        session.start(SETTINGS).await.unwrap();
        assert!(matches!(
            session.append(ChunkSource::Screen, b""),
            Err(RecordingError::EmptyChunk)
        ));
        assert_eq!(session.append(ChunkSource::Screen, b"AAA").unwrap(), AppendOutcome::Queued);
        session.stop().await.unwrap();

        assert!(matches!(
            session.append(ChunkSource::Screen, b"late"),
            Err(RecordingError::NotRecording)
        ));
        assert_eq!(std::fs::read(session.output_path()).unwrap(), b"AAA");
    }

    #[tokio::test]
    async fn test_webcam_chunks_are_not_persisted() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());
        session.start(SETTINGS).await.unwrap();

        assert_eq!(session.append(ChunkSource::Webcam, b"cam").unwrap(), AppendOutcome::Ignored);
        assert_eq!(session.append(ChunkSource::Screen, b"scr").unwrap(), AppendOutcome::Queued);
        session.stop().await.unwrap();

        let stats = session.stats();
        assert_eq!(stats.ignored_chunks, 1);
        assert_eq!(stats.queued_chunks, 1);
        assert_eq!(std::fs::read(session.output_path()).unwrap(), b"scr");
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_reordering() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());
        let settings = WriterSettings {
            queue_capacity: 1,
            buffer_size: 64,
        };
        session.start(settings).await.unwrap();

        // Current-thread runtime: the writer cannot run until we yield, so the
        // second chunk finds the single slot taken.
        assert_eq!(session.append(ChunkSource::Screen, b"first").unwrap(), AppendOutcome::Queued);
        assert_eq!(session.append(ChunkSource::Screen, b"second").unwrap(), AppendOutcome::Dropped);
        tokio::task::yield_now().await;

        let report = session.stop().await.unwrap();
        assert_eq!(report.chunks_written, 1);
        assert_eq!(session.stats().dropped_chunks, 1);
        assert_eq!(std::fs::read(session.output_path()).unwrap(), b"first");
    }

    #[tokio::test]
    async fn test_stop_on_idle_and_repeated_stop() {
        let dir = tempdir().unwrap();
        let session = session_in(dir.path());
        assert!(matches!(session.stop().await, Err(RecordingError::NotRecording)));

        session.start(SETTINGS).await.unwrap();
        session.append(ChunkSource::Screen, b"xyz").unwrap();
        let first = session.stop().await.unwrap();
        let second = session.stop().await.unwrap();
        assert_eq!(first, second);

        let status = session.status();
        assert_eq!(status.state, RecordingState::Stopped);
        assert_eq!(status.writer.unwrap().bytes_written, 3);
        assert!(status.recording_stopped_at.is_some());
    }

    #[tokio::test]
    async fn test_failed_start_stays_idle() {
        let dir = tempdir().unwrap();
        let session = RecordingSession::new(
            "s2".to_string(),
            dir.path().join("absent").join("recording_s2.webm"),
        );

        let err = session.start(SETTINGS).await.unwrap_err();
        assert!(matches!(err, RecordingError::StorageUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Idle);

        std::fs::create_dir_all(dir.path().join("absent")).unwrap();
        session.start(SETTINGS).await.unwrap();
        assert_eq!(session.state(), RecordingState::Recording);
        session.stop().await.unwrap();
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_write_failure_surfaces_after_barrier() {
        let session = RecordingSession::new("full".to_string(), PathBuf::from("/dev/full"));

        session.start(SETTINGS).await.unwrap();
        session.append(ChunkSource::Screen, b"does not fit").unwrap();

        let err = session.stop().await.unwrap_err();
        assert!(matches!(err, RecordingError::StorageUnavailable(_)));
        assert_eq!(session.state(), RecordingState::Stopped);
        assert!(session.status().writer.and_then(|w| w.error).is_some());

        // A later stop waits on the same finished writer and sees the same failure.
        assert!(matches!(session.stop().await, Err(RecordingError::StorageUnavailable(_))));
    }

    #[test]
    fn test_mark_removed_once() {
        let session = RecordingSession::new("s3".to_string(), PathBuf::from("x.webm"));
        assert!(session.mark_removed());
        assert!(!session.mark_removed());
    }
}
