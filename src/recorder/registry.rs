//! Session registry
//!
//! Owns every live recording session, enforces the capacity bound and
//! exposes the operation set used by the network and transport layers.

use super::connection::ConnectionHandle;
use super::session::{RecordingSession, WriterSettings};
use super::state::{AppendOutcome, ChunkSource, SessionStatus, WriterReport};
use super::supervisor::{self, Evict};
use crate::config::ManagerConfig;
use crate::utils::error::{RecordingError, RecordingResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Why a session is being torn down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    Deleted,
    Evicted,
}

struct Registry {
    sessions: RwLock<HashMap<String, Arc<RecordingSession>>>,
    config: ManagerConfig,
}

/// Manages concurrent recording sessions
///
/// Cheap to clone; all clones share the same registry. Requires a running
/// tokio runtime, since writers and lifetime timers are spawned tasks.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Registry>,
}

impl SessionManager {
    /// Create a manager with the given configuration
    pub fn new(config: ManagerConfig) -> RecordingResult<Self> {
        config.validate()?;
        tracing::info!(
            "Session manager ready: dir {:?}, max {} sessions, lifetime {:?}",
            config.output_dir,
            config.max_sessions,
            config.session_timeout
        );
        Ok(Self {
            inner: Arc::new(Registry {
                sessions: RwLock::new(HashMap::new()),
                config,
            }),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.inner.config
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.max_sessions
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.inner.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.inner.sessions.read().contains_key(session_id)
    }

    /// Create an idle session and arm its lifetime timer
    pub async fn create(&self) -> RecordingResult<String> {
        let capacity = self.capacity();
        if self.len() >= capacity {
            return Err(RecordingError::CapacityExceeded(capacity));
        }

        let output_dir = &self.inner.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| {
                RecordingError::storage("failed to create output directory", output_dir, e)
            })?;

        let session_id = Uuid::new_v4().to_string();
        let output_path = self.inner.config.output_path_for(&session_id);
        let session = Arc::new(RecordingSession::new(session_id.clone(), output_path));

        {
            let mut sessions = self.inner.sessions.write();
            if sessions.len() >= capacity {
                return Err(RecordingError::CapacityExceeded(capacity));
            }
            sessions.insert(session_id.clone(), Arc::clone(&session));
        }

        let timer = supervisor::arm(
            Arc::downgrade(&self.inner),
            session_id.clone(),
            self.inner.config.session_timeout,
        );
        session.set_timer(timer);

        tracing::info!("Session {} created -> {:?}", session_id, session.output_path());
        Ok(session_id)
    }

    /// Status snapshot of a session
    pub fn get(&self, session_id: &str) -> RecordingResult<SessionStatus> {
        Ok(self.inner.lookup(session_id)?.status())
    }

    /// Output file of a session
    pub fn path(&self, session_id: &str) -> RecordingResult<PathBuf> {
        Ok(self.inner.lookup(session_id)?.output_path().to_path_buf())
    }

    /// Remember the transport connection so deletion can close it
    ///
    /// A different connection attached earlier is closed.
    pub async fn attach_connection(
        &self,
        session_id: &str,
        connection: ConnectionHandle,
    ) -> RecordingResult<()> {
        let session = self.inner.lookup(session_id)?;
        let replaced = match session.attach_connection(Arc::clone(&connection)) {
            Ok(replaced) => replaced,
            Err(e) => {
                connection.close().await;
                return Err(e);
            }
        };
        tracing::debug!("Connection {} attached to session {}", connection.id(), session_id);

        if let Some(old) = replaced {
            if !Arc::ptr_eq(&old, &connection) {
                tracing::debug!(
                    "Closing replaced connection {} of session {}",
                    old.id(),
                    session_id
                );
                old.close().await;
            }
        }
        Ok(())
    }

    /// Start recording: truncate the output file and launch the writer
    pub async fn start(&self, session_id: &str) -> RecordingResult<()> {
        let session = self.inner.lookup(session_id)?;
        session.start(self.inner.writer_settings()).await
    }

    /// Append a screen chunk; never waits
    pub fn append(&self, session_id: &str, payload: &[u8]) -> RecordingResult<AppendOutcome> {
        self.append_from(session_id, ChunkSource::Screen, payload)
    }

    /// Append a chunk from the given source; never waits
    pub fn append_from(
        &self,
        session_id: &str,
        source: ChunkSource,
        payload: &[u8],
    ) -> RecordingResult<AppendOutcome> {
        self.inner.lookup(session_id)?.append(source, payload)
    }

    /// Stop recording and wait until the output file is durable
    ///
    /// `NotRecording` for a session that never started. Stopping a session
    /// that is already stopped is not an error: it waits for the same writer
    /// and returns its report.
    pub async fn stop(&self, session_id: &str) -> RecordingResult<WriterReport> {
        let session = self.inner.lookup(session_id)?;
        session.stop().await
    }

    /// Stop if needed, close the connection and forget the session
    pub async fn remove(&self, session_id: &str) -> RecordingResult<()> {
        self.inner.remove(session_id, Removal::Deleted).await
    }

    /// Alias of [`SessionManager::remove`]
    pub async fn delete(&self, session_id: &str) -> RecordingResult<()> {
        self.remove(session_id).await
    }

    /// Remove every live session, finalizing all output files
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.inner.sessions.read().keys().cloned().collect();
        tracing::info!("Shutting down session manager ({} sessions)", ids.len());

        for id in ids {
            match self.inner.remove(&id, Removal::Deleted).await {
                Ok(()) | Err(RecordingError::SessionNotFound(_)) => {}
                Err(e) => tracing::warn!("Session {} did not shut down cleanly: {}", id, e),
            }
        }
    }
}

impl Registry {
    fn lookup(&self, session_id: &str) -> RecordingResult<Arc<RecordingSession>> {
        self.sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| RecordingError::SessionNotFound(session_id.to_string()))
    }

    fn writer_settings(&self) -> WriterSettings {
        WriterSettings {
            queue_capacity: self.config.queue_capacity,
            buffer_size: self.config.write_buffer_size,
        }
    }

    async fn remove(&self, session_id: &str, reason: Removal) -> RecordingResult<()> {
        let session = self.lookup(session_id)?;

        // An eviction runs inside the timer task and must not abort itself.
        if let Some(timer) = session.take_timer() {
            if reason == Removal::Deleted {
                timer.abort();
            }
        }
        if !session.mark_removed() {
            return Err(RecordingError::SessionNotFound(session_id.to_string()));
        }

        let stopped = session.stop_if_started().await;

        if let Some(connection) = session.take_connection() {
            tracing::debug!("Closing connection {} of session {}", connection.id(), session_id);
            connection.close().await;
        }

        {
            let mut sessions = self.sessions.write();
            if sessions.get(session_id).is_some_and(|s| Arc::ptr_eq(s, &session)) {
                sessions.remove(session_id);
            }
        }

        match reason {
            Removal::Deleted => tracing::info!("Session {} removed", session_id),
            Removal::Evicted => tracing::warn!(
                "Session {} evicted after reaching its maximum lifetime",
                session_id
            ),
        }

        if let Err(ref e) = stopped {
            tracing::error!("Session {} removed with incomplete output: {}", session_id, e);
        }
        stopped
    }
}

#[async_trait]
impl Evict for Registry {
    async fn evict(&self, id: &str) {
        match self.remove(id, Removal::Evicted).await {
            Ok(()) | Err(RecordingError::SessionNotFound(_)) => {}
            Err(e) => tracing::warn!("Eviction of session {} finished with error: {}", id, e),
        }
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        for session in self.sessions.get_mut().values() {
            if let Some(timer) = session.take_timer() {
                timer.abort();
            }
        }
    }
}
