//! Recording system module
//!
//! This module implements the session ingestion pipeline:
//! - SessionManager: registry of live sessions with a capacity bound
//! - RecordingSession: per-session Idle/Recording/Stopped state machine
//! - OutputWriter: one task per session draining a bounded chunk queue to disk
//! - supervisor: maximum-lifetime eviction timers

pub mod connection;
pub mod registry;
pub mod session;
pub mod state;
pub mod supervisor;
pub mod writer;

pub use connection::{ConnectionHandle, MediaConnection};
pub use registry::SessionManager;
pub use session::RecordingSession;
pub use state::{
    AppendOutcome, ChunkSource, ChunkStats, RecordingState, SessionStatus, WriterReport,
};
pub use writer::{OutputWriter, WriterDone};
