//! Screenrecorder sessions - concurrent recording ingestion.
//!
//! Producers (upload handlers, transport callbacks) push opaque media chunks
//! into sessions; every session persists its chunks to a single output file
//! through a dedicated writer task. The manager enforces a session capacity,
//! the Idle/Recording/Stopped lifecycle and a maximum session lifetime.

pub mod config;
pub mod recorder;
pub mod utils;

pub use config::ManagerConfig;
pub use recorder::{
    AppendOutcome, ChunkSource, ConnectionHandle, MediaConnection, RecordingState, SessionManager,
    SessionStatus, WriterReport,
};
pub use utils::error::{ErrorResponse, RecordingError, RecordingResult};

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// Honors `RUST_LOG`; defaults to debug output for this crate. Calling it
/// more than once is harmless.
pub fn init_tracing() {
    let initialized = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "screenrecorder_sessions=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .is_ok();

    if initialized {
        tracing::info!("Starting screenrecorder-sessions v{}", env!("CARGO_PKG_VERSION"));
    }
}
