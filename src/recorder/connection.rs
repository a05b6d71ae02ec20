//! External connection seam
//!
//! The transport layer owns its connections; a session only keeps a
//! back-reference so that deleting or evicting the session can close it.

use async_trait::async_trait;
use std::sync::Arc;

/// A transport-level connection feeding media into a session
#[async_trait]
pub trait MediaConnection: Send + Sync {
    /// Identifier used in logs
    fn id(&self) -> &str;

    /// Close the connection. Called at most once by the manager.
    async fn close(&self);
}

/// Shared handle as stored on a session
pub type ConnectionHandle = Arc<dyn MediaConnection>;
