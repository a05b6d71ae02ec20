//! Timeout supervisor
//!
//! Every session gets one timer at creation. The timer is a maximum-lifetime
//! bound, not an idle timeout: activity never renews it. When it fires and
//! the session still exists, the session is evicted exactly as if it had been
//! deleted.

use async_trait::async_trait;
use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Something that can forcibly remove a session by id
#[async_trait]
pub trait Evict: Send + Sync + 'static {
    async fn evict(&self, id: &str);
}

/// Arm the lifetime timer for `id`
///
/// The timer only holds a weak reference: once the owner is dropped a
/// pending timer fires into nothing.
pub fn arm<E: Evict>(target: Weak<E>, id: String, lifetime: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(lifetime).await;

        match target.upgrade() {
            Some(target) => {
                tracing::debug!("Lifetime of session {} elapsed after {:?}", id, lifetime);
                target.evict(&id).await;
            }
            None => tracing::debug!("Lifetime timer for {} fired after shutdown", id),
        }
    })
}
