//! Base types and traits for refresh sources
//!
//! A refresh source is the data fetcher behind one dashboard panel. The
//! coordinator only knows zero-argument callbacks, so [`source_callback`]
//! adapts an async source into one that spawns its fetch on the runtime.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::runtime::Handle;

use crate::refresh::{RefreshCallback, RefreshCoordinator, RefreshKey, Subscription};

/// Errors that can occur while refreshing a source
#[derive(Debug, Error)]
pub enum ProbeError {
    /// HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// Request failed before a response arrived
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend unhealthy: HTTP {0}")]
    Unhealthy(u16),
}

/// Data fetcher that refreshes when its key fires
#[async_trait]
pub trait RefreshSource: Send + Sync {
    /// Returns the key this source listens on
    fn key(&self) -> RefreshKey;

    /// Returns the display name for log lines
    fn name(&self) -> &'static str;

    /// Fetches fresh data, owning its own error state
    async fn refresh(&self) -> Result<(), ProbeError>;
}

/// Wraps a source in a callback that spawns one refresh per invocation.
///
/// Overlapping invocations run independently.
pub fn source_callback(source: Arc<dyn RefreshSource>, runtime: Handle) -> RefreshCallback {
    Arc::new(move || {
        let source = Arc::clone(&source);
        runtime.spawn(async move {
            if let Err(e) = source.refresh().await {
                tracing::warn!("Refresh of {} failed: {}", source.name(), e);
            }
        });
    })
}

/// Subscribes a source to its key on the coordinator
pub fn attach(
    coordinator: &RefreshCoordinator,
    source: Arc<dyn RefreshSource>,
    runtime: Handle,
) -> Subscription {
    let key = source.key();
    tracing::info!("Attaching {} to '{}'", source.name(), key);
    coordinator.subscribe_callback(key, source_callback(source, runtime))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct CountingSource {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl RefreshSource for CountingSource {
        fn key(&self) -> RefreshKey {
            RefreshKey::Reviews
        }

        fn name(&self) -> &'static str {
            "Counting Source"
        }

        async fn refresh(&self) -> Result<(), ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProbeError::Unhealthy(503))
            } else {
                Ok(())
            }
        }
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_attach_runs_source_on_refresh() {
        let coordinator = RefreshCoordinator::new().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail: false,
        });

        let sub = attach(&coordinator, source.clone(), Handle::current());
        assert_eq!(sub.key(), RefreshKey::Reviews);

        coordinator.refresh_now(RefreshKey::Reviews);
        coordinator.refresh_now(RefreshKey::Reviews);
        settle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failing_source_does_not_detach() {
        let coordinator = RefreshCoordinator::new().unwrap();
        let source = Arc::new(CountingSource {
            calls: AtomicU32::new(0),
            fail: true,
        });

        let _sub = attach(&coordinator, source.clone(), Handle::current());

        coordinator.refresh_now(RefreshKey::Reviews);
        settle().await;
        coordinator.refresh_now(RefreshKey::Reviews);
        settle().await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(coordinator.subscriber_count(RefreshKey::Reviews), 1);
    }
}
