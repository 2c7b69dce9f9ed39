//! Dashboard Refresh - Keeps admin dashboard panels fresh by polling
//!
//! The travel agency dashboard has no push channel from its API, so every
//! panel (gallery, packages, contacts, reviews, notifications, server
//! monitoring, logs, backend health) polls on its own timer.
//!
//! ## Features
//!
//! - Global auto-refresh switch that pauses every panel at once
//! - Per-panel enable flag and polling interval
//! - Subscribe/unsubscribe registry so several widgets can share a panel key
//! - Manual "refresh now" and "refresh all" independent of the timers
//! - Panicking subscribers are isolated from each other and from the timers
//! - JSON settings file and a backend health probe
//!
//! ## Architecture
//!
//! - **Refresh**: the [`refresh::RefreshCoordinator`], its keys, timers and registry
//! - **Config**: persisted [`config::RefreshSettings`]
//! - **Probes**: data fetchers attached to refresh keys (backend health)

pub mod config;
pub mod probes;
pub mod refresh;

use std::sync::Arc;

use anyhow::Context;
use tokio::runtime::Handle;
use tracing_subscriber::filter::LevelFilter;

use config::RefreshSettings;
use probes::{HealthProbe, HealthProbeConfig};
use refresh::{RefreshCoordinator, RefreshKey, Subscription};

/// Initializes the tracing subscriber
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(LevelFilter::INFO.into())
        .add_directive(
            "dashboard_refresh=debug"
                .parse()
                .unwrap_or_else(|_| LevelFilter::DEBUG.into()),
        );

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Builds a coordinator from settings and attaches the default subscribers
pub fn build(
    runtime: Handle,
    settings: &RefreshSettings,
    health: Option<HealthProbeConfig>,
) -> anyhow::Result<(RefreshCoordinator, Vec<Subscription>)> {
    let coordinator = RefreshCoordinator::with_settings(runtime.clone(), settings);

    let mut subscriptions: Vec<Subscription> = RefreshKey::ALL
        .into_iter()
        .map(|key| {
            coordinator.subscribe(key, move || {
                tracing::info!("Refreshing '{}'", key);
            })
        })
        .collect();

    if let Some(config) = health {
        let url = config.url();
        let probe = HealthProbe::new(config).context("Failed to create health probe")?;
        let callback = Arc::new(probe).subscriber(runtime);
        subscriptions.push(coordinator.subscribe_callback(RefreshKey::BackendHealth, callback));
        tracing::info!("Backend health probe targeting {}", url);
    }

    Ok((coordinator, subscriptions))
}

/// Runs the refresh daemon until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    init_logging();

    tracing::info!("Starting dashboard refresh...");

    let settings = RefreshSettings::load();
    let (coordinator, _subscriptions) =
        build(Handle::current(), &settings, HealthProbeConfig::from_env())?;

    tracing::info!(
        "{} of {} panels enabled, auto-refresh {}",
        coordinator.enabled_count(),
        RefreshKey::ALL.len(),
        if coordinator.is_auto_refresh_enabled() { "on" } else { "off" }
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    coordinator.dispose();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_subscribes_every_key() {
        let (coordinator, subscriptions) =
            build(Handle::current(), &RefreshSettings::default(), None).unwrap();

        assert_eq!(subscriptions.len(), RefreshKey::ALL.len());
        for key in RefreshKey::ALL {
            assert_eq!(coordinator.subscriber_count(key), 1);
        }
        assert_eq!(coordinator.active_timer_count(), 2);
    }

    #[tokio::test]
    async fn test_build_with_health_probe() {
        let (coordinator, subscriptions) = build(
            Handle::current(),
            &RefreshSettings::default(),
            Some(HealthProbeConfig::new("http://127.0.0.1:9")),
        )
        .unwrap();

        assert_eq!(subscriptions.len(), RefreshKey::ALL.len() + 1);
        assert_eq!(coordinator.subscriber_count(RefreshKey::BackendHealth), 2);
    }
}
