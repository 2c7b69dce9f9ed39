//! Refresh coordinator - Drives polling for every dashboard panel
//!
//! Owns the global auto-refresh switch, per-key configuration, the subscriber
//! registry, and one timer per running key. A timer exists for a key exactly
//! when auto-refresh is on and the key is enabled.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use super::base::{validate_interval, KeyConfig, RefreshError, RefreshKey, TimerState, KEY_COUNT};
use super::registry::{invoke_all, RefreshCallback, SubscriberRegistry, SubscriptionId};
use super::timer::RefreshTimer;
use crate::config::{KeySettings, RefreshSettings};

const DEFAULT_GLOBAL_INTERVAL: Duration = Duration::from_secs(30);

struct CoordinatorState {
    auto_refresh_enabled: bool,
    default_interval: Duration,
    keys: [KeyConfig; KEY_COUNT],
    timers: [Option<RefreshTimer>; KEY_COUNT],
    registry: SubscriberRegistry,
    disposed: bool,
}

impl CoordinatorState {
    fn wants_timer(&self, key: RefreshKey) -> bool {
        !self.disposed && self.auto_refresh_enabled && self.keys[key.index()].enabled
    }
}

type SharedState = Mutex<CoordinatorState>;

fn lock(shared: &SharedState) -> MutexGuard<'_, CoordinatorState> {
    // Callbacks never run under this lock, so a poisoned guard still holds consistent state
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coordinates periodic and manual refreshes of dashboard panels
pub struct RefreshCoordinator {
    shared: Arc<SharedState>,
    runtime: Handle,
}

impl RefreshCoordinator {
    /// Creates a coordinator with built-in defaults on the current tokio runtime
    pub fn new() -> Result<Self, RefreshError> {
        let runtime = Handle::try_current().map_err(|_| RefreshError::NoRuntime)?;
        Ok(Self::with_handle(runtime))
    }

    /// Creates a coordinator with built-in defaults on an explicit runtime
    pub fn with_handle(runtime: Handle) -> Self {
        Self::with_settings(runtime, &RefreshSettings::default())
    }

    /// Creates a coordinator from stored settings
    ///
    /// Zero intervals fall back to the key's built-in value.
    pub fn with_settings(runtime: Handle, settings: &RefreshSettings) -> Self {
        let keys = RefreshKey::ALL.map(|key| {
            let stored = settings.key(key);
            KeyConfig {
                enabled: stored.enabled,
                interval: validate_interval(stored.interval())
                    .unwrap_or_else(|_| key.default_interval()),
                last_refresh: None,
            }
        });

        let state = CoordinatorState {
            auto_refresh_enabled: settings.auto_refresh_enabled,
            default_interval: validate_interval(settings.default_interval())
                .unwrap_or(DEFAULT_GLOBAL_INTERVAL),
            keys,
            timers: Default::default(),
            registry: SubscriberRegistry::new(),
            disposed: false,
        };

        let coordinator = Self {
            shared: Arc::new(Mutex::new(state)),
            runtime,
        };

        {
            let mut state = lock(&coordinator.shared);
            for key in RefreshKey::ALL {
                coordinator.reconcile(&mut state, key);
            }
        }

        coordinator
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Sets the master switch, stopping or restoring every enabled key's timer
    pub fn set_auto_refresh(&self, enabled: bool) {
        let mut state = lock(&self.shared);
        if state.auto_refresh_enabled == enabled {
            return;
        }
        state.auto_refresh_enabled = enabled;

        for key in RefreshKey::ALL {
            self.reconcile(&mut state, key);
        }

        tracing::info!(
            "Auto-refresh {}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Updates the global default interval.
    ///
    /// The value is informational; running timers keep their own periods.
    pub fn set_global_interval(&self, interval: Duration) {
        if validate_interval(interval).is_err() {
            tracing::warn!("Ignoring zero global refresh interval");
            return;
        }
        lock(&self.shared).default_interval = interval;
    }

    /// Enables polling for a key
    pub fn enable_key(&self, key: RefreshKey) {
        let mut state = lock(&self.shared);
        state.keys[key.index()].enabled = true;
        self.reconcile(&mut state, key);
    }

    /// Disables polling for a key; its subscribers stay registered
    pub fn disable_key(&self, key: RefreshKey) {
        let mut state = lock(&self.shared);
        state.keys[key.index()].enabled = false;
        self.reconcile(&mut state, key);
    }

    /// Changes a key's period, restarting its timer from now if one is running
    pub fn set_key_interval(&self, key: RefreshKey, interval: Duration) {
        if validate_interval(interval).is_err() {
            tracing::warn!("Ignoring zero refresh interval for '{}'", key);
            return;
        }

        let mut state = lock(&self.shared);
        state.keys[key.index()].interval = interval;

        if state.timers[key.index()].is_some() {
            self.start_timer(&mut state, key);
        }
    }

    /// Invokes every subscriber of `key` now, whatever the enabled flags say.
    ///
    /// The key's timer phase is left untouched.
    pub fn refresh_now(&self, key: RefreshKey) {
        let callbacks = {
            let mut state = lock(&self.shared);
            state.keys[key.index()].last_refresh = Some(Utc::now());
            state.registry.snapshot(key)
        };

        tracing::debug!("Manual refresh of '{}' ({} subscribers)", key, callbacks.len());
        invoke_all(key, &callbacks);
    }

    /// Refreshes every enabled key now, even with auto-refresh off
    pub fn refresh_all(&self) {
        let enabled: Vec<RefreshKey> = {
            let state = lock(&self.shared);
            RefreshKey::ALL
                .into_iter()
                .filter(|key| state.keys[key.index()].enabled)
                .collect()
        };

        for key in enabled {
            self.refresh_now(key);
        }
    }

    /// Registers a callback for a key
    pub fn subscribe<F>(&self, key: RefreshKey, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.subscribe_callback(key, Arc::new(callback))
    }

    /// Registers a shared callback for a key
    ///
    /// The same callback may be registered several times; each returned
    /// handle removes only its own registration.
    pub fn subscribe_callback(&self, key: RefreshKey, callback: RefreshCallback) -> Subscription {
        let id = lock(&self.shared).registry.insert(key, callback);
        tracing::debug!("Subscriber {} registered for '{}'", id.get(), key);

        Subscription {
            key,
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    /// Stops every timer. No timer will start again on this coordinator.
    pub fn dispose(&self) {
        let timers: Vec<RefreshTimer> = {
            let mut state = lock(&self.shared);
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.timers.iter_mut().filter_map(Option::take).collect()
        };

        tracing::info!("Refresh coordinator disposed ({} timers stopped)", timers.len());
    }

    // ------------------------------------------------------------------
    // Read model
    // ------------------------------------------------------------------

    /// Returns the master auto-refresh switch
    pub fn is_auto_refresh_enabled(&self) -> bool {
        lock(&self.shared).auto_refresh_enabled
    }

    /// Returns the informational global interval
    pub fn default_interval(&self) -> Duration {
        lock(&self.shared).default_interval
    }

    /// Returns true once [`Self::dispose`] has run
    pub fn is_disposed(&self) -> bool {
        lock(&self.shared).disposed
    }

    /// Returns a copy of one key's configuration
    pub fn key_config(&self, key: RefreshKey) -> KeyConfig {
        lock(&self.shared).keys[key.index()].clone()
    }

    /// Returns whether a timer is pending for a key, and its interval
    pub fn timer_state(&self, key: RefreshKey) -> TimerState {
        match &lock(&self.shared).timers[key.index()] {
            Some(timer) => TimerState::Running(timer.interval()),
            None => TimerState::Stopped,
        }
    }

    /// Returns true if a timer is pending for a key
    pub fn is_timer_running(&self, key: RefreshKey) -> bool {
        self.timer_state(key).is_running()
    }

    /// Returns the number of keys with a pending timer
    pub fn active_timer_count(&self) -> usize {
        lock(&self.shared).timers.iter().filter(|t| t.is_some()).count()
    }

    /// Returns the number of keys whose enabled flag is set
    pub fn enabled_count(&self) -> usize {
        lock(&self.shared).keys.iter().filter(|c| c.enabled).count()
    }

    /// Returns the number of live subscriptions for a key
    pub fn subscriber_count(&self, key: RefreshKey) -> usize {
        lock(&self.shared).registry.count(key)
    }

    /// Captures the full read model for rendering
    pub fn snapshot(&self) -> RefreshSnapshot {
        let state = lock(&self.shared);

        RefreshSnapshot {
            auto_refresh_enabled: state.auto_refresh_enabled,
            default_interval_ms: duration_ms(state.default_interval),
            keys: RefreshKey::ALL
                .into_iter()
                .map(|key| {
                    let config = &state.keys[key.index()];
                    KeyStatus {
                        key,
                        enabled: config.enabled,
                        interval_ms: duration_ms(config.interval),
                        last_refresh: config.last_refresh,
                        timer_running: state.timers[key.index()].is_some(),
                        subscribers: state.registry.count(key),
                    }
                })
                .collect(),
        }
    }

    /// Exports the live configuration as storable settings
    pub fn settings(&self) -> RefreshSettings {
        let state = lock(&self.shared);

        RefreshSettings {
            auto_refresh_enabled: state.auto_refresh_enabled,
            default_interval_ms: duration_ms(state.default_interval).max(1),
            keys: RefreshKey::ALL
                .into_iter()
                .map(|key| {
                    let config = &state.keys[key.index()];
                    let settings = KeySettings {
                        enabled: config.enabled,
                        interval_ms: duration_ms(config.interval).max(1),
                    };
                    (key, settings)
                })
                .collect(),
        }
    }

    // ------------------------------------------------------------------
    // Timer bookkeeping
    // ------------------------------------------------------------------

    /// Brings the key's timer in line with the enabled flags
    fn reconcile(&self, state: &mut CoordinatorState, key: RefreshKey) {
        let running = state.timers[key.index()].is_some();

        match (state.wants_timer(key), running) {
            (true, false) => self.start_timer(state, key),
            (false, true) => {
                state.timers[key.index()] = None;
                tracing::info!("Stopped refresh timer for '{}'", key);
            }
            _ => {}
        }
    }

    /// Replaces any existing timer for the key with a fresh one
    fn start_timer(&self, state: &mut CoordinatorState, key: RefreshKey) {
        let interval = state.keys[key.index()].interval;
        let weak = Arc::downgrade(&self.shared);

        // Drop the old timer first so two never overlap
        state.timers[key.index()] = None;
        state.timers[key.index()] = Some(RefreshTimer::spawn(
            &self.runtime,
            key,
            interval,
            move |token| match weak.upgrade() {
                Some(shared) => tick(&shared, key, token),
                None => false,
            },
        ));

        tracing::info!("Started refresh timer for '{}' every {:?}", key, interval);
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Runs one periodic refresh; returns false if the timer was cancelled meanwhile
fn tick(shared: &SharedState, key: RefreshKey, token: &CancellationToken) -> bool {
    let callbacks = {
        let mut state = lock(shared);
        if token.is_cancelled() {
            return false;
        }
        state.keys[key.index()].last_refresh = Some(Utc::now());
        state.registry.snapshot(key)
    };

    tracing::debug!("Tick for '{}' ({} subscribers)", key, callbacks.len());
    invoke_all(key, &callbacks);
    true
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Handle returned by [`RefreshCoordinator::subscribe`]
#[must_use = "keep the Subscription to be able to unsubscribe later"]
pub struct Subscription {
    key: RefreshKey,
    id: SubscriptionId,
    shared: Weak<SharedState>,
}

impl Subscription {
    pub fn key(&self) -> RefreshKey {
        self.key
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Removes this registration. Safe to call repeatedly or after disposal.
    pub fn unsubscribe(&self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };

        if lock(&shared).registry.remove(self.key, self.id) {
            tracing::debug!("Subscriber {} removed from '{}'", self.id.get(), self.key);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

/// Read model of the whole coordinator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSnapshot {
    pub auto_refresh_enabled: bool,
    pub default_interval_ms: u64,
    pub keys: Vec<KeyStatus>,
}

impl RefreshSnapshot {
    /// Returns the status entry for a key
    pub fn key(&self, key: RefreshKey) -> Option<&KeyStatus> {
        self.keys.iter().find(|status| status.key == key)
    }
}

/// Read model of one key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStatus {
    pub key: RefreshKey,
    pub enabled: bool,
    pub interval_ms: u64,
    pub last_refresh: Option<DateTime<Utc>>,
    pub timer_running: bool,
    pub subscribers: usize,
}
