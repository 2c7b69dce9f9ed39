//! Base refresh types
//!
//! Defines the closed set of refreshable dashboard targets, their per-key
//! configuration, and the errors raised while building or parsing them.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the refresh layer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefreshError {
    /// No tokio runtime was available to drive the timers
    #[error("No tokio runtime available to drive refresh timers")]
    NoRuntime,

    /// A key name did not match any dashboard target
    #[error("Unknown refresh key: {0}")]
    UnknownKey(String),

    /// A polling interval of zero was supplied
    #[error("Refresh interval must be greater than zero")]
    InvalidInterval,
}

/// Number of refreshable dashboard targets
pub const KEY_COUNT: usize = 8;

/// A refreshable dashboard target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RefreshKey {
    /// Gallery moderation panel
    Gallery,
    /// Travel package listing
    TravelPackets,
    /// Contact form inbox
    Contacts,
    /// Review moderation panel
    Reviews,
    /// Notification feed
    Notifications,
    /// Server resource monitor
    ServerMonitoring,
    /// Backend log viewer
    Logging,
    /// API health badge
    BackendHealth,
}

impl RefreshKey {
    /// Every key, in dashboard display order
    pub const ALL: [RefreshKey; KEY_COUNT] = [
        RefreshKey::Gallery,
        RefreshKey::TravelPackets,
        RefreshKey::Contacts,
        RefreshKey::Reviews,
        RefreshKey::Notifications,
        RefreshKey::ServerMonitoring,
        RefreshKey::Logging,
        RefreshKey::BackendHealth,
    ];

    /// Returns the dashboard identifier for this key
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshKey::Gallery => "gallery",
            RefreshKey::TravelPackets => "travelPackets",
            RefreshKey::Contacts => "contacts",
            RefreshKey::Reviews => "reviews",
            RefreshKey::Notifications => "notifications",
            RefreshKey::ServerMonitoring => "serverMonitoring",
            RefreshKey::Logging => "logging",
            RefreshKey::BackendHealth => "backendHealth",
        }
    }

    /// Returns the polling interval this key starts with
    pub fn default_interval(&self) -> Duration {
        match self {
            RefreshKey::ServerMonitoring => Duration::from_secs(10),
            RefreshKey::Notifications | RefreshKey::Logging => Duration::from_secs(15),
            RefreshKey::BackendHealth => Duration::from_secs(60),
            RefreshKey::Gallery
            | RefreshKey::TravelPackets
            | RefreshKey::Contacts
            | RefreshKey::Reviews => Duration::from_secs(30),
        }
    }

    /// Returns true if this key polls out of the box
    pub fn enabled_by_default(&self) -> bool {
        matches!(self, RefreshKey::Notifications | RefreshKey::BackendHealth)
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for RefreshKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RefreshKey {
    type Err = RefreshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RefreshKey::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| RefreshError::UnknownKey(s.to_string()))
    }
}

/// Polling configuration for one key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    /// Whether this key's timer should run
    pub enabled: bool,
    /// Period between ticks
    pub interval: Duration,
    /// When the key's subscribers were last invoked
    pub last_refresh: Option<DateTime<Utc>>,
}

impl KeyConfig {
    /// Creates the out-of-the-box configuration for a key
    pub fn for_key(key: RefreshKey) -> Self {
        Self {
            enabled: key.enabled_by_default(),
            interval: key.default_interval(),
            last_refresh: None,
        }
    }
}

/// Timer state of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// No timer is pending for the key
    Stopped,
    /// A timer is ticking with the given period
    Running(Duration),
}

impl TimerState {
    /// Returns true if a timer is pending
    pub fn is_running(&self) -> bool {
        matches!(self, TimerState::Running(_))
    }
}

/// Rejects zero-length intervals
pub fn validate_interval(interval: Duration) -> Result<Duration, RefreshError> {
    if interval.is_zero() {
        Err(RefreshError::InvalidInterval)
    } else {
        Ok(interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_round_trips_through_str() {
        for key in RefreshKey::ALL {
            assert_eq!(key.as_str().parse::<RefreshKey>(), Ok(key));
        }
    }

    #[test]
    fn test_unknown_key() {
        assert_eq!(
            "payments".parse::<RefreshKey>(),
            Err(RefreshError::UnknownKey("payments".into()))
        );
    }

    #[test]
    fn test_key_serializes_camel_case() {
        let json = serde_json::to_string(&RefreshKey::TravelPackets).unwrap();
        assert_eq!(json, "\"travelPackets\"");

        let key: RefreshKey = serde_json::from_str("\"backendHealth\"").unwrap();
        assert_eq!(key, RefreshKey::BackendHealth);
    }

    #[test]
    fn test_default_intervals_in_range() {
        for key in RefreshKey::ALL {
            let secs = key.default_interval().as_secs();
            assert!((10..=60).contains(&secs), "{} has {}s", key, secs);
        }
    }

    #[test]
    fn test_index_matches_position() {
        for (i, key) in RefreshKey::ALL.iter().enumerate() {
            assert_eq!(key.index(), i);
        }
    }

    #[test]
    fn test_key_config_defaults() {
        let config = KeyConfig::for_key(RefreshKey::Notifications);
        assert!(config.enabled);
        assert_eq!(config.interval, Duration::from_secs(15));
        assert!(config.last_refresh.is_none());

        assert!(!KeyConfig::for_key(RefreshKey::Gallery).enabled);
    }

    #[test]
    fn test_timer_state_is_running() {
        assert!(TimerState::Running(Duration::from_secs(1)).is_running());
        assert!(!TimerState::Stopped.is_running());
    }

    #[test]
    fn test_validate_interval() {
        assert_eq!(validate_interval(Duration::ZERO), Err(RefreshError::InvalidInterval));
        assert!(validate_interval(Duration::from_millis(1)).is_ok());
    }
}
