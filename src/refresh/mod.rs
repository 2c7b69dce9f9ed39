//! Refresh module - Polling coordinator for dashboard panels
//!
//! Provides:
//! - The closed set of refreshable dashboard targets
//! - Per-key timers with a global auto-refresh switch
//! - An ordered subscriber registry with opaque unsubscribe handles

mod base;
mod coordinator;
mod registry;
mod timer;

pub use base::{validate_interval, KeyConfig, RefreshError, RefreshKey, TimerState, KEY_COUNT};
pub use coordinator::{KeyStatus, RefreshCoordinator, RefreshSnapshot, Subscription};
pub use registry::{RefreshCallback, SubscriptionId};
