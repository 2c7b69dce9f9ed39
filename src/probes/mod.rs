//! Probes module - Data fetchers driven by refresh keys
//!
//! Each probe implements [`RefreshSource`] and is attached to the
//! coordinator as an ordinary subscriber.

mod base;
mod health;

pub use base::{attach, source_callback, ProbeError, RefreshSource};
pub use health::{HealthProbe, HealthProbeConfig, HealthReport, HealthStatus, API_URL_ENV};
