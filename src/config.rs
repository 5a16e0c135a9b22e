//! Runtime configuration.
//!
//! Stored as an optional JSON file; every field has a default:
//! ```json
//! {
//!   "provider_base_url": "http://webservices.nextbus.com",
//!   "subscriptions": [
//!     { "agency": "actransit", "route": "E" },
//!     { "agency": "actransit", "route": "F" }
//!   ],
//!   "refresh_interval_ms": 10000,
//!   "timeout_ms": 10000,
//!   "position_max_staleness_ms": 10000,
//!   "max_results": 5,
//!   "reference": { "latitude": 37.8717, "longitude": -122.2728 }
//! }
//! ```
//! A handful of environment variables override the file, see
//! [`RadarConfig::apply_env`].

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fetch::{DEFAULT_BASE_URL, RouteSubscription};
use crate::geo::Position;
use crate::refresh::{DEFAULT_MAX_RESULTS, RefreshSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadarConfig {
    pub provider_base_url: String,
    pub subscriptions: Vec<RouteSubscription>,
    pub refresh_interval_ms: u64,
    /// Bounds every route request and every position reading.
    pub timeout_ms: u64,
    pub position_max_staleness_ms: u64,
    pub max_results: usize,
    /// Position used until a location source reports one.
    pub reference: Position,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            provider_base_url: DEFAULT_BASE_URL.to_string(),
            subscriptions: vec![
                RouteSubscription::new("actransit", "E"),
                RouteSubscription::new("actransit", "F"),
            ],
            refresh_interval_ms: 10_000,
            timeout_ms: 10_000,
            position_max_staleness_ms: 10_000,
            max_results: DEFAULT_MAX_RESULTS,
            reference: Position::new(37.8717, -122.2728),
        }
    }
}

impl RadarConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        Self::from_json(&content).with_context(|| format!("parsing config '{path}'"))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Overrides fields from `RADAR_BASE_URL`, `RADAR_REFRESH_MS`,
    /// `RADAR_TIMEOUT_MS` and `RADAR_MAX_RESULTS` when set.
    pub fn apply_env(self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    fn apply_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(url) = var("RADAR_BASE_URL") {
            self.provider_base_url = url;
        }
        if let Some(ms) = var("RADAR_REFRESH_MS") {
            self.refresh_interval_ms = ms.parse().context("RADAR_REFRESH_MS")?;
        }
        if let Some(ms) = var("RADAR_TIMEOUT_MS") {
            self.timeout_ms = ms.parse().context("RADAR_TIMEOUT_MS")?;
        }
        if let Some(n) = var("RADAR_MAX_RESULTS") {
            self.max_results = n.parse().context("RADAR_MAX_RESULTS")?;
        }
        Ok(self)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn position_max_staleness(&self) -> Duration {
        Duration::from_millis(self.position_max_staleness_ms)
    }

    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            subscriptions: self.subscriptions.clone(),
            interval: Duration::from_millis(self.refresh_interval_ms),
            max_results: self.max_results,
        }
    }
}
