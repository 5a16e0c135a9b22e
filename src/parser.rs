//! Parser for the NextBus `vehicleLocations` XML feed.
//!
//! The feed is a flat list of self-closing `<vehicle .../>` elements, so a
//! pattern-based extractor is enough. Callers go through [`VehicleParser`]
//! and never see the regexes.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// A single vehicle position as reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleRecord {
    pub id: String,
    pub route_tag: String,
    pub lat: f64,
    pub lon: f64,
    pub secs_since_report: u64,
    /// Fetch time minus `secs_since_report`, in Unix milliseconds.
    pub observed_at_epoch_ms: i64,
    /// Every attribute found on the element, including the ones above.
    pub attributes: BTreeMap<String, String>,
}

impl VehicleRecord {
    /// Raw value of any wire attribute, e.g. `heading` or `dirTag`.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Whole seconds between the report and `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        now.timestamp_millis()
            .saturating_sub(self.observed_at_epoch_ms)
            / 1000
    }
}

/// Reason a single `<vehicle/>` element was dropped.
#[derive(Debug, Error, PartialEq)]
pub(crate) enum ParseSkip {
    #[error("missing attribute `{0}`")]
    Missing(&'static str),
    #[error("attribute `{name}` has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Turns a raw feed payload into vehicle records.
pub trait VehicleParser: Send + Sync {
    /// Parses every vehicle in `raw`. `fetched_at` is when the payload was
    /// received and anchors each record's observation time.
    fn parse(&self, raw: &str, fetched_at: DateTime<Utc>) -> Vec<VehicleRecord>;
}

/// Default [`VehicleParser`] backed by [`parse_vehicles`].
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexVehicleParser;

impl VehicleParser for RegexVehicleParser {
    fn parse(&self, raw: &str, fetched_at: DateTime<Utc>) -> Vec<VehicleRecord> {
        parse_vehicles(raw, fetched_at)
    }
}

fn vehicle_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"<vehicle\b([^>]*?)/>").unwrap())
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"([A-Za-z_][\w.:-]*)\s*=\s*"([^"]*)""#).unwrap())
}

/// Extracts all `<vehicle/>` elements from `raw`.
///
/// A payload without vehicles (for example an `<Error>` body) yields an
/// empty list. Elements with a missing or malformed `id`, `routeTag`,
/// `lat`, `lon` or `secsSinceReport` are skipped individually.
pub fn parse_vehicles(raw: &str, fetched_at: DateTime<Utc>) -> Vec<VehicleRecord> {
    let fetched_at_ms = fetched_at.timestamp_millis();
    let mut vehicles = Vec::new();

    for element in vehicle_pattern().captures_iter(raw) {
        let body = &element[1];
        match parse_element(body, fetched_at_ms) {
            Ok(vehicle) => vehicles.push(vehicle),
            Err(reason) => debug!(%reason, element = body.trim(), "Skipping vehicle element"),
        }
    }

    vehicles
}

fn parse_element(body: &str, fetched_at_ms: i64) -> Result<VehicleRecord, ParseSkip> {
    let attributes: BTreeMap<String, String> = attribute_pattern()
        .captures_iter(body)
        .map(|c| (c[1].to_string(), unescape(&c[2])))
        .collect();

    let text = |name: &'static str| {
        attributes
            .get(name)
            .map(String::as_str)
            .ok_or(ParseSkip::Missing(name))
    };
    let number = |name: &'static str| -> Result<f64, ParseSkip> {
        let value = text(name)?;
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ParseSkip::Invalid {
                name,
                value: value.to_string(),
            })
    };

    let id = text("id")?.to_string();
    let route_tag = text("routeTag")?.to_string();
    let lat = number("lat")?;
    let lon = number("lon")?;

    let secs = text("secsSinceReport")?;
    let secs_since_report = secs.trim().parse::<u64>().map_err(|_| ParseSkip::Invalid {
        name: "secsSinceReport",
        value: secs.to_string(),
    })?;

    // Reports older than the Unix epoch are garbage, not just stale.
    let observed_at_epoch_ms = i64::try_from(secs_since_report)
        .ok()
        .and_then(|s| s.checked_mul(1000))
        .and_then(|age_ms| fetched_at_ms.checked_sub(age_ms))
        .filter(|observed| *observed >= 0)
        .ok_or_else(|| ParseSkip::Invalid {
            name: "secsSinceReport",
            value: secs.to_string(),
        })?;

    Ok(VehicleRecord {
        id,
        route_tag,
        lat,
        lon,
        secs_since_report,
        observed_at_epoch_ms,
        attributes,
    })
}

fn unescape(value: &str) -> String {
    if !value.contains('&') {
        return value.to_string();
    }
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
