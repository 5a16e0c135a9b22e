//! Text rendering of a selection and the sinks that display it.

use std::io::Write as _;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::selector::AnnotatedVehicle;

/// Shown when there is nothing to list.
pub const NO_VEHICLES: &str = "(no vehicles)";

/// Formats one line as `<routeTag>: <miles> mi <heading> (<age> sec)\n`.
pub fn format_line(vehicle: &AnnotatedVehicle, now: DateTime<Utc>) -> String {
    format!(
        "{}: {:.2} mi {} ({} sec)\n",
        vehicle.vehicle.route_tag,
        vehicle.geo.distance_miles,
        vehicle.geo.heading,
        vehicle.vehicle.age_secs(now),
    )
}

/// Renders every selected vehicle, or [`NO_VEHICLES`] for an empty selection.
pub fn render(selection: &[AnnotatedVehicle], now: DateTime<Utc>) -> String {
    if selection.is_empty() {
        return NO_VEHICLES.to_string();
    }

    selection.iter().map(|v| format_line(v, now)).collect()
}

/// Something that can show a rendered summary.
pub trait DisplaySink: Send + Sync {
    fn show(&self, text: &str);
}

/// Writes each summary to stdout, separated by a blank line.
#[derive(Debug, Default)]
pub struct StdoutDisplay;

impl DisplaySink for StdoutDisplay {
    fn show(&self, text: &str) {
        let mut out = std::io::stdout().lock();
        if let Err(e) = writeln!(out, "{}\n", text.trim_end()).and_then(|_| out.flush()) {
            warn!(error = %e, "Failed to write to stdout");
        }
    }
}

/// Emits each summary as a tracing event.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl DisplaySink for LogDisplay {
    fn show(&self, text: &str) {
        for line in text.lines() {
            info!(target: "vehicle_radar::display", "{line}");
        }
    }
}

/// Keeps every summary it is shown, most recent last.
#[derive(Debug, Default)]
pub struct MemoryDisplay {
    shown: Mutex<Vec<String>>,
}

impl MemoryDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<String> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn last(&self) -> Option<String> {
        self.shown.lock().ok().and_then(|s| s.last().cloned())
    }
}

impl DisplaySink for MemoryDisplay {
    fn show(&self, text: &str) {
        if let Ok(mut shown) = self.shown.lock() {
            shown.push(text.to_string());
        }
    }
}

impl<D: DisplaySink + ?Sized> DisplaySink for std::sync::Arc<D> {
    fn show(&self, text: &str) {
        (**self).show(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::Position;
    use crate::parser::VehicleRecord;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()
    }

    fn vehicle(route: &str, lat: f64, lon: f64, secs: u64) -> AnnotatedVehicle {
        let record = VehicleRecord {
            id: "1".to_string(),
            route_tag: route.to_string(),
            lat,
            lon,
            secs_since_report: secs,
            observed_at_epoch_ms: now().timestamp_millis() - secs as i64 * 1000,
            attributes: BTreeMap::new(),
        };
        AnnotatedVehicle::new(record, Position::new(37.8717, -122.2728))
    }

    #[test]
    fn test_format_line() {
        let v = vehicle("E", 37.8817, -122.2728, 30);
        assert_eq!(format_line(&v, now()), "E: 0.69 mi N (30 sec)\n");
    }

    #[test]
    fn test_age_grows_with_render_time() {
        let v = vehicle("F", 37.8617, -122.2728, 30);
        let later = now() + chrono::Duration::seconds(12);
        assert_eq!(format_line(&v, later), "F: 0.69 mi S (42 sec)\n");
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(render(&[], now()), "(no vehicles)");
    }

    #[test]
    fn test_render_multiple_lines() {
        let selection = vec![
            vehicle("E", 37.8817, -122.2728, 30),
            vehicle("F", 37.8617, -122.2728, 5),
        ];
        assert_eq!(
            render(&selection, now()),
            "E: 0.69 mi N (30 sec)\nF: 0.69 mi S (5 sec)\n"
        );
    }

    #[test]
    fn test_memory_display_records() {
        let display = MemoryDisplay::new();
        display.show("a");
        display.show("b");
        assert_eq!(display.shown(), ["a", "b"]);
        assert_eq!(display.last().as_deref(), Some("b"));
    }

    #[test]
    fn test_log_display_does_not_panic() {
        LogDisplay.show("E: 0.69 mi N (30 sec)\n");
    }
}
