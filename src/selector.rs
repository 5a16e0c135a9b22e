//! Picks one nearby vehicle per compass direction.

use crate::geo::{self, GeoVector, Heading, Position};
use crate::parser::VehicleRecord;

/// A vehicle together with its offset from the reference position.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedVehicle {
    pub vehicle: VehicleRecord,
    pub geo: GeoVector,
}

impl AnnotatedVehicle {
    pub fn new(vehicle: VehicleRecord, from: Position) -> Self {
        let geo = geo::compute_between(from, vehicle.lat, vehicle.lon);
        Self { vehicle, geo }
    }

    pub fn heading(&self) -> Heading {
        self.geo.heading
    }
}

/// Attaches geometry relative to `from` to every vehicle.
pub fn annotate(vehicles: Vec<VehicleRecord>, from: Position) -> Vec<AnnotatedVehicle> {
    vehicles
        .into_iter()
        .map(|v| AnnotatedVehicle::new(v, from))
        .collect()
}

/// Sectors already represented in a selection.
#[derive(Debug, Default, Clone, Copy)]
struct Coverage([bool; 8]);

impl Coverage {
    fn contains(&self, heading: Heading) -> bool {
        self.0[heading.sector()]
    }

    /// Marks `heading` and both adjacent sectors.
    fn cover(&mut self, heading: Heading) {
        self.0[heading.sector()] = true;
        for neighbor in heading.neighbors() {
            self.0[neighbor.sector()] = true;
        }
    }

    fn is_full(&self) -> bool {
        self.0.iter().all(|&c| c)
    }
}

/// Greedy sector sweep over `vehicles`, closest first.
///
/// A vehicle is kept when its sector is not yet covered; keeping it covers
/// its own sector and the two next to it, so buses looping the same route
/// in roughly the same direction show up once. The result is in ascending
/// distance order and holds at most `max_results` entries.
pub fn select(mut vehicles: Vec<AnnotatedVehicle>, max_results: usize) -> Vec<AnnotatedVehicle> {
    // sort_by is stable, so equal distances keep their input order.
    vehicles.sort_by(|a, b| a.geo.distance_m.total_cmp(&b.geo.distance_m));

    let mut coverage = Coverage::default();
    let mut selected = Vec::new();

    for vehicle in vehicles {
        if coverage.is_full() {
            break;
        }
        if coverage.contains(vehicle.heading()) {
            continue;
        }
        coverage.cover(vehicle.heading());
        selected.push(vehicle);
    }

    selected.truncate(max_results);
    selected
}
