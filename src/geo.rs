//! Flat-earth distance and compass heading between two coordinates.
//!
//! Uses an equirectangular approximation: good enough for the few miles a
//! bus is away from the rider, wrong near the poles and across the
//! antimeridian.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Earth's circumference in meters.
pub const EARTH_CIRCUMFERENCE_M: f64 = 40_075_160.0;

/// Meters to statute miles.
pub const MILES_PER_METER: f64 = 0.000621371;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// One of the eight 45° compass bands, counter-clockwise from east.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heading {
    E,
    NE,
    N,
    NW,
    W,
    SW,
    S,
    SE,
}

impl Heading {
    /// All headings in sector order.
    pub const ALL: [Heading; 8] = [
        Heading::E,
        Heading::NE,
        Heading::N,
        Heading::NW,
        Heading::W,
        Heading::SW,
        Heading::S,
        Heading::SE,
    ];

    /// Maps any integer to its sector, wrapping modulo 8.
    pub fn from_sector(sector: i64) -> Self {
        Self::ALL[sector.rem_euclid(8) as usize]
    }

    /// Index of this heading in `ALL`, always in `0..8`.
    pub fn sector(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            Heading::E => "E",
            Heading::NE => "NE",
            Heading::N => "N",
            Heading::NW => "NW",
            Heading::W => "W",
            Heading::SW => "SW",
            Heading::S => "S",
            Heading::SE => "SE",
        }
    }

    /// The two angularly adjacent headings.
    pub fn neighbors(self) -> [Heading; 2] {
        let s = self.sector() as i64;
        [Self::from_sector(s - 1), Self::from_sector(s + 1)]
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Planar offset from a reference point to a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoVector {
    /// Eastward offset in meters.
    pub dx_m: f64,
    /// Northward offset in meters.
    pub dy_m: f64,
    pub distance_m: f64,
    pub distance_miles: f64,
    /// Counter-clockwise from east, in `(-π, π]`.
    pub bearing_radians: f64,
    pub heading: Heading,
}

impl GeoVector {
    pub fn sector(&self) -> usize {
        self.heading.sector()
    }

    pub fn label(&self) -> &'static str {
        self.heading.label()
    }
}

/// Computes the vector from `(from_lat, from_lon)` to `(to_lat, to_lon)`.
///
/// Identical points give a zero distance and heading `E`, since
/// `atan2(0, 0)` is `0`.
pub fn compute(from_lat: f64, from_lon: f64, to_lat: f64, to_lon: f64) -> GeoVector {
    let meters_per_degree = EARTH_CIRCUMFERENCE_M / 360.0;
    let dy_m = (to_lat - from_lat) * meters_per_degree;
    let dx_m = (to_lon - from_lon) * from_lat.to_radians().cos() * meters_per_degree;

    let distance_m = (dx_m * dx_m + dy_m * dy_m).sqrt();
    let bearing_radians = dy_m.atan2(dx_m);

    // Round half up, not half away from zero: -0.5 must land in sector 0.
    let sector = (bearing_radians * 4.0 / PI + 0.5).floor() as i64;

    GeoVector {
        dx_m,
        dy_m,
        distance_m,
        distance_miles: distance_m * MILES_PER_METER,
        bearing_radians,
        heading: Heading::from_sector(sector),
    }
}

/// Same as [`compute`], starting from a [`Position`].
pub fn compute_between(from: Position, to_lat: f64, to_lon: f64) -> GeoVector {
    compute(from.latitude, from.longitude, to_lat, to_lon)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAT: f64 = 37.8717;
    const LON: f64 = -122.2728;

    #[test]
    fn test_due_north_is_n() {
        let v = compute(LAT, LON, LAT + 0.01, LON);
        assert_eq!(v.heading, Heading::N);
        assert_eq!(v.label(), "N");
        assert!((v.distance_m - 1113.1989).abs() < 0.01);
        assert_eq!(format!("{:.2}", v.distance_miles), "0.69");
    }

    #[test]
    fn test_cardinal_and_intercardinal_directions() {
        let cases = [
            (0.0, 0.01, Heading::E),
            (0.01, 0.01, Heading::NE),
            (0.01, -0.01, Heading::NW),
            (0.0, -0.01, Heading::W),
            (-0.01, -0.01, Heading::SW),
            (-0.01, 0.0, Heading::S),
            (-0.01, 0.01, Heading::SE),
        ];
        // Longitude degrees shrink by cos(lat); scale so diagonals stay at 45°.
        let scale = 1.0 / LAT.to_radians().cos();
        for (dlat, dlon, expected) in cases {
            let v = compute(LAT, LON, LAT + dlat, LON + dlon * scale);
            assert_eq!(v.heading, expected, "dlat={dlat} dlon={dlon}");
        }
    }

    #[test]
    fn test_same_point_is_zero_and_east() {
        let v = compute(LAT, LON, LAT, LON);
        assert_eq!(v.distance_m, 0.0);
        assert_eq!(v.distance_miles, 0.0);
        assert_eq!(v.heading, Heading::E);
        assert_eq!(v.sector(), 0);
    }

    #[test]
    fn test_due_west_wraps_to_w() {
        let v = compute(LAT, LON, LAT, LON - 0.02);
        assert_eq!(v.heading, Heading::W);
        // Just south of due west gives a bearing near -π.
        let v = compute(LAT, LON, LAT - 0.000001, LON - 0.02);
        assert!(v.bearing_radians < 0.0);
        assert_eq!(v.heading, Heading::W);
    }

    #[test]
    fn test_sector_always_in_range_and_label_matches() {
        let labels = ["E", "NE", "N", "NW", "W", "SW", "S", "SE"];
        for i in 0..360 {
            let angle = (i as f64).to_radians();
            let v = compute(10.0, 20.0, 10.0 + 0.01 * angle.sin(), 20.0 + 0.01 * angle.cos());
            assert!(v.sector() < 8);
            assert_eq!(v.label(), labels[v.sector()]);
        }
    }

    #[test]
    fn test_compute_is_deterministic() {
        let a = compute(LAT, LON, 37.9, -122.3);
        let b = compute(LAT, LON, 37.9, -122.3);
        assert_eq!(a.distance_m.to_bits(), b.distance_m.to_bits());
        assert_eq!(a.bearing_radians.to_bits(), b.bearing_radians.to_bits());
        assert_eq!(a, b);
    }

    #[test]
    fn test_neighbors_wrap() {
        assert_eq!(Heading::E.neighbors(), [Heading::SE, Heading::NE]);
        assert_eq!(Heading::SE.neighbors(), [Heading::S, Heading::E]);
        assert_eq!(Heading::from_sector(-1), Heading::SE);
        assert_eq!(Heading::from_sector(9), Heading::NE);
    }

    #[test]
    fn test_compute_between_matches_compute() {
        let from = Position::new(LAT, LON);
        let between = compute_between(from, 37.8617, -122.2728);
        assert_eq!(between, compute(LAT, LON, 37.8617, -122.2728));
        assert_eq!(between.heading, Heading::S);
    }
}
