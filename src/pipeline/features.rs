//! Pure feature derivations for cleaned trips: great-circle distance, speed,
//! the synthetic fare model, and grid-based zone bucketing.

use crate::constants::{
    BASE_FARE, EARTH_RADIUS_KM, NYC_LAT_MAX, NYC_LAT_MIN, NYC_LON_MAX, NYC_LON_MIN, PER_KM_RATE,
    PER_MINUTE_RATE, ZONE_GRID_BINS, ZONE_LABEL_PREFIX,
};
use serde::{Deserialize, Serialize};

/// Distances below this are treated as zero when dividing by distance.
const MIN_DIVISOR_KM: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Haversine great-circle distance in kilometers. Inputs are degrees.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lon1) = (a.latitude.to_radians(), a.longitude.to_radians());
    let (lat2, lon2) = (b.latitude.to_radians(), b.longitude.to_radians());
    let sin_dlat = ((lat2 - lat1) * 0.5).sin();
    let sin_dlon = ((lon2 - lon1) * 0.5).sin();
    let h = sin_dlat * sin_dlat + lat1.cos() * lat2.cos() * sin_dlon * sin_dlon;
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Average speed in km/h. A non-positive duration yields 0.0 so the speed bound rejects it.
pub fn speed_kmh(distance_km: f64, duration_secs: i64) -> f64 {
    if duration_secs <= 0 {
        return 0.0;
    }
    distance_km / (duration_secs as f64 / 3600.0)
}

/// Base fare plus per-km and per-minute components, rounded to cents.
pub fn fare_amount(distance_km: f64, duration_secs: i64) -> f64 {
    round_to_cents(
        BASE_FARE + distance_km * PER_KM_RATE + (duration_secs as f64 / 60.0) * PER_MINUTE_RATE,
    )
}

/// Fare divided by distance, rounded to cents. `None` when the distance is effectively zero.
pub fn fare_per_km(fare: f64, distance_km: f64) -> Option<f64> {
    if distance_km.abs() < MIN_DIVISOR_KM {
        return None;
    }
    Some(round_to_cents(fare / distance_km))
}

pub fn round_to_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// How zone bin edges are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZoneGrid {
    /// Edges span the fixed NYC bounding box, so a location always gets the same label.
    #[default]
    Fixed,
    /// Edges span the min..max of the coordinates being bucketed. Labels depend on the batch.
    BatchRelative,
}

impl ZoneGrid {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneGrid::Fixed => "fixed",
            ZoneGrid::BatchRelative => "batch_relative",
        }
    }

    /// Label every point with `Zone_<lat_bin>_<lon_bin>`.
    ///
    /// Batch-relative edges are computed from `points` alone, so pickup and
    /// dropoff sets must be passed separately to reproduce per-set binning.
    pub fn assign(&self, points: &[GeoPoint]) -> Vec<String> {
        let (lat_axis, lon_axis) = match self {
            ZoneGrid::Fixed => (
                AxisBins::spanning(NYC_LAT_MIN, NYC_LAT_MAX, ZONE_GRID_BINS),
                AxisBins::spanning(NYC_LON_MIN, NYC_LON_MAX, ZONE_GRID_BINS),
            ),
            ZoneGrid::BatchRelative => {
                let lats: Vec<f64> = points.iter().map(|p| p.latitude).collect();
                let lons: Vec<f64> = points.iter().map(|p| p.longitude).collect();
                match (
                    AxisBins::observed(&lats, ZONE_GRID_BINS),
                    AxisBins::observed(&lons, ZONE_GRID_BINS),
                ) {
                    (Some(lat), Some(lon)) => (lat, lon),
                    _ => return Vec::new(),
                }
            }
        };

        points
            .iter()
            .map(|p| zone_label(lat_axis.bin_index(p.latitude), lon_axis.bin_index(p.longitude)))
            .collect()
    }
}

pub fn zone_label(lat_bin: usize, lon_bin: usize) -> String {
    format!("{ZONE_LABEL_PREFIX}_{lat_bin}_{lon_bin}")
}

/// Equal-width, right-closed bins along one axis.
#[derive(Debug, Clone)]
pub struct AxisBins {
    edges: Vec<f64>,
}

impl AxisBins {
    /// `bins` equal-width bins over `[min, max]`.
    pub fn spanning(min: f64, max: f64, bins: usize) -> Self {
        let bins = bins.max(1);
        let width = (max - min) / bins as f64;
        let mut edges: Vec<f64> = (0..=bins).map(|i| min + width * i as f64).collect();
        edges[bins] = max;
        Self { edges }
    }

    /// Bins over the observed range of `values`.
    ///
    /// The lowest edge is pushed down by 0.1% of the range so the minimum falls
    /// inside the first bin. A zero-width range is widened by 0.1% of its
    /// magnitude on both sides.
    pub fn observed(values: &[f64], bins: usize) -> Option<Self> {
        let (min, max) = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;

        if min == max {
            let pad = if min == 0.0 { 0.001 } else { 0.001 * min.abs() };
            return Some(Self::spanning(min - pad, max + pad, bins));
        }

        let mut axis = Self::spanning(min, max, bins);
        axis.edges[0] -= (max - min) * 0.001;
        Some(axis)
    }

    pub fn bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Index of the bin containing `value`; values beyond the edges clamp to the outer bins.
    pub fn bin_index(&self, value: f64) -> usize {
        let upper_edges = &self.edges[1..];
        upper_edges
            .partition_point(|&edge| edge < value)
            .min(self.bins() - 1)
    }
}
