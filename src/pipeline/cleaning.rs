use crate::error::Result;
use crate::observability::metrics;
use crate::pipeline::features::{self, GeoPoint, ZoneGrid};
use crate::pipeline::source;
use crate::pipeline::validation::{
    CompleteTrip, ExclusionLedger, ExclusionReason, RecordValidator,
};
use crate::types::{CleanedTripRecord, RawTripRecord};
use std::path::Path;
use std::time::Instant;
use tracing::{info, instrument};

/// Result of one cleaning run. The ledger travels with the records instead of
/// living on the pipeline.
#[derive(Debug, Clone, Default)]
pub struct CleaningOutcome {
    pub input_count: usize,
    pub records: Vec<CleanedTripRecord>,
    pub ledger: ExclusionLedger,
}

impl CleaningOutcome {
    pub fn excluded_count(&self) -> usize {
        self.ledger.len()
    }

    /// Share of input rows that survived cleaning, in percent.
    pub fn retention_pct(&self) -> f64 {
        if self.input_count == 0 {
            return 0.0;
        }
        self.records.len() as f64 / self.input_count as f64 * 100.0
    }
}

/// Validates raw trips and derives distance, speed, fare and zone features.
#[derive(Debug, Clone, Default)]
pub struct CleaningPipeline {
    validator: RecordValidator,
    zone_grid: ZoneGrid,
}

/// A validated trip with its distance and speed already computed.
struct MeasuredTrip {
    trip: CompleteTrip,
    distance_km: f64,
    speed_kmh: f64,
}

impl CleaningPipeline {
    pub fn new(validator: RecordValidator, zone_grid: ZoneGrid) -> Self {
        Self {
            validator,
            zone_grid,
        }
    }

    pub fn with_zone_grid(zone_grid: ZoneGrid) -> Self {
        Self::new(RecordValidator::default(), zone_grid)
    }

    /// Read up to `max_records` raw rows from `path` and clean them.
    #[instrument(skip(self), fields(grid = self.zone_grid.as_str()))]
    pub fn run(&self, path: &Path, max_records: usize) -> Result<CleaningOutcome> {
        let raw = source::read_raw_trips(path, max_records)?;
        Ok(self.clean(raw))
    }

    pub fn clean(&self, raw: Vec<RawTripRecord>) -> CleaningOutcome {
        let started = Instant::now();
        let input_count = raw.len();
        let mut ledger = ExclusionLedger::new();

        let valid = self.validator.validate(raw, &mut ledger);

        let rules = self.validator.rules();
        let measured: Vec<MeasuredTrip> = valid
            .into_iter()
            .filter_map(|trip| {
                let distance_km = features::haversine_km(trip.pickup, trip.dropoff);
                let speed_kmh = features::speed_kmh(distance_km, trip.trip_duration);
                if rules.speed_in_bounds(speed_kmh) {
                    Some(MeasuredTrip {
                        trip,
                        distance_km,
                        speed_kmh,
                    })
                } else {
                    ledger.push(trip.id, ExclusionReason::SpeedOutOfBounds);
                    None
                }
            })
            .collect();

        let pickups: Vec<GeoPoint> = measured.iter().map(|m| m.trip.pickup).collect();
        let dropoffs: Vec<GeoPoint> = measured.iter().map(|m| m.trip.dropoff).collect();
        let pickup_zones = self.zone_grid.assign(&pickups);
        let dropoff_zones = self.zone_grid.assign(&dropoffs);

        let records: Vec<CleanedTripRecord> = measured
            .into_iter()
            .zip(pickup_zones)
            .zip(dropoff_zones)
            .map(|((m, pickup_zone), dropoff_zone)| {
                let fare = features::fare_amount(m.distance_km, m.trip.trip_duration);
                CleanedTripRecord {
                    id: m.trip.id,
                    vendor_id: m.trip.vendor_id,
                    pickup_datetime: m.trip.pickup_datetime,
                    dropoff_datetime: m.trip.dropoff_datetime,
                    passenger_count: m.trip.passenger_count,
                    pickup_longitude: m.trip.pickup.longitude,
                    pickup_latitude: m.trip.pickup.latitude,
                    dropoff_longitude: m.trip.dropoff.longitude,
                    dropoff_latitude: m.trip.dropoff.latitude,
                    store_and_fwd_flag: m.trip.store_and_fwd_flag,
                    trip_duration: m.trip.trip_duration,
                    trip_distance_km: m.distance_km,
                    trip_speed_kmh: m.speed_kmh,
                    fare_amount: fare,
                    fare_per_km: features::fare_per_km(fare, m.distance_km),
                    pickup_zone,
                    dropoff_zone,
                }
            })
            .collect();

        metrics::cleaning::records_read(input_count);
        metrics::cleaning::records_cleaned(records.len());
        for (reason, count) in ledger.count_by_reason() {
            metrics::cleaning::records_excluded(reason.as_str(), count);
        }
        metrics::cleaning::duration(started.elapsed().as_secs_f64());

        info!(
            input = input_count,
            cleaned = records.len(),
            excluded = ledger.len(),
            "Cleaning complete"
        );

        CleaningOutcome {
            input_count,
            records,
            ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{datetime_format, StoreAndForward};

    fn raw(id: &str, pickup: (f64, f64), dropoff: (f64, f64), duration: i64) -> RawTripRecord {
        let start = datetime_format::parse("2016-03-14 17:00:00").unwrap();
        RawTripRecord {
            id: id.to_string(),
            vendor_id: 2,
            pickup_datetime: Some(start),
            dropoff_datetime: Some(start + chrono::Duration::seconds(duration)),
            passenger_count: 1,
            pickup_latitude: Some(pickup.0),
            pickup_longitude: Some(pickup.1),
            dropoff_latitude: Some(dropoff.0),
            dropoff_longitude: Some(dropoff.1),
            store_and_fwd_flag: StoreAndForward::No,
            trip_duration: duration,
        }
    }

    #[test]
    fn three_records_one_reversed_yields_two_cleaned() {
        let mut reversed = raw("rev", (40.75, -73.98), (40.76, -73.97), 600);
        reversed.dropoff_datetime = datetime_format::parse("2016-03-14 16:50:00");

        let outcome = CleaningPipeline::default().clean(vec![
            raw("a", (40.7128, -74.0060), (40.7589, -73.9851), 600),
            reversed,
            raw("b", (40.73, -73.99), (40.75, -73.98), 900),
        ]);

        assert_eq!(outcome.input_count, 3);
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.ledger.ids().collect::<Vec<_>>(), vec!["rev"]);
    }

    #[test]
    fn implausible_speeds_are_excluded_after_distance() {
        let outcome = CleaningPipeline::default().clean(vec![
            // Same point for ten minutes: 0 km/h.
            raw("parked", (40.75, -73.98), (40.75, -73.98), 600),
            // ~40 km in 60 s.
            raw("rocket", (40.50, -74.20), (40.90, -73.75), 60),
            raw("ok", (40.7128, -74.0060), (40.7589, -73.9851), 600),
        ]);

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.ledger.reason_for("parked"),
            Some(ExclusionReason::SpeedOutOfBounds)
        );
        assert_eq!(
            outcome.ledger.reason_for("rocket"),
            Some(ExclusionReason::SpeedOutOfBounds)
        );
    }

    #[test]
    fn cleaned_records_carry_fare_model_and_zone_labels() {
        let outcome = CleaningPipeline::default().clean(vec![raw(
            "a",
            (40.7128, -74.0060),
            (40.7589, -73.9851),
            600,
        )]);

        let rec = &outcome.records[0];
        assert_eq!(
            rec.fare_amount,
            features::round_to_cents(2.50 + 1.50 * rec.trip_distance_km + 0.50 * 10.0)
        );
        assert_eq!(rec.fare_per_km, features::fare_per_km(rec.fare_amount, rec.trip_distance_km));
        assert!(rec.pickup_zone.starts_with("Zone_"));
        assert_ne!(rec.pickup_zone, rec.dropoff_zone);
    }

    #[test]
    fn batch_relative_grid_bins_pickups_and_dropoffs_separately() {
        let pipeline = CleaningPipeline::with_zone_grid(ZoneGrid::BatchRelative);
        let outcome = pipeline.clean(vec![
            raw("a", (40.70, -74.00), (40.80, -73.90), 900),
            raw("b", (40.80, -73.90), (40.70, -74.00), 900),
        ]);

        // Each set spans the same range, so the minimum corner is bin 0 and the maximum bin 19.
        assert_eq!(outcome.records[0].pickup_zone, "Zone_0_0");
        assert_eq!(outcome.records[0].dropoff_zone, "Zone_19_19");
        assert_eq!(outcome.records[1].pickup_zone, "Zone_19_19");
    }

    #[test]
    fn empty_input_yields_empty_outcome() {
        let outcome = CleaningPipeline::default().clean(Vec::new());
        assert!(outcome.records.is_empty());
        assert!(outcome.ledger.is_empty());
        assert_eq!(outcome.retention_pct(), 0.0);
    }
}
