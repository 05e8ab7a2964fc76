//! Validity filters applied to raw trips before any features are derived.
//!
//! Each filter runs over the records that survived the previous one, so a
//! record is excluded by exactly one step and tagged with that step's reason.

use crate::constants::{
    MAX_PASSENGERS, MAX_SPEED_KMH, MAX_TRIP_DURATION_SECS, MIN_PASSENGERS, MIN_SPEED_KMH,
    MIN_TRIP_DURATION_SECS, NYC_LAT_MAX, NYC_LAT_MIN, NYC_LON_MAX, NYC_LON_MIN,
};
use crate::error::Result;
use crate::pipeline::features::GeoPoint;
use crate::types::{RawTripRecord, StoreAndForward};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use tracing::debug;

/// Why a record was dropped from the cleaned set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    DuplicateId,
    MissingFields,
    DropoffNotAfterPickup,
    OutsideGeofence,
    DurationOutOfBounds,
    PassengerCountOutOfBounds,
    SpeedOutOfBounds,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::DuplicateId => "duplicate_id",
            ExclusionReason::MissingFields => "missing_fields",
            ExclusionReason::DropoffNotAfterPickup => "dropoff_not_after_pickup",
            ExclusionReason::OutsideGeofence => "outside_geofence",
            ExclusionReason::DurationOutOfBounds => "duration_out_of_bounds",
            ExclusionReason::PassengerCountOutOfBounds => "passenger_count_out_of_bounds",
            ExclusionReason::SpeedOutOfBounds => "speed_out_of_bounds",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub id: String,
    pub reason: ExclusionReason,
}

/// Ordered record of every excluded id, in the order the filters dropped them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionLedger {
    entries: Vec<Exclusion>,
}

impl ExclusionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: impl Into<String>, reason: ExclusionReason) {
        self.entries.push(Exclusion {
            id: id.into(),
            reason,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.id.as_str())
    }

    pub fn reason_for(&self, id: &str) -> Option<ExclusionReason> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.reason)
    }

    pub fn count_by_reason(&self) -> BTreeMap<ExclusionReason, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.entries {
            *counts.entry(entry.reason).or_insert(0) += 1;
        }
        counts
    }

    /// Write one id per line.
    pub fn write_ids<W: Write>(&self, mut writer: W) -> Result<()> {
        for id in self.ids() {
            writeln!(writer, "{id}")?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Bounds applied by the validator. Defaults are the NYC cleaning thresholds.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationRules {
    pub lat_range: (f64, f64),
    pub lon_range: (f64, f64),
    pub duration_secs: (i64, i64),
    pub passengers: (i64, i64),
    pub speed_kmh: (f64, f64),
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            lat_range: (NYC_LAT_MIN, NYC_LAT_MAX),
            lon_range: (NYC_LON_MIN, NYC_LON_MAX),
            duration_secs: (MIN_TRIP_DURATION_SECS, MAX_TRIP_DURATION_SECS),
            passengers: (MIN_PASSENGERS, MAX_PASSENGERS),
            speed_kmh: (MIN_SPEED_KMH, MAX_SPEED_KMH),
        }
    }
}

impl ValidationRules {
    fn within_geofence(&self, point: GeoPoint) -> bool {
        let (lat_min, lat_max) = self.lat_range;
        let (lon_min, lon_max) = self.lon_range;
        (lat_min..=lat_max).contains(&point.latitude) && (lon_min..=lon_max).contains(&point.longitude)
    }

    pub fn speed_in_bounds(&self, speed_kmh: f64) -> bool {
        let (min, max) = self.speed_kmh;
        (min..=max).contains(&speed_kmh)
    }
}

/// A raw trip whose required fields are all present.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteTrip {
    pub id: String,
    pub vendor_id: i64,
    pub pickup_datetime: NaiveDateTime,
    pub dropoff_datetime: NaiveDateTime,
    pub passenger_count: i64,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub store_and_fwd_flag: StoreAndForward,
    pub trip_duration: i64,
}

impl CompleteTrip {
    fn from_raw(raw: RawTripRecord) -> std::result::Result<Self, String> {
        match (
            raw.pickup_datetime,
            raw.dropoff_datetime,
            raw.pickup_latitude,
            raw.pickup_longitude,
            raw.dropoff_latitude,
            raw.dropoff_longitude,
        ) {
            (Some(pickup_dt), Some(dropoff_dt), Some(plat), Some(plon), Some(dlat), Some(dlon)) => {
                Ok(Self {
                    id: raw.id,
                    vendor_id: raw.vendor_id,
                    pickup_datetime: pickup_dt,
                    dropoff_datetime: dropoff_dt,
                    passenger_count: raw.passenger_count,
                    pickup: GeoPoint::new(plat, plon),
                    dropoff: GeoPoint::new(dlat, dlon),
                    store_and_fwd_flag: raw.store_and_fwd_flag,
                    trip_duration: raw.trip_duration,
                })
            }
            _ => Err(raw.id),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordValidator {
    rules: ValidationRules,
}

impl RecordValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Run the structural filters in order and return the surviving trips.
    pub fn validate(
        &self,
        records: Vec<RawTripRecord>,
        ledger: &mut ExclusionLedger,
    ) -> Vec<CompleteTrip> {
        let before = records.len();

        let mut seen = HashSet::with_capacity(records.len());
        let mut unique = Vec::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id.clone()) {
                ledger.push(record.id, ExclusionReason::DuplicateId);
                continue;
            }
            unique.push(record);
        }

        let complete: Vec<CompleteTrip> = unique
            .into_iter()
            .filter_map(|raw| match CompleteTrip::from_raw(raw) {
                Ok(trip) => Some(trip),
                Err(id) => {
                    ledger.push(id, ExclusionReason::MissingFields);
                    None
                }
            })
            .collect();

        let rules = &self.rules;
        let survivors = retain_or_exclude(complete, ledger, ExclusionReason::DropoffNotAfterPickup, |t| {
            t.dropoff_datetime > t.pickup_datetime
        });
        let survivors = retain_or_exclude(survivors, ledger, ExclusionReason::OutsideGeofence, |t| {
            rules.within_geofence(t.pickup) && rules.within_geofence(t.dropoff)
        });
        let survivors = retain_or_exclude(survivors, ledger, ExclusionReason::DurationOutOfBounds, |t| {
            (rules.duration_secs.0..=rules.duration_secs.1).contains(&t.trip_duration)
        });
        let survivors = retain_or_exclude(
            survivors,
            ledger,
            ExclusionReason::PassengerCountOutOfBounds,
            |t| (rules.passengers.0..=rules.passengers.1).contains(&t.passenger_count),
        );

        debug!(
            input = before,
            surviving = survivors.len(),
            excluded = ledger.len(),
            "Structural validation complete"
        );
        survivors
    }
}

fn retain_or_exclude<F>(
    trips: Vec<CompleteTrip>,
    ledger: &mut ExclusionLedger,
    reason: ExclusionReason,
    keep: F,
) -> Vec<CompleteTrip>
where
    F: Fn(&CompleteTrip) -> bool,
{
    let mut kept = Vec::with_capacity(trips.len());
    for trip in trips {
        if keep(&trip) {
            kept.push(trip);
        } else {
            ledger.push(trip.id, reason);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::datetime_format;

    fn raw(id: &str) -> RawTripRecord {
        RawTripRecord {
            id: id.to_string(),
            vendor_id: 1,
            pickup_datetime: datetime_format::parse("2016-03-14 17:24:55"),
            dropoff_datetime: datetime_format::parse("2016-03-14 17:34:55"),
            passenger_count: 1,
            pickup_longitude: Some(-73.9821),
            pickup_latitude: Some(40.7679),
            dropoff_longitude: Some(-73.9646),
            dropoff_latitude: Some(40.7656),
            store_and_fwd_flag: StoreAndForward::No,
            trip_duration: 600,
        }
    }

    fn run(records: Vec<RawTripRecord>) -> (Vec<CompleteTrip>, ExclusionLedger) {
        let mut ledger = ExclusionLedger::new();
        let kept = RecordValidator::default().validate(records, &mut ledger);
        (kept, ledger)
    }

    #[test]
    fn keeps_first_occurrence_of_duplicate_ids() {
        let mut second = raw("id1");
        second.passenger_count = 3;
        let (kept, ledger) = run(vec![raw("id1"), second]);

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].passenger_count, 1);
        assert_eq!(ledger.reason_for("id1"), Some(ExclusionReason::DuplicateId));
    }

    #[test]
    fn drops_records_missing_timestamps_or_coordinates() {
        let mut no_pickup_time = raw("a");
        no_pickup_time.pickup_datetime = None;
        let mut no_dropoff_lat = raw("b");
        no_dropoff_lat.dropoff_latitude = None;

        let (kept, ledger) = run(vec![no_pickup_time, no_dropoff_lat, raw("c")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(ledger.reason_for("a"), Some(ExclusionReason::MissingFields));
        assert_eq!(ledger.reason_for("b"), Some(ExclusionReason::MissingFields));
    }

    #[test]
    fn dropoff_must_be_strictly_after_pickup() {
        let mut same = raw("same");
        same.dropoff_datetime = same.pickup_datetime;
        let mut before = raw("before");
        before.dropoff_datetime = datetime_format::parse("2016-03-14 17:00:00");

        let (kept, ledger) = run(vec![same, before, raw("ok")]);
        assert_eq!(kept.len(), 1);
        assert_eq!(
            ledger.ids().collect::<Vec<_>>(),
            vec!["same", "before"]
        );
    }

    #[test]
    fn geofence_bounds_are_inclusive() {
        let mut on_edge = raw("edge");
        on_edge.pickup_latitude = Some(NYC_LAT_MIN);
        on_edge.dropoff_longitude = Some(NYC_LON_MAX);
        let mut outside = raw("outside");
        outside.dropoff_latitude = Some(41.2);

        let (kept, ledger) = run(vec![on_edge, outside]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "edge");
        assert_eq!(ledger.reason_for("outside"), Some(ExclusionReason::OutsideGeofence));
    }

    #[test]
    fn duration_and_passenger_bounds() {
        let mut short = raw("short");
        short.trip_duration = 59;
        let mut long = raw("long");
        long.trip_duration = 21_601;
        let mut boundary = raw("boundary");
        boundary.trip_duration = 60;
        let mut empty_cab = raw("empty");
        empty_cab.passenger_count = 0;
        let mut crowded = raw("crowded");
        crowded.passenger_count = 7;

        let (kept, ledger) = run(vec![short, long, boundary, empty_cab, crowded]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "boundary");
        assert_eq!(ledger.reason_for("short"), Some(ExclusionReason::DurationOutOfBounds));
        assert_eq!(ledger.reason_for("long"), Some(ExclusionReason::DurationOutOfBounds));
        assert_eq!(
            ledger.reason_for("crowded"),
            Some(ExclusionReason::PassengerCountOutOfBounds)
        );
    }

    #[test]
    fn a_record_is_excluded_by_the_first_failing_step_only() {
        let mut bad = raw("bad");
        bad.dropoff_datetime = datetime_format::parse("2016-03-14 17:00:00");
        bad.pickup_latitude = Some(39.0);
        bad.passenger_count = 9;

        let (_, ledger) = run(vec![bad]);
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.reason_for("bad"),
            Some(ExclusionReason::DropoffNotAfterPickup)
        );
    }

    #[test]
    fn ledger_writes_one_id_per_line() {
        let mut ledger = ExclusionLedger::new();
        ledger.push("x1", ExclusionReason::DuplicateId);
        ledger.push("x2", ExclusionReason::SpeedOutOfBounds);

        let mut out = Vec::new();
        ledger.write_ids(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "x1\nx2\n");
        assert_eq!(ledger.count_by_reason().get(&ExclusionReason::SpeedOutOfBounds), Some(&1));
    }
}
