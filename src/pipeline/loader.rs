//! Normalizes cleaned trips into vendor, zone and trip rows and writes them
//! to a [`TripStore`] in three ordered phases.
//!
//! Vendors and zones are each written in one transaction. Trips follow in
//! fixed-size chunks, one transaction per chunk, so a failure loses at most
//! the chunk in flight. Reloading the same batch inserts no duplicate trips
//! and overwrites zone statistics with the batch values.

use crate::constants::DEFAULT_CHUNK_SIZE;
use crate::error::Result;
use crate::observability::metrics;
use crate::storage::{ConflictPolicy, TripStore, WriteBatch};
use crate::types::{CleanedTripRecord, TripRow, Vendor, ZoneRecord};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;
use tracing::{error, info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub vendors_seen: usize,
    pub vendors_inserted: usize,
    pub zones_written: usize,
    pub trips_inserted: usize,
    pub trips_skipped: usize,
    pub unresolved_zone_refs: usize,
    pub chunks_committed: usize,
}

impl LoadReport {
    /// Add another report's counters to this one.
    pub fn absorb(&mut self, other: &LoadReport) {
        self.vendors_seen += other.vendors_seen;
        self.vendors_inserted += other.vendors_inserted;
        self.zones_written += other.zones_written;
        self.trips_inserted += other.trips_inserted;
        self.trips_skipped += other.trips_skipped;
        self.unresolved_zone_refs += other.unresolved_zone_refs;
        self.chunks_committed += other.chunks_committed;
    }
}

#[derive(Debug, Clone)]
pub struct Loader {
    chunk_size: usize,
}

impl Default for Loader {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Loader {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Write vendors, then zones, then trips.
    ///
    /// A store failure aborts the load and is returned as is; phases and
    /// chunks committed before it stay in the store.
    #[instrument(skip_all, fields(records = records.len(), chunk_size = self.chunk_size))]
    pub fn load(&self, store: &mut dyn TripStore, records: &[CleanedTripRecord]) -> Result<LoadReport> {
        let started = Instant::now();
        let mut report = LoadReport::default();

        let vendors = vendors_for(records);
        report.vendors_seen = vendors.len();
        let summary = store
            .write_batch(WriteBatch::Vendors(&vendors), ConflictPolicy::SkipExisting)
            .map_err(|e| fail("vendors", e))?;
        report.vendors_inserted = summary.written;
        metrics::loader::vendors_inserted(summary.written);

        let zones = zones_for(records);
        let summary = store
            .write_batch(WriteBatch::Zones(&zones), ConflictPolicy::ReplaceExisting)
            .map_err(|e| fail("zones", e))?;
        report.zones_written = summary.written;
        metrics::loader::zones_written(summary.written);

        let zone_ids = store.zone_ids().map_err(|e| fail("zone_ids", e))?;

        for chunk in records.chunks(self.chunk_size) {
            let mut unresolved = 0;
            let rows: Vec<TripRow> = chunk
                .iter()
                .map(|rec| {
                    let pickup = resolve(&zone_ids, &rec.pickup_zone, &mut unresolved);
                    let dropoff = resolve(&zone_ids, &rec.dropoff_zone, &mut unresolved);
                    TripRow::from_cleaned(rec, pickup, dropoff)
                })
                .collect();

            let summary = store
                .write_batch(WriteBatch::Trips(&rows), ConflictPolicy::SkipExisting)
                .map_err(|e| fail("trips", e))?;

            report.trips_inserted += summary.written;
            report.trips_skipped += summary.skipped;
            report.unresolved_zone_refs += unresolved;
            report.chunks_committed += 1;

            metrics::loader::trips_inserted(summary.written);
            metrics::loader::trips_skipped(summary.skipped);
            metrics::loader::unresolved_zone_refs(unresolved);
            metrics::loader::chunk_committed();
        }

        if report.unresolved_zone_refs > 0 {
            warn!(
                unresolved = report.unresolved_zone_refs,
                "Some zone labels had no zone id; stored with NULL references"
            );
        }

        metrics::loader::duration(started.elapsed().as_secs_f64());
        info!(
            vendors_inserted = report.vendors_inserted,
            zones_written = report.zones_written,
            trips_inserted = report.trips_inserted,
            trips_skipped = report.trips_skipped,
            chunks = report.chunks_committed,
            "Load complete"
        );
        Ok(report)
    }
}

fn fail(phase: &'static str, err: crate::error::MobilityError) -> crate::error::MobilityError {
    error!(phase, error = %err, "Load failed");
    metrics::loader::failure(phase);
    err
}

fn resolve(zone_ids: &HashMap<String, i64>, name: &str, misses: &mut usize) -> Option<i64> {
    let id = zone_ids.get(name).copied();
    if id.is_none() {
        *misses += 1;
    }
    id
}

/// Distinct vendors referenced by the batch, ordered by id.
pub fn vendors_for(records: &[CleanedTripRecord]) -> Vec<Vendor> {
    records
        .iter()
        .map(|r| r.vendor_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(Vendor::new)
        .collect()
}

#[derive(Default)]
struct ZoneAccumulator {
    lat_sum: f64,
    lon_sum: f64,
    trips: i64,
}

/// One zone row per distinct pickup or dropoff label.
///
/// A zone's coordinates are the mean of both endpoints of every record that
/// references it; its count is the number of such records.
pub fn zones_for(records: &[CleanedTripRecord]) -> Vec<ZoneRecord> {
    let mut acc: BTreeMap<&str, ZoneAccumulator> = BTreeMap::new();
    for rec in records {
        let pickup = rec.pickup_zone.as_str();
        let dropoff = rec.dropoff_zone.as_str();
        let names = std::iter::once(pickup).chain((dropoff != pickup).then_some(dropoff));
        for name in names {
            let entry = acc.entry(name).or_default();
            entry.lat_sum += rec.pickup_latitude + rec.dropoff_latitude;
            entry.lon_sum += rec.pickup_longitude + rec.dropoff_longitude;
            entry.trips += 1;
        }
    }

    acc.into_iter()
        .map(|(name, a)| {
            let points = (a.trips * 2) as f64;
            ZoneRecord {
                zone_name: name.to_string(),
                latitude: a.lat_sum / points,
                longitude: a.lon_sum / points,
                trip_count: a.trips,
            }
        })
        .collect()
}
