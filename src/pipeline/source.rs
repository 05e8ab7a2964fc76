//! CSV readers and writers for the raw feed, the cleaned snapshot and the exclusion ledger.

use crate::error::{MobilityError, Result};
use crate::pipeline::validation::ExclusionLedger;
use crate::types::{CleanedTripRecord, RawTripRecord};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::{debug, info};

/// Column order of the cleaned snapshot.
pub const SNAPSHOT_COLUMNS: [&str; 17] = [
    "id",
    "vendor_id",
    "pickup_datetime",
    "dropoff_datetime",
    "passenger_count",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
    "store_and_fwd_flag",
    "trip_duration",
    "trip_distance_km",
    "trip_speed_kmh",
    "fare_amount",
    "fare_per_km",
    "pickup_zone",
    "dropoff_zone",
];

/// Read at most `max_records` rows from the raw trip feed.
///
/// Any open or parse failure is reported as `SourceUnavailable`; a partial
/// batch is never returned.
pub fn read_raw_trips(path: &Path, max_records: usize) -> Result<Vec<RawTripRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| MobilityError::source_unavailable(path, e))?;

    let mut records = Vec::with_capacity(max_records.min(10_000));
    for row in reader.deserialize::<RawTripRecord>().take(max_records) {
        let record = row.map_err(|e| MobilityError::source_unavailable(path, e))?;
        records.push(record);
    }

    debug!(path = %path.display(), rows = records.len(), "Read raw trip rows");
    Ok(records)
}

/// Read cleaned records from a snapshot, skipping `offset` rows and taking up to `limit`.
pub fn read_cleaned_snapshot(
    path: &Path,
    offset: usize,
    limit: Option<usize>,
) -> Result<Vec<CleanedTripRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| MobilityError::source_unavailable(path, e))?;

    let rows = reader.deserialize::<CleanedTripRecord>().skip(offset);
    let rows: Box<dyn Iterator<Item = csv::Result<CleanedTripRecord>>> = match limit {
        Some(limit) => Box::new(rows.take(limit)),
        None => Box::new(rows),
    };

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(|e| MobilityError::source_unavailable(path, e))?);
    }
    Ok(records)
}

/// Number of data rows in a cleaned snapshot.
pub fn count_snapshot_rows(path: &Path) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| MobilityError::source_unavailable(path, e))?;
    let mut count = 0;
    for row in reader.records() {
        row.map_err(|e| MobilityError::source_unavailable(path, e))?;
        count += 1;
    }
    Ok(count)
}

/// Overwrite `path` with a header row plus one row per cleaned record.
pub fn write_cleaned_snapshot(path: &Path, records: &[CleanedTripRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    if records.is_empty() {
        writer.write_record(SNAPSHOT_COLUMNS)?;
    }
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = records.len(), "Wrote cleaned snapshot");
    Ok(())
}

/// Write excluded ids, one per line. Nothing is written for an empty ledger.
///
/// Returns whether a file was written.
pub fn write_ledger(path: &Path, ledger: &ExclusionLedger) -> Result<bool> {
    if ledger.is_empty() {
        return Ok(false);
    }
    let file = File::create(path)?;
    ledger.write_ids(BufWriter::new(file))?;
    info!(path = %path.display(), excluded = ledger.len(), "Wrote exclusion ledger");
    Ok(true)
}
