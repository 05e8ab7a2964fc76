use super::{ConflictPolicy, ResetMode, TableCounts, TripStore, WriteBatch, WriteSummary};
use crate::constants::DATETIME_FORMAT;
use crate::error::Result;
use crate::types::{TripRow, Vendor, ZoneRecord};
use rusqlite::{params, Connection, OpenFlags, Transaction};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const SCHEMA_SQL: &str = include_str!("../../migrations/001_create_normalized_tables.sql");

/// SQLite-backed trip store. One connection, one transaction per `write_batch` call.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;
            "#,
        )?;
        debug!(path = %path.display(), "Opened SQLite store");
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// Open a read-only connection for query handlers.
pub fn open_read_connection<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX | OpenFlags::SQLITE_OPEN_URI,
    )?;
    conn.busy_timeout(busy_timeout)?;
    Ok(conn)
}

fn vendor_sql(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::SkipExisting => {
            "INSERT INTO vendors (vendor_id, vendor_name) VALUES (?1, ?2)
             ON CONFLICT(vendor_id) DO NOTHING"
        }
        ConflictPolicy::ReplaceExisting => {
            "INSERT INTO vendors (vendor_id, vendor_name) VALUES (?1, ?2)
             ON CONFLICT(vendor_id) DO UPDATE SET vendor_name = excluded.vendor_name"
        }
    }
}

fn zone_sql(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::SkipExisting => {
            "INSERT INTO zones (zone_name, latitude, longitude, trip_count) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(zone_name) DO NOTHING"
        }
        ConflictPolicy::ReplaceExisting => {
            "INSERT INTO zones (zone_name, latitude, longitude, trip_count) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(zone_name) DO UPDATE SET
                 latitude = excluded.latitude,
                 longitude = excluded.longitude,
                 trip_count = excluded.trip_count"
        }
    }
}

const TRIP_INSERT: &str = "INSERT INTO trips (
        id, vendor_id, pickup_datetime, dropoff_datetime, passenger_count,
        pickup_longitude, pickup_latitude, dropoff_longitude, dropoff_latitude,
        store_and_fwd_flag, trip_duration, trip_distance_km, trip_speed_kmh,
        fare_amount, fare_per_km, pickup_zone_id, dropoff_zone_id
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)";

fn trip_sql(policy: ConflictPolicy) -> String {
    match policy {
        ConflictPolicy::SkipExisting => format!("{TRIP_INSERT} ON CONFLICT(id) DO NOTHING"),
        ConflictPolicy::ReplaceExisting => format!(
            "{TRIP_INSERT} ON CONFLICT(id) DO UPDATE SET
                vendor_id = excluded.vendor_id,
                pickup_datetime = excluded.pickup_datetime,
                dropoff_datetime = excluded.dropoff_datetime,
                passenger_count = excluded.passenger_count,
                pickup_longitude = excluded.pickup_longitude,
                pickup_latitude = excluded.pickup_latitude,
                dropoff_longitude = excluded.dropoff_longitude,
                dropoff_latitude = excluded.dropoff_latitude,
                store_and_fwd_flag = excluded.store_and_fwd_flag,
                trip_duration = excluded.trip_duration,
                trip_distance_km = excluded.trip_distance_km,
                trip_speed_kmh = excluded.trip_speed_kmh,
                fare_amount = excluded.fare_amount,
                fare_per_km = excluded.fare_per_km,
                pickup_zone_id = excluded.pickup_zone_id,
                dropoff_zone_id = excluded.dropoff_zone_id"
        ),
    }
}

fn write_vendors(tx: &Transaction<'_>, rows: &[Vendor], policy: ConflictPolicy) -> Result<usize> {
    let mut stmt = tx.prepare(vendor_sql(policy))?;
    let mut written = 0;
    for vendor in rows {
        written += stmt.execute(params![vendor.vendor_id, vendor.vendor_name])?;
    }
    Ok(written)
}

fn write_zones(tx: &Transaction<'_>, rows: &[ZoneRecord], policy: ConflictPolicy) -> Result<usize> {
    let mut stmt = tx.prepare(zone_sql(policy))?;
    let mut written = 0;
    for zone in rows {
        written += stmt.execute(params![
            zone.zone_name,
            zone.latitude,
            zone.longitude,
            zone.trip_count
        ])?;
    }
    Ok(written)
}

fn write_trips(tx: &Transaction<'_>, rows: &[TripRow], policy: ConflictPolicy) -> Result<usize> {
    let sql = trip_sql(policy);
    let mut stmt = tx.prepare(&sql)?;
    let mut written = 0;
    for trip in rows {
        written += stmt.execute(params![
            trip.id,
            trip.vendor_id,
            trip.pickup_datetime.format(DATETIME_FORMAT).to_string(),
            trip.dropoff_datetime.format(DATETIME_FORMAT).to_string(),
            trip.passenger_count,
            trip.pickup_longitude,
            trip.pickup_latitude,
            trip.dropoff_longitude,
            trip.dropoff_latitude,
            trip.store_and_fwd_flag.as_str(),
            trip.trip_duration,
            trip.trip_distance_km,
            trip.trip_speed_kmh,
            trip.fare_amount,
            trip.fare_per_km,
            trip.pickup_zone_id,
            trip.dropoff_zone_id,
        ])?;
    }
    Ok(written)
}

fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count)
}

impl TripStore for SqliteStore {
    fn init_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(SCHEMA_SQL)?;
        info!("Schema ready (vendors, zones, trips)");
        Ok(())
    }

    fn write_batch(&mut self, batch: WriteBatch<'_>, policy: ConflictPolicy) -> Result<WriteSummary> {
        // Dropping the transaction on an early return rolls it back.
        let tx = self.conn.transaction()?;
        let written = match batch {
            WriteBatch::Vendors(rows) => write_vendors(&tx, rows, policy)?,
            WriteBatch::Zones(rows) => write_zones(&tx, rows, policy)?,
            WriteBatch::Trips(rows) => write_trips(&tx, rows, policy)?,
        };
        tx.commit()?;

        let summary = WriteSummary {
            written,
            skipped: batch.len() - written,
        };
        debug!(
            table = batch.table(),
            written = summary.written,
            skipped = summary.skipped,
            "Committed batch"
        );
        Ok(summary)
    }

    fn zone_ids(&self) -> Result<HashMap<String, i64>> {
        let mut stmt = self.conn.prepare("SELECT zone_name, id FROM zones")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut map = HashMap::new();
        for row in rows {
            let (name, id) = row?;
            map.insert(name, id);
        }
        Ok(map)
    }

    fn trip_count(&self) -> Result<i64> {
        count_rows(&self.conn, "trips")
    }

    fn counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            vendors: count_rows(&self.conn, "vendors")?,
            zones: count_rows(&self.conn, "zones")?,
            trips: count_rows(&self.conn, "trips")?,
        })
    }

    fn reset(&mut self, mode: ResetMode) -> Result<()> {
        let tx = self.conn.transaction()?;
        match mode {
            ResetMode::Recreate => {
                tx.execute_batch(
                    r#"
                    DROP TABLE IF EXISTS trips;
                    DROP TABLE IF EXISTS zones;
                    DROP TABLE IF EXISTS vendors;
                    "#,
                )?;
                tx.execute_batch(SCHEMA_SQL)?;
            }
            ResetMode::ClearData => {
                tx.execute_batch(
                    r#"
                    DELETE FROM trips;
                    DELETE FROM zones;
                    DELETE FROM vendors;
                    "#,
                )?;
            }
        }
        tx.commit()?;
        info!(?mode, "Store reset");
        Ok(())
    }
}
