//! Persistence for the normalized vendor, zone and trip tables.
//!
//! The loader talks to a [`TripStore`]; `SqliteStore` backs the CLI and the
//! HTTP layer, `InMemoryStore` backs tests.

mod in_memory;
mod sqlite;

pub use in_memory::InMemoryStore;
pub use sqlite::{open_read_connection, SqliteStore};

use crate::error::Result;
use crate::types::{TripRow, Vendor, ZoneRecord};
use serde::Serialize;
use std::collections::HashMap;

/// Rows for one table, written in a single transaction.
#[derive(Debug, Clone, Copy)]
pub enum WriteBatch<'a> {
    Vendors(&'a [Vendor]),
    Zones(&'a [ZoneRecord]),
    Trips(&'a [TripRow]),
}

impl WriteBatch<'_> {
    pub fn table(&self) -> &'static str {
        match self {
            WriteBatch::Vendors(_) => "vendors",
            WriteBatch::Zones(_) => "zones",
            WriteBatch::Trips(_) => "trips",
        }
    }

    pub fn len(&self) -> usize {
        match self {
            WriteBatch::Vendors(rows) => rows.len(),
            WriteBatch::Zones(rows) => rows.len(),
            WriteBatch::Trips(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What to do when a row's key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Insert-if-absent: existing rows are left untouched.
    SkipExisting,
    /// Upsert-replace: non-key columns are overwritten; generated ids are kept.
    ReplaceExisting,
}

/// How `reset` clears the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Drop all tables and recreate the schema.
    Recreate,
    /// Delete every row but keep the schema.
    ClearData,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub written: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub vendors: i64,
    pub zones: i64,
    pub trips: i64,
}

/// Storage trait for the normalized trip tables.
pub trait TripStore: Send {
    /// Create tables and indexes if they do not exist.
    fn init_schema(&mut self) -> Result<()>;

    /// Write one batch atomically. On error nothing from this batch is kept.
    fn write_batch(&mut self, batch: WriteBatch<'_>, policy: ConflictPolicy) -> Result<WriteSummary>;

    /// Current zone name to zone id mapping.
    fn zone_ids(&self) -> Result<HashMap<String, i64>>;

    fn trip_count(&self) -> Result<i64>;

    fn has_trips(&self) -> Result<bool> {
        Ok(self.trip_count()? > 0)
    }

    fn counts(&self) -> Result<TableCounts>;

    fn reset(&mut self, mode: ResetMode) -> Result<()>;
}
