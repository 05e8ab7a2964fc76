use super::{ConflictPolicy, ResetMode, TableCounts, TripStore, WriteBatch, WriteSummary};
use crate::error::{MobilityError, Result};
use crate::types::{TripRow, Vendor, ZoneRecord};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// In-memory store for tests. Enforces the same keys and references as the SQLite schema.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    vendors: BTreeMap<i64, Vendor>,
    zones: BTreeMap<String, (i64, ZoneRecord)>,
    trips: BTreeMap<String, TripRow>,
    next_zone_id: i64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vendor(&self, vendor_id: i64) -> Option<&Vendor> {
        self.vendors.get(&vendor_id)
    }

    pub fn zone(&self, zone_name: &str) -> Option<&ZoneRecord> {
        self.zones.get(zone_name).map(|(_, zone)| zone)
    }

    pub fn trip(&self, id: &str) -> Option<&TripRow> {
        self.trips.get(id)
    }

    fn check_trip_refs(&self, trip: &TripRow) -> Result<()> {
        if !self.vendors.contains_key(&trip.vendor_id) {
            return Err(MobilityError::Constraint {
                table: "trips",
                detail: format!("trip {} references unknown vendor {}", trip.id, trip.vendor_id),
            });
        }
        for zone_id in [trip.pickup_zone_id, trip.dropoff_zone_id].into_iter().flatten() {
            if !self.zones.values().any(|(id, _)| *id == zone_id) {
                return Err(MobilityError::Constraint {
                    table: "trips",
                    detail: format!("trip {} references unknown zone id {}", trip.id, zone_id),
                });
            }
        }
        Ok(())
    }

    fn write_vendors(&mut self, rows: &[Vendor], policy: ConflictPolicy) -> usize {
        let mut written = 0;
        for vendor in rows {
            if self.vendors.contains_key(&vendor.vendor_id) && policy == ConflictPolicy::SkipExisting {
                continue;
            }
            self.vendors.insert(vendor.vendor_id, vendor.clone());
            written += 1;
        }
        written
    }

    fn write_zones(&mut self, rows: &[ZoneRecord], policy: ConflictPolicy) -> usize {
        let mut written = 0;
        for zone in rows {
            match self.zones.get_mut(&zone.zone_name) {
                Some(_) if policy == ConflictPolicy::SkipExisting => continue,
                Some((_, existing)) => *existing = zone.clone(),
                None => {
                    self.next_zone_id += 1;
                    self.zones
                        .insert(zone.zone_name.clone(), (self.next_zone_id, zone.clone()));
                }
            }
            written += 1;
        }
        written
    }

    fn write_trips(&mut self, rows: &[TripRow], policy: ConflictPolicy) -> Result<usize> {
        // Validate the whole batch first so a failure leaves nothing behind.
        for trip in rows {
            self.check_trip_refs(trip)?;
        }
        let mut written = 0;
        for trip in rows {
            if self.trips.contains_key(&trip.id) && policy == ConflictPolicy::SkipExisting {
                continue;
            }
            self.trips.insert(trip.id.clone(), trip.clone());
            written += 1;
        }
        Ok(written)
    }
}

impl TripStore for InMemoryStore {
    fn init_schema(&mut self) -> Result<()> {
        Ok(())
    }

    fn write_batch(&mut self, batch: WriteBatch<'_>, policy: ConflictPolicy) -> Result<WriteSummary> {
        let written = match batch {
            WriteBatch::Vendors(rows) => self.write_vendors(rows, policy),
            WriteBatch::Zones(rows) => self.write_zones(rows, policy),
            WriteBatch::Trips(rows) => self.write_trips(rows, policy)?,
        };
        debug!(table = batch.table(), written, "Applied in-memory batch");
        Ok(WriteSummary {
            written,
            skipped: batch.len() - written,
        })
    }

    fn zone_ids(&self) -> Result<HashMap<String, i64>> {
        Ok(self
            .zones
            .iter()
            .map(|(name, (id, _))| (name.clone(), *id))
            .collect())
    }

    fn trip_count(&self) -> Result<i64> {
        Ok(self.trips.len() as i64)
    }

    fn counts(&self) -> Result<TableCounts> {
        Ok(TableCounts {
            vendors: self.vendors.len() as i64,
            zones: self.zones.len() as i64,
            trips: self.trips.len() as i64,
        })
    }

    fn reset(&mut self, mode: ResetMode) -> Result<()> {
        self.trips.clear();
        self.zones.clear();
        self.vendors.clear();
        if mode == ResetMode::Recreate {
            self.next_zone_id = 0;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_ids_are_stable_under_replace() {
        let mut store = InMemoryStore::new();
        let zone = ZoneRecord {
            zone_name: "Zone_3_4".to_string(),
            latitude: 40.7,
            longitude: -73.9,
            trip_count: 2,
        };
        store
            .write_batch(WriteBatch::Zones(std::slice::from_ref(&zone)), ConflictPolicy::ReplaceExisting)
            .unwrap();
        let id = store.zone_ids().unwrap()["Zone_3_4"];

        let updated = ZoneRecord {
            trip_count: 5,
            ..zone
        };
        store
            .write_batch(WriteBatch::Zones(&[updated]), ConflictPolicy::ReplaceExisting)
            .unwrap();
        assert_eq!(store.zone_ids().unwrap()["Zone_3_4"], id);
        assert_eq!(store.zone("Zone_3_4").unwrap().trip_count, 5);
    }

    #[test]
    fn vendors_are_insert_if_absent() {
        let mut store = InMemoryStore::new();
        let renamed = Vendor {
            vendor_id: 1,
            vendor_name: "Renamed".to_string(),
        };
        store
            .write_batch(WriteBatch::Vendors(&[Vendor::new(1)]), ConflictPolicy::SkipExisting)
            .unwrap();
        let summary = store
            .write_batch(WriteBatch::Vendors(&[renamed]), ConflictPolicy::SkipExisting)
            .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(store.vendor(1).unwrap().vendor_name, "Vendor_1");
    }
}
