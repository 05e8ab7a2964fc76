//! Cleaning thresholds, fare model coefficients and file defaults shared across the crate.

// NYC metro bounding box (degrees, inclusive)
pub const NYC_LAT_MIN: f64 = 40.4774;
pub const NYC_LAT_MAX: f64 = 40.9176;
pub const NYC_LON_MIN: f64 = -74.2591;
pub const NYC_LON_MAX: f64 = -73.7004;

// Trip validity bounds
pub const MIN_TRIP_DURATION_SECS: i64 = 60;
pub const MAX_TRIP_DURATION_SECS: i64 = 21_600;
pub const MIN_PASSENGERS: i64 = 1;
pub const MAX_PASSENGERS: i64 = 6;
pub const MIN_SPEED_KMH: f64 = 1.0;
pub const MAX_SPEED_KMH: f64 = 200.0;

pub const EARTH_RADIUS_KM: f64 = 6371.0;

// Synthetic fare model
pub const BASE_FARE: f64 = 2.50;
pub const PER_KM_RATE: f64 = 1.50;
pub const PER_MINUTE_RATE: f64 = 0.50;

/// Number of bins per axis in the zone grid.
pub const ZONE_GRID_BINS: usize = 20;
pub const ZONE_LABEL_PREFIX: &str = "Zone";
pub const VENDOR_NAME_PREFIX: &str = "Vendor";

pub const DEFAULT_MAX_RECORDS: usize = 5000;
pub const DEFAULT_CHUNK_SIZE: usize = 100;
pub const DEFAULT_INTERACTIVE_BATCH_SIZE: usize = 100;
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_RAW_CSV: &str = "train.csv";
pub const DEFAULT_CLEANED_CSV: &str = "cleaned_dataset.csv";
pub const DEFAULT_LEDGER_PATH: &str = "excluded_records.txt";
pub const DEFAULT_DATABASE_PATH: &str = "urban_mobility.db";
pub const DEFAULT_CONFIG_PATH: &str = "mobility.toml";

pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";
pub const DEFAULT_SERVER_PORT: u16 = 5003;

/// Timestamp layout used by the raw feed and the cleaned snapshot.
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
