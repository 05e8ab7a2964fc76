#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use urban_mobility::config::Config;

pub const RAW_HEADER: &str = "id,vendor_id,pickup_datetime,dropoff_datetime,passenger_count,pickup_longitude,pickup_latitude,dropoff_longitude,dropoff_latitude,store_and_fwd_flag,trip_duration";

/// Three valid Manhattan trips, ordered by fare ascending.
pub const VALID_ROWS: [&str; 3] = [
    "id2875421,2,2016-03-14 17:24:55,2016-03-14 17:32:30,1,-73.982155,40.767937,-73.964630,40.765602,N,455",
    "id2377394,1,2016-06-12 00:43:35,2016-06-12 00:54:38,1,-73.980415,40.738564,-73.999481,40.731152,N,663",
    "id3858529,2,2016-01-19 11:35:24,2016-01-19 12:10:48,1,-73.979027,40.763939,-74.005333,40.710087,N,2124",
];

pub const DUPLICATE_ROW: &str =
    "id2875421,2,2016-03-14 17:24:55,2016-03-14 17:32:30,1,-73.982155,40.767937,-73.964630,40.765602,N,455";
pub const MISSING_ROW: &str =
    "id_missing,1,2016-02-01 08:00:00,2016-02-01 08:10:00,1,-73.98,,-73.96,40.76,N,600";
pub const BACKWARDS_ROW: &str =
    "id_backwards,2,2016-02-01 09:10:00,2016-02-01 09:00:00,1,-73.98,40.76,-73.96,40.76,N,600";

pub fn write_raw_csv(path: &Path, rows: &[&str]) {
    let mut contents = String::from(RAW_HEADER);
    contents.push('\n');
    for row in rows {
        contents.push_str(row);
        contents.push('\n');
    }
    fs::write(path, contents).unwrap();
}

/// Six raw rows: three valid, one duplicate, one with a missing coordinate,
/// one with dropoff before pickup.
pub fn mixed_rows() -> Vec<&'static str> {
    let mut rows = VALID_ROWS.to_vec();
    rows.extend([DUPLICATE_ROW, MISSING_ROW, BACKWARDS_ROW]);
    rows
}

/// Config with every artifact placed under `dir`.
pub fn config_in(dir: &Path) -> Config {
    Config {
        raw_csv: dir.join("train.csv"),
        cleaned_csv: dir.join("cleaned_dataset.csv"),
        ledger_path: dir.join("excluded_records.txt"),
        database_path: dir.join("urban_mobility.db"),
        chunk_size: 2,
        ..Config::default()
    }
}

pub fn db_path(dir: &Path) -> PathBuf {
    dir.join("urban_mobility.db")
}
