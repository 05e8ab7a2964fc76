use crate::constants::VENDOR_NAME_PREFIX;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Store-and-forward flag reported by the taxi meter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreAndForward {
    #[serde(rename = "Y")]
    Yes,
    #[serde(rename = "N")]
    No,
}

impl StoreAndForward {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreAndForward::Yes => "Y",
            StoreAndForward::No => "N",
        }
    }
}

/// A trip as it appears in the raw feed. Timestamps and coordinates may be missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTripRecord {
    pub id: String,
    pub vendor_id: i64,
    #[serde(default, with = "datetime_format::option")]
    pub pickup_datetime: Option<NaiveDateTime>,
    #[serde(default, with = "datetime_format::option")]
    pub dropoff_datetime: Option<NaiveDateTime>,
    pub passenger_count: i64,
    #[serde(default)]
    pub pickup_longitude: Option<f64>,
    #[serde(default)]
    pub pickup_latitude: Option<f64>,
    #[serde(default)]
    pub dropoff_longitude: Option<f64>,
    #[serde(default)]
    pub dropoff_latitude: Option<f64>,
    pub store_and_fwd_flag: StoreAndForward,
    pub trip_duration: i64,
}

/// A validated trip enriched with derived distance, speed, fare and zone features.
///
/// Field order matches the cleaned snapshot CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedTripRecord {
    pub id: String,
    pub vendor_id: i64,
    #[serde(with = "datetime_format")]
    pub pickup_datetime: NaiveDateTime,
    #[serde(with = "datetime_format")]
    pub dropoff_datetime: NaiveDateTime,
    pub passenger_count: i64,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    pub store_and_fwd_flag: StoreAndForward,
    pub trip_duration: i64,
    pub trip_distance_km: f64,
    pub trip_speed_kmh: f64,
    pub fare_amount: f64,
    pub fare_per_km: Option<f64>,
    pub pickup_zone: String,
    pub dropoff_zone: String,
}

/// Row in the `vendors` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vendor {
    pub vendor_id: i64,
    pub vendor_name: String,
}

impl Vendor {
    pub fn new(vendor_id: i64) -> Self {
        Self {
            vendor_id,
            vendor_name: format!("{VENDOR_NAME_PREFIX}_{vendor_id}"),
        }
    }
}

/// Row in the `zones` table, keyed by name. The numeric id is assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRecord {
    pub zone_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub trip_count: i64,
}

/// Row in the `trips` table with zone labels resolved to zone ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRow {
    pub id: String,
    pub vendor_id: i64,
    pub pickup_datetime: NaiveDateTime,
    pub dropoff_datetime: NaiveDateTime,
    pub passenger_count: i64,
    pub pickup_longitude: f64,
    pub pickup_latitude: f64,
    pub dropoff_longitude: f64,
    pub dropoff_latitude: f64,
    pub store_and_fwd_flag: StoreAndForward,
    pub trip_duration: i64,
    pub trip_distance_km: f64,
    pub trip_speed_kmh: f64,
    pub fare_amount: f64,
    pub fare_per_km: Option<f64>,
    pub pickup_zone_id: Option<i64>,
    pub dropoff_zone_id: Option<i64>,
}

impl TripRow {
    pub fn from_cleaned(
        record: &CleanedTripRecord,
        pickup_zone_id: Option<i64>,
        dropoff_zone_id: Option<i64>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            vendor_id: record.vendor_id,
            pickup_datetime: record.pickup_datetime,
            dropoff_datetime: record.dropoff_datetime,
            passenger_count: record.passenger_count,
            pickup_longitude: record.pickup_longitude,
            pickup_latitude: record.pickup_latitude,
            dropoff_longitude: record.dropoff_longitude,
            dropoff_latitude: record.dropoff_latitude,
            store_and_fwd_flag: record.store_and_fwd_flag,
            trip_duration: record.trip_duration,
            trip_distance_km: record.trip_distance_km,
            trip_speed_kmh: record.trip_speed_kmh,
            fare_amount: record.fare_amount,
            fare_per_km: record.fare_per_km,
            pickup_zone_id,
            dropoff_zone_id,
        }
    }
}

/// Serde adapter for `%Y-%m-%d %H:%M:%S` timestamps, also accepting the ISO `T` separator.
pub mod datetime_format {
    use crate::constants::DATETIME_FORMAT;
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

    pub fn parse(value: &str) -> Option<NaiveDateTime> {
        let value = value.trim();
        NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
            .or_else(|_| NaiveDateTime::parse_from_str(value, ISO_FORMAT))
            .ok()
    }

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.format(DATETIME_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
    }

    pub mod option {
        use chrono::NaiveDateTime;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<NaiveDateTime>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(ts) => super::serialize(ts, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<NaiveDateTime>, D::Error> {
            let raw: Option<String> = Option::deserialize(deserializer)?;
            match raw.as_deref().map(str::trim) {
                None | Some("") => Ok(None),
                Some(value) => super::parse(value)
                    .map(Some)
                    .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{value}'"))),
            }
        }
    }
}
