//! Read-only aggregation queries over the normalized tables.
//!
//! Every function takes a borrowed connection and returns serializable
//! structs; the HTTP layer wraps them without further shaping.

use crate::constants::DATETIME_FORMAT;
use crate::error::{MobilityError, Result};
use crate::pipeline::features::round_to_cents;
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::ToSql;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 500;
pub const BUSIEST_ZONES_LIMIT: i64 = 20;
pub const PEAK_HOURS_LIMIT: i64 = 5;
pub const DEFAULT_FARE_SAMPLE_LIMIT: i64 = 1000;
pub const EFFICIENT_ZONES_MIN_TRIPS: i64 = 5;
pub const EFFICIENT_ZONES_LIMIT: i64 = 10;
const FAST_TRIP_KMH: f64 = 30.0;
const SLOW_TRIP_KMH: f64 = 10.0;

fn round2(value: Option<f64>) -> Option<f64> {
    value.map(round_to_cents)
}

fn minutes(seconds: Option<f64>) -> Option<f64> {
    seconds.map(|s| round_to_cents(s / 60.0))
}

/// Parse a `start`/`end` filter into the stored timestamp layout.
///
/// Accepts a full timestamp or a bare date (midnight).
pub fn parse_bound(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    let parsed = crate::types::datetime_format::parse(value).or_else(|| {
        NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    });
    parsed
        .map(|ts: NaiveDateTime| ts.format(DATETIME_FORMAT).to_string())
        .ok_or_else(|| MobilityError::InvalidParameter {
            name: name.to_string(),
            reason: format!("'{value}' is not a date or timestamp"),
        })
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateRange {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRange {
    /// SQL predicate over `column` plus its bound parameters. Always valid to splice after WHERE.
    fn predicate(&self, column: &str) -> Result<(String, Vec<Box<dyn ToSql>>)> {
        let mut clauses = vec!["1 = 1".to_string()];
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(start) = self.start.as_deref().filter(|s| !s.trim().is_empty()) {
            clauses.push(format!("{column} >= ?"));
            params.push(Box::new(parse_bound("start", start)?));
        }
        if let Some(end) = self.end.as_deref().filter(|s| !s.trim().is_empty()) {
            clauses.push(format!("{column} <= ?"));
            params.push(Box::new(parse_bound("end", end)?));
        }
        Ok((clauses.join(" AND "), params))
    }
}

// ============================================================================
// Overview
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DataPeriod {
    pub earliest_trip: Option<String>,
    pub latest_trip: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Overview {
    pub total_trips: i64,
    pub avg_speed_kmh: Option<f64>,
    pub avg_fare_per_km: Option<f64>,
    pub avg_duration_minutes: Option<f64>,
    pub avg_distance_km: Option<f64>,
    pub avg_fare: Option<f64>,
    pub data_period: DataPeriod,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorShare {
    pub vendor_name: String,
    pub trip_count: i64,
    pub market_share: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PeakHour {
    pub hour: i64,
    pub trip_count: i64,
    pub avg_speed_kmh: Option<f64>,
    pub avg_fare: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsReport {
    pub overview: Overview,
    pub vendor_distribution: Vec<VendorShare>,
    pub peak_hours: Vec<PeakHour>,
}

pub fn stats(conn: &Connection) -> Result<StatsReport> {
    let overview = conn.query_row(
        "SELECT COUNT(*), AVG(trip_speed_kmh), AVG(fare_per_km), AVG(trip_duration),
                AVG(trip_distance_km), AVG(fare_amount), MIN(pickup_datetime), MAX(pickup_datetime)
         FROM trips",
        [],
        |row| {
            Ok(Overview {
                total_trips: row.get(0)?,
                avg_speed_kmh: round2(row.get(1)?),
                avg_fare_per_km: round2(row.get(2)?),
                avg_duration_minutes: minutes(row.get(3)?),
                avg_distance_km: round2(row.get(4)?),
                avg_fare: round2(row.get(5)?),
                data_period: DataPeriod {
                    earliest_trip: row.get(6)?,
                    latest_trip: row.get(7)?,
                },
            })
        },
    )?;

    let total = overview.total_trips;
    let mut stmt = conn.prepare(
        "SELECT v.vendor_name, COUNT(t.id) AS trip_count
         FROM vendors v
         LEFT JOIN trips t ON v.vendor_id = t.vendor_id
         GROUP BY v.vendor_id, v.vendor_name
         ORDER BY trip_count DESC, v.vendor_id",
    )?;
    let vendor_distribution = stmt
        .query_map([], |row| {
            let trip_count: i64 = row.get(1)?;
            Ok(VendorShare {
                vendor_name: row.get(0)?,
                trip_count,
                market_share: if total > 0 {
                    round_to_cents(trip_count as f64 / total as f64 * 100.0)
                } else {
                    0.0
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT CAST(strftime('%H', pickup_datetime) AS INTEGER) AS hour,
                COUNT(*) AS trip_count, AVG(trip_speed_kmh), AVG(fare_amount)
         FROM trips
         GROUP BY hour
         ORDER BY trip_count DESC, hour
         LIMIT ?1",
    )?;
    let peak_hours = stmt
        .query_map([PEAK_HOURS_LIMIT], |row| {
            Ok(PeakHour {
                hour: row.get(0)?,
                trip_count: row.get(1)?,
                avg_speed_kmh: round2(row.get(2)?),
                avg_fare: round2(row.get(3)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(StatsReport {
        overview,
        vendor_distribution,
        peak_hours,
    })
}

// ============================================================================
// Trips
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortColumn {
    PickupDatetime,
    FareAmount,
    TripDistanceKm,
    TripDuration,
    TripSpeedKmh,
}

impl SortColumn {
    /// Unknown or missing names fall back to pickup time.
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("fare_amount") => SortColumn::FareAmount,
            Some("trip_distance_km") => SortColumn::TripDistanceKm,
            Some("trip_duration") => SortColumn::TripDuration,
            Some("trip_speed_kmh") => SortColumn::TripSpeedKmh,
            _ => SortColumn::PickupDatetime,
        }
    }

    pub fn column(&self) -> &'static str {
        match self {
            SortColumn::PickupDatetime => "pickup_datetime",
            SortColumn::FareAmount => "fare_amount",
            SortColumn::TripDistanceKm => "trip_distance_km",
            SortColumn::TripDuration => "trip_duration",
            SortColumn::TripSpeedKmh => "trip_speed_kmh",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `asc` sorts descending.
    pub fn from_param(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("asc") => SortDirection::Asc,
            _ => SortDirection::Desc,
        }
    }

    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Filters, pagination and sorting for the trip listing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TripQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub min_fare: Option<f64>,
    pub min_distance_km: Option<f64>,
    pub max_distance_km: Option<f64>,
    pub passenger_min: Option<i64>,
    pub passenger_max: Option<i64>,
    pub pickup_zone: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_dir: Option<String>,
}

impl TripQuery {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> i64 {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    /// Row offset of the requested page. Pages past `i64` range are rejected.
    pub fn offset(&self) -> Result<i64> {
        (self.page() - 1)
            .checked_mul(self.page_size())
            .ok_or_else(|| MobilityError::InvalidParameter {
                name: "page".to_string(),
                reason: format!("page {} is out of range", self.page()),
            })
    }

    fn where_clause(&self) -> Result<(String, Vec<Box<dyn ToSql>>)> {
        let range = DateRange {
            start: self.start.clone(),
            end: self.end.clone(),
        };
        let (date_sql, mut params) = range.predicate("t.pickup_datetime")?;
        let mut clauses = vec![date_sql];

        if let Some(min_fare) = self.min_fare {
            clauses.push("t.fare_amount >= ?".into());
            params.push(Box::new(min_fare));
        }
        if let Some(min) = self.min_distance_km {
            clauses.push("t.trip_distance_km >= ?".into());
            params.push(Box::new(min));
        }
        if let Some(max) = self.max_distance_km {
            clauses.push("t.trip_distance_km <= ?".into());
            params.push(Box::new(max));
        }
        if let Some(min) = self.passenger_min {
            clauses.push("t.passenger_count >= ?".into());
            params.push(Box::new(min));
        }
        if let Some(max) = self.passenger_max {
            clauses.push("t.passenger_count <= ?".into());
            params.push(Box::new(max));
        }
        if let Some(zone) = self.pickup_zone.as_deref().filter(|z| !z.trim().is_empty()) {
            clauses.push("pz.zone_name = ?".into());
            params.push(Box::new(zone.trim().to_string()));
        }
        Ok((clauses.join(" AND "), params))
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripView {
    pub id: String,
    pub pickup_datetime: String,
    pub dropoff_datetime: String,
    pub pickup_latitude: f64,
    pub pickup_longitude: f64,
    pub dropoff_latitude: f64,
    pub dropoff_longitude: f64,
    pub trip_duration: i64,
    pub trip_distance_km: f64,
    pub trip_speed_kmh: f64,
    pub fare_amount: f64,
    pub fare_per_km: Option<f64>,
    pub passenger_count: i64,
    pub pickup_zone: Option<String>,
    pub dropoff_zone: Option<String>,
    pub vendor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TripPage {
    pub data: Vec<TripView>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

pub fn trips(conn: &Connection, query: &TripQuery) -> Result<TripPage> {
    let (where_sql, params) = query.where_clause()?;
    let page = query.page();
    let page_size = query.page_size();
    let offset = query.offset()?;
    let sort = SortColumn::from_param(query.sort_by.as_deref());
    let direction = SortDirection::from_param(query.sort_dir.as_deref());

    let from_sql = "FROM trips t
         LEFT JOIN zones pz ON t.pickup_zone_id = pz.id
         LEFT JOIN zones dz ON t.dropoff_zone_id = dz.id
         LEFT JOIN vendors v ON t.vendor_id = v.vendor_id";

    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) {from_sql} WHERE {where_sql}"),
        params_from_iter(params.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT t.id, t.pickup_datetime, t.dropoff_datetime,
                t.pickup_latitude, t.pickup_longitude, t.dropoff_latitude, t.dropoff_longitude,
                t.trip_duration, t.trip_distance_km, t.trip_speed_kmh, t.fare_amount, t.fare_per_km,
                t.passenger_count, pz.zone_name, dz.zone_name, v.vendor_name
         {from_sql}
         WHERE {where_sql}
         ORDER BY t.{} {}, t.id
         LIMIT ? OFFSET ?",
        sort.column(),
        direction.sql()
    );

    let mut bound = params;
    bound.push(Box::new(page_size));
    bound.push(Box::new(offset));

    let mut stmt = conn.prepare(&sql)?;
    let data = stmt
        .query_map(params_from_iter(bound.iter()), |row| {
            Ok(TripView {
                id: row.get(0)?,
                pickup_datetime: row.get(1)?,
                dropoff_datetime: row.get(2)?,
                pickup_latitude: row.get(3)?,
                pickup_longitude: row.get(4)?,
                dropoff_latitude: row.get(5)?,
                dropoff_longitude: row.get(6)?,
                trip_duration: row.get(7)?,
                trip_distance_km: row.get(8)?,
                trip_speed_kmh: row.get(9)?,
                fare_amount: row.get(10)?,
                fare_per_km: row.get(11)?,
                passenger_count: row.get(12)?,
                pickup_zone: row.get(13)?,
                dropoff_zone: row.get(14)?,
                vendor_name: row.get(15)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(TripPage {
        data,
        total,
        page,
        page_size,
    })
}

// ============================================================================
// Zones
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ZoneView {
    pub id: i64,
    pub zone_name: String,
    pub latitude: f64,
    pub longitude: f64,
}

pub fn zones(conn: &Connection) -> Result<Vec<ZoneView>> {
    let mut stmt =
        conn.prepare("SELECT id, zone_name, latitude, longitude FROM zones ORDER BY zone_name")?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ZoneView {
                id: row.get(0)?,
                zone_name: row.get(1)?,
                latitude: row.get(2)?,
                longitude: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ZoneCount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub zone: String,
    pub lat: f64,
    pub lon: f64,
    pub count: i64,
}

/// Pickup zones with the most trips.
pub fn busiest_zones(conn: &Connection) -> Result<Vec<ZoneCount>> {
    let mut stmt = conn.prepare(
        "SELECT pz.zone_name, pz.latitude, pz.longitude, COUNT(t.id) AS count
         FROM trips t
         JOIN zones pz ON t.pickup_zone_id = pz.id
         GROUP BY pz.id, pz.zone_name, pz.latitude, pz.longitude
         ORDER BY count DESC, pz.zone_name
         LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([BUSIEST_ZONES_LIMIT], |row| {
            Ok(ZoneCount {
                id: None,
                zone: row.get(0)?,
                lat: row.get(1)?,
                lon: row.get(2)?,
                count: row.get(3)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// Every zone with its pickup count, including zones with none.
pub fn zones_with_counts(conn: &Connection) -> Result<Vec<ZoneCount>> {
    let mut stmt = conn.prepare(
        "SELECT pz.id, pz.zone_name, pz.latitude, pz.longitude, COUNT(t.id) AS count
         FROM zones pz
         LEFT JOIN trips t ON pz.id = t.pickup_zone_id
         GROUP BY pz.id, pz.zone_name, pz.latitude, pz.longitude
         ORDER BY count DESC, pz.zone_name",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ZoneCount {
                id: Some(row.get(0)?),
                zone: row.get(1)?,
                lat: row.get(2)?,
                lon: row.get(3)?,
                count: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ============================================================================
// Time and fare distributions
// ============================================================================

/// Trip counts per pickup hour, index 0..=23.
pub fn hourly_distribution(conn: &Connection, range: &DateRange) -> Result<[i64; 24]> {
    let (where_sql, params) = range.predicate("pickup_datetime")?;
    let mut stmt = conn.prepare(&format!(
        "SELECT CAST(strftime('%H', pickup_datetime) AS INTEGER) AS hour, COUNT(*)
         FROM trips
         WHERE {where_sql}
         GROUP BY hour"
    ))?;
    let mut hours = [0i64; 24];
    let rows = stmt.query_map(params_from_iter(params.iter()), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (hour, count) = row?;
        if let Some(slot) = usize::try_from(hour).ok().and_then(|h| hours.get_mut(h)) {
            *slot = count;
        }
    }
    Ok(hours)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FareQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FareStatistics {
    pub avg_fare_per_km: Option<f64>,
    pub min_fare_per_km: Option<f64>,
    pub max_fare_per_km: Option<f64>,
    pub fare_per_km_stddev: Option<f64>,
    pub avg_fare_amount: Option<f64>,
    pub avg_distance_km: Option<f64>,
    pub avg_duration_minutes: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DistanceBand {
    pub distance_category: String,
    pub trip_count: i64,
    pub avg_fare: Option<f64>,
    pub avg_fare_per_km: Option<f64>,
    pub avg_speed_kmh: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FareSample {
    pub fare_amount: f64,
    pub trip_distance_km: f64,
    pub trip_duration: i64,
    pub trip_speed_kmh: f64,
    pub fare_per_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FareAnalysis {
    pub fare_statistics: FareStatistics,
    pub fare_by_distance: Vec<DistanceBand>,
    pub sample_data: Vec<FareSample>,
}

/// Sample standard deviation from a count, sum and sum of squares.
fn sample_stddev(n: i64, sum: Option<f64>, sum_sq: Option<f64>) -> Option<f64> {
    let (sum, sum_sq) = (sum?, sum_sq?);
    if n < 2 {
        return None;
    }
    let n = n as f64;
    let variance = ((sum_sq - sum * sum / n) / (n - 1.0)).max(0.0);
    Some(variance.sqrt())
}

pub fn fare_analysis(conn: &Connection, query: &FareQuery) -> Result<FareAnalysis> {
    let range = DateRange {
        start: query.start.clone(),
        end: query.end.clone(),
    };
    let (where_sql, params) = range.predicate("pickup_datetime")?;
    let limit = query.limit.unwrap_or(DEFAULT_FARE_SAMPLE_LIMIT).clamp(1, 10_000);

    let fare_statistics = conn.query_row(
        &format!(
            "SELECT AVG(fare_per_km), MIN(fare_per_km), MAX(fare_per_km),
                    COUNT(fare_per_km), SUM(fare_per_km), SUM(fare_per_km * fare_per_km),
                    AVG(fare_amount), AVG(trip_distance_km), AVG(trip_duration)
             FROM trips
             WHERE {where_sql}"
        ),
        params_from_iter(params.iter()),
        |row| {
            let n: i64 = row.get(3)?;
            Ok(FareStatistics {
                avg_fare_per_km: round2(row.get(0)?),
                min_fare_per_km: round2(row.get(1)?),
                max_fare_per_km: round2(row.get(2)?),
                fare_per_km_stddev: round2(sample_stddev(n, row.get(4)?, row.get(5)?)),
                avg_fare_amount: round2(row.get(6)?),
                avg_distance_km: round2(row.get(7)?),
                avg_duration_minutes: minutes(row.get(8)?),
            })
        },
    )?;

    let mut stmt = conn.prepare(&format!(
        "SELECT CASE
                    WHEN trip_distance_km < 2 THEN 'Short (<2km)'
                    WHEN trip_distance_km < 5 THEN 'Medium (2-5km)'
                    WHEN trip_distance_km < 10 THEN 'Long (5-10km)'
                    ELSE 'Very Long (>10km)'
                END AS distance_category,
                COUNT(*), AVG(fare_amount), AVG(fare_per_km), AVG(trip_speed_kmh)
         FROM trips
         WHERE {where_sql}
         GROUP BY distance_category
         ORDER BY AVG(trip_distance_km)"
    ))?;
    let fare_by_distance = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok(DistanceBand {
                distance_category: row.get(0)?,
                trip_count: row.get(1)?,
                avg_fare: round2(row.get(2)?),
                avg_fare_per_km: round2(row.get(3)?),
                avg_speed_kmh: round2(row.get(4)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(&format!(
        "SELECT fare_amount, trip_distance_km, trip_duration, trip_speed_kmh, fare_per_km
         FROM trips
         WHERE {where_sql}
         ORDER BY pickup_datetime DESC
         LIMIT ?"
    ))?;
    let mut bound = params;
    bound.push(Box::new(limit));
    let sample_data = stmt
        .query_map(params_from_iter(bound.iter()), |row| {
            Ok(FareSample {
                fare_amount: row.get(0)?,
                trip_distance_km: row.get(1)?,
                trip_duration: row.get(2)?,
                trip_speed_kmh: row.get(3)?,
                fare_per_km: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(FareAnalysis {
        fare_statistics,
        fare_by_distance,
        sample_data,
    })
}

// ============================================================================
// Mobility insights and vendors
// ============================================================================

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HourlyPattern {
    pub hour: i64,
    pub trip_count: i64,
    pub avg_speed_kmh: Option<f64>,
    pub avg_distance_km: Option<f64>,
    pub avg_fare_per_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EfficiencyMetrics {
    pub overall_avg_speed_kmh: Option<f64>,
    pub overall_avg_fare_per_km: Option<f64>,
    pub fast_trips_count: i64,
    pub slow_trips_count: i64,
    pub total_trips: i64,
    pub fast_trips_percentage: f64,
    pub slow_trips_percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ZoneEfficiency {
    pub zone_name: String,
    pub trip_count: i64,
    pub avg_speed_kmh: Option<f64>,
    pub avg_fare_per_km: Option<f64>,
    pub avg_distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MobilityInsights {
    pub hourly_patterns: Vec<HourlyPattern>,
    pub efficiency_metrics: EfficiencyMetrics,
    pub most_efficient_zones: Vec<ZoneEfficiency>,
}

fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to_cents(part as f64 / total as f64 * 100.0)
}

pub fn mobility_insights(conn: &Connection) -> Result<MobilityInsights> {
    let mut stmt = conn.prepare(
        "SELECT CAST(strftime('%H', pickup_datetime) AS INTEGER) AS hour,
                COUNT(*), AVG(trip_speed_kmh), AVG(trip_distance_km), AVG(fare_per_km)
         FROM trips
         GROUP BY hour
         ORDER BY hour",
    )?;
    let hourly_patterns = stmt
        .query_map([], |row| {
            Ok(HourlyPattern {
                hour: row.get(0)?,
                trip_count: row.get(1)?,
                avg_speed_kmh: round2(row.get(2)?),
                avg_distance_km: round2(row.get(3)?),
                avg_fare_per_km: round2(row.get(4)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let efficiency_metrics = conn.query_row(
        "SELECT AVG(trip_speed_kmh), AVG(fare_per_km),
                COUNT(CASE WHEN trip_speed_kmh > ?1 THEN 1 END),
                COUNT(CASE WHEN trip_speed_kmh < ?2 THEN 1 END),
                COUNT(*)
         FROM trips",
        [FAST_TRIP_KMH, SLOW_TRIP_KMH],
        |row| {
            let fast: i64 = row.get(2)?;
            let slow: i64 = row.get(3)?;
            let total: i64 = row.get(4)?;
            Ok(EfficiencyMetrics {
                overall_avg_speed_kmh: round2(row.get(0)?),
                overall_avg_fare_per_km: round2(row.get(1)?),
                fast_trips_count: fast,
                slow_trips_count: slow,
                total_trips: total,
                fast_trips_percentage: percentage(fast, total),
                slow_trips_percentage: percentage(slow, total),
            })
        },
    )?;

    let mut stmt = conn.prepare(
        "SELECT pz.zone_name, COUNT(*), AVG(t.trip_speed_kmh), AVG(t.fare_per_km), AVG(t.trip_distance_km)
         FROM trips t
         JOIN zones pz ON t.pickup_zone_id = pz.id
         GROUP BY pz.id, pz.zone_name
         HAVING COUNT(*) >= ?1
         ORDER BY AVG(t.trip_speed_kmh) DESC
         LIMIT ?2",
    )?;
    let most_efficient_zones = stmt
        .query_map([EFFICIENT_ZONES_MIN_TRIPS, EFFICIENT_ZONES_LIMIT], |row| {
            Ok(ZoneEfficiency {
                zone_name: row.get(0)?,
                trip_count: row.get(1)?,
                avg_speed_kmh: round2(row.get(2)?),
                avg_fare_per_km: round2(row.get(3)?),
                avg_distance_km: round2(row.get(4)?),
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(MobilityInsights {
        hourly_patterns,
        efficiency_metrics,
        most_efficient_zones,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OperationalPeriod {
    pub first_trip: Option<String>,
    pub last_trip: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorPerformance {
    pub vendor_name: String,
    pub total_trips: i64,
    pub avg_speed_kmh: Option<f64>,
    pub avg_fare_per_km: Option<f64>,
    pub avg_distance_km: Option<f64>,
    pub avg_duration_minutes: Option<f64>,
    pub avg_fare_amount: Option<f64>,
    pub operational_period: OperationalPeriod,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorInsights {
    pub total_vendors: usize,
    pub most_active_vendor: Option<String>,
    pub fastest_vendor: Option<String>,
    pub most_efficient_vendor: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VendorReport {
    pub vendor_performance: Vec<VendorPerformance>,
    pub insights: VendorInsights,
}

pub fn vendor_performance(conn: &Connection) -> Result<VendorReport> {
    let mut stmt = conn.prepare(
        "SELECT v.vendor_name, COUNT(t.id) AS total_trips,
                AVG(t.trip_speed_kmh), AVG(t.fare_per_km), AVG(t.trip_distance_km),
                AVG(t.trip_duration), AVG(t.fare_amount),
                MIN(t.pickup_datetime), MAX(t.pickup_datetime)
         FROM vendors v
         LEFT JOIN trips t ON v.vendor_id = t.vendor_id
         GROUP BY v.vendor_id, v.vendor_name
         ORDER BY total_trips DESC, v.vendor_id",
    )?;
    let vendors = stmt
        .query_map([], |row| {
            Ok(VendorPerformance {
                vendor_name: row.get(0)?,
                total_trips: row.get(1)?,
                avg_speed_kmh: round2(row.get(2)?),
                avg_fare_per_km: round2(row.get(3)?),
                avg_distance_km: round2(row.get(4)?),
                avg_duration_minutes: minutes(row.get(5)?),
                avg_fare_amount: round2(row.get(6)?),
                operational_period: OperationalPeriod {
                    first_trip: row.get(7)?,
                    last_trip: row.get(8)?,
                },
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let fastest = vendors
        .iter()
        .filter_map(|v| v.avg_speed_kmh.map(|s| (s, v)))
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v.vendor_name.clone());
    let most_efficient = vendors
        .iter()
        .filter_map(|v| v.avg_fare_per_km.map(|f| (f, v)))
        .min_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, v)| v.vendor_name.clone());

    let insights = VendorInsights {
        total_vendors: vendors.len(),
        most_active_vendor: vendors.first().map(|v| v.vendor_name.clone()),
        fastest_vendor: fastest,
        most_efficient_vendor: most_efficient,
    };

    Ok(VendorReport {
        vendor_performance: vendors,
        insights,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_accept_dates_and_timestamps() {
        assert_eq!(parse_bound("start", "2016-03-14").unwrap(), "2016-03-14 00:00:00");
        assert_eq!(
            parse_bound("end", "2016-03-14T17:24:55").unwrap(),
            "2016-03-14 17:24:55"
        );
        assert!(matches!(
            parse_bound("start", "yesterday"),
            Err(MobilityError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn sort_parameters_fall_back_to_whitelist_defaults() {
        assert_eq!(SortColumn::from_param(Some("fare_amount")), SortColumn::FareAmount);
        assert_eq!(
            SortColumn::from_param(Some("id; DROP TABLE trips")),
            SortColumn::PickupDatetime
        );
        assert_eq!(SortDirection::from_param(Some("ASC")), SortDirection::Asc);
        assert_eq!(SortDirection::from_param(Some("sideways")), SortDirection::Desc);
    }

    #[test]
    fn pagination_is_clamped() {
        let query = TripQuery {
            page: Some(0),
            page_size: Some(10_000),
            ..TripQuery::default()
        };
        assert_eq!(query.page(), 1);
        assert_eq!(query.page_size(), MAX_PAGE_SIZE);
        assert_eq!(TripQuery::default().page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn empty_store_yields_null_averages() {
        let mut store = crate::storage::SqliteStore::open_in_memory().unwrap();
        crate::storage::TripStore::init_schema(&mut store).unwrap();
        let conn = store.connection();

        let report = stats(conn).unwrap();
        assert_eq!(report.overview.total_trips, 0);
        assert!(report.overview.avg_speed_kmh.is_none());
        assert!(report.vendor_distribution.is_empty());
        assert_eq!(hourly_distribution(conn, &DateRange::default()).unwrap(), [0; 24]);

        let fares = fare_analysis(conn, &FareQuery::default()).unwrap();
        assert!(fares.fare_statistics.fare_per_km_stddev.is_none());
        assert!(fares.sample_data.is_empty());
        assert!(vendor_performance(conn).unwrap().insights.most_active_vendor.is_none());
    }

    #[test]
    fn oversized_page_is_rejected_not_overflowed() {
        let query = TripQuery {
            page: Some(i64::MAX),
            ..TripQuery::default()
        };
        assert!(matches!(
            query.offset(),
            Err(MobilityError::InvalidParameter { .. })
        ));

        let mut store = crate::storage::SqliteStore::open_in_memory().unwrap();
        crate::storage::TripStore::init_schema(&mut store).unwrap();
        assert!(matches!(
            trips(store.connection(), &query),
            Err(MobilityError::InvalidParameter { .. })
        ));

        let third = TripQuery {
            page: Some(3),
            page_size: Some(20),
            ..TripQuery::default()
        };
        assert_eq!(third.offset().unwrap(), 40);
    }

    #[test]
    fn stddev_matches_sample_formula() {
        // values 2, 4, 4, 4, 5, 5, 7, 9 -> sample stddev ~2.138
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let sum: f64 = values.iter().sum();
        let sum_sq: f64 = values.iter().map(|v| v * v).sum();
        let sd = sample_stddev(values.len() as i64, Some(sum), Some(sum_sq)).unwrap();
        assert!((sd - 2.138).abs() < 1e-3);
        assert_eq!(sample_stddev(1, Some(3.0), Some(9.0)), None);
    }
}
