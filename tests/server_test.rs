mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tower::ServiceExt;
use urban_mobility::server::{create_router, AppState};
use urban_mobility::tasks;

fn seeded_router(dir: &Path) -> Router {
    let config = common::config_in(dir);
    common::write_raw_csv(&config.raw_csv, &common::mixed_rows());
    let mut store = tasks::open_store(&config).unwrap();
    tasks::process_if_needed(&config, &mut store).unwrap();
    drop(store);

    create_router(AppState::new(config.database_path, Duration::from_secs(5)))
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let app = create_router(AppState::new(common::db_path(dir.path()), Duration::from_secs(1)));

    let (status, body) = get_json(app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_stats_reports_overview_and_vendors() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (status, body) = get_json(app, "/api/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["overview"]["total_trips"], 3);
    assert_eq!(body["overview"]["data_period"]["earliest_trip"], "2016-01-19 11:35:24");

    let vendors = body["vendor_distribution"].as_array().unwrap();
    assert_eq!(vendors.len(), 2);
    assert_eq!(vendors[0]["vendor_name"], "Vendor_2");
    assert_eq!(vendors[0]["trip_count"], 2);
    assert_eq!(vendors[0]["market_share"], 66.67);
    assert_eq!(body["peak_hours"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_trips_pagination_and_sorting() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (status, body) = get_json(
        app,
        "/api/trips?page_size=2&sort_by=fare_amount&sort_dir=asc",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 3);
    assert_eq!(body["page"], 1);
    assert_eq!(body["page_size"], 2);

    let data = body["data"].as_array().unwrap();
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["id"], "id2875421");
    assert_eq!(data[1]["id"], "id2377394");
    assert!(data[0]["pickup_zone"].as_str().unwrap().starts_with("Zone_"));
}

#[tokio::test]
async fn test_trips_filters_by_date_and_distance() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (_, body) = get_json(app.clone(), "/api/trips?start=2016-03-01&end=2016-12-31").await;
    assert_eq!(body["total"], 2);

    let (_, body) = get_json(app, "/api/trips?min_distance_km=5").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["id"], "id3858529");
}

#[tokio::test]
async fn test_invalid_parameters_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (status, body) = get_json(app.clone(), "/api/trips?start=not-a-date").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PARAMETER");

    let (status, body) = get_json(app.clone(), "/api/trips?min_fare=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PARAMETER");

    let (status, body) = get_json(app, "/api/trips?page=9223372036854775807").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_PARAMETER");
}

#[tokio::test]
async fn test_hourly_distribution_has_24_buckets() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (_, body) = get_json(app.clone(), "/api/hourly-distribution?start=2016-03-01").await;
    let bounded: i64 = body.as_array().unwrap().iter().filter_map(Value::as_i64).sum();
    assert_eq!(bounded, 2);

    // Without bounds every stored trip is counted
    let (status, body) = get_json(app, "/api/hourly-distribution").await;
    assert_eq!(status, StatusCode::OK);
    let hours = body.as_array().unwrap();
    assert_eq!(hours.len(), 24);
    assert_eq!(hours[0], 1);
    assert_eq!(hours[11], 1);
    assert_eq!(hours[17], 1);
    assert_eq!(hours.iter().filter_map(Value::as_i64).sum::<i64>(), 3);
}

#[tokio::test]
async fn test_fare_analysis_and_zones() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (status, body) = get_json(app.clone(), "/api/fare-analysis?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sample_data"].as_array().unwrap().len(), 2);
    let bands: Vec<&str> = body["fare_by_distance"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|b| b["distance_category"].as_str())
        .collect();
    assert_eq!(bands, vec!["Short (<2km)", "Long (5-10km)"]);
    assert!(body["fare_statistics"]["fare_per_km_stddev"].is_number());

    let (status, body) = get_json(app.clone(), "/api/zones").await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|z| z["zone_name"].as_str())
        .collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names, sorted);

    let (_, body) = get_json(app, "/api/busiest-zones").await;
    let total: i64 = body
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|z| z["count"].as_i64())
        .sum();
    assert_eq!(total, 3);
}

#[tokio::test]
async fn test_vendor_performance_insights() {
    let dir = tempfile::tempdir().unwrap();
    let app = seeded_router(dir.path());

    let (status, body) = get_json(app, "/api/vendor-performance").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insights"]["total_vendors"], 2);
    assert_eq!(body["insights"]["most_active_vendor"], "Vendor_2");
}

#[tokio::test]
async fn test_query_failure_returns_generic_error() {
    let dir = tempfile::tempdir().unwrap();
    // No database file has been created at this path
    let app = create_router(AppState::new(common::db_path(dir.path()), Duration::from_secs(1)));

    let (status, body) = get_json(app, "/api/stats").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], "STATS_FAILED");
    assert_eq!(body["error"], "Failed to fetch stats");
    let message = body["error"].as_str().unwrap().to_lowercase();
    assert!(!message.contains("sqlite"));
    assert!(!message.contains("unable to open"));
    assert!(!message.contains(".db"));
}
