use crate::analytics::{self, DateRange, FareQuery, TripQuery};
use crate::config::Config;
use crate::error::MobilityError;
use crate::observability::metrics::api as api_metrics;
use crate::storage::open_read_connection;
use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use hyper::Server;
use rusqlite::Connection;
use serde::Serialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

/// Shared handler state. Each request opens its own read-only connection.
#[derive(Clone)]
pub struct AppState {
    pub db_path: Arc<PathBuf>,
    pub busy_timeout: Duration,
}

impl AppState {
    pub fn new(db_path: impl Into<PathBuf>, busy_timeout: Duration) -> Self {
        Self {
            db_path: Arc::new(db_path.into()),
            busy_timeout,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.database_path.clone(), config.busy_timeout())
    }
}

/// JSON error body: `{"error": ..., "code": ...}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    code: &'a str,
}

impl ApiError {
    fn invalid_parameter(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "INVALID_PARAMETER",
            message: message.into(),
        }
    }

    /// Maps a query failure to a generic message; the detail only goes to the log.
    fn from_query_error(endpoint: &'static str, code: &'static str, err: MobilityError) -> Self {
        match err {
            MobilityError::InvalidParameter { .. } => Self::invalid_parameter(err.to_string()),
            other => {
                error!(endpoint, error = %other, "Query failed");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    message: format!("Failed to fetch {}", endpoint.replace('-', " ")),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: &self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Runs `query` on a blocking thread against a fresh read-only connection.
async fn run_query<T, F>(
    state: &AppState,
    endpoint: &'static str,
    code: &'static str,
    query: F,
) -> Result<Json<T>, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> crate::error::Result<T> + Send + 'static,
{
    api_metrics::request(endpoint);
    let started = Instant::now();
    let db_path = state.db_path.clone();
    let busy_timeout = state.busy_timeout;

    let result = tokio::task::spawn_blocking(move || {
        let conn = open_read_connection(db_path.as_path(), busy_timeout)?;
        query(&conn)
    })
    .await;

    api_metrics::request_duration(endpoint, started.elapsed().as_secs_f64());

    let outcome = match result {
        Ok(Ok(value)) => Ok(Json(value)),
        Ok(Err(err)) => Err(ApiError::from_query_error(endpoint, code, err)),
        Err(join_err) => {
            error!(endpoint, error = %join_err, "Query task panicked");
            Err(ApiError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code,
                message: format!("Failed to fetch {}", endpoint.replace('-', " ")),
            })
        }
    };
    if let Err(err) = &outcome {
        api_metrics::error(endpoint, err.code);
    }
    outcome
}

fn reject(endpoint: &'static str, rejection: QueryRejection) -> ApiError {
    warn!(endpoint, error = %rejection, "Rejected query string");
    api_metrics::error(endpoint, "INVALID_PARAMETER");
    ApiError::invalid_parameter(rejection.body_text())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "urban-mobility-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn stats(State(state): State<AppState>) -> Result<Json<analytics::StatsReport>, ApiError> {
    run_query(&state, "stats", "STATS_FAILED", analytics::stats).await
}

async fn trips(
    State(state): State<AppState>,
    query: Result<Query<TripQuery>, QueryRejection>,
) -> Result<Json<analytics::TripPage>, ApiError> {
    let Query(query) = query.map_err(|r| reject("trips", r))?;
    run_query(&state, "trips", "TRIPS_FAILED", move |conn| {
        analytics::trips(conn, &query)
    })
    .await
}

async fn zones(State(state): State<AppState>) -> Result<Json<Vec<analytics::ZoneView>>, ApiError> {
    run_query(&state, "zones", "ZONES_FAILED", analytics::zones).await
}

async fn busiest_zones(
    State(state): State<AppState>,
) -> Result<Json<Vec<analytics::ZoneCount>>, ApiError> {
    run_query(&state, "busiest-zones", "BUSIEST_ZONES_FAILED", analytics::busiest_zones).await
}

async fn all_zones(State(state): State<AppState>) -> Result<Json<Vec<analytics::ZoneCount>>, ApiError> {
    run_query(&state, "all-zones", "ALL_ZONES_FAILED", analytics::zones_with_counts).await
}

async fn hourly_distribution(
    State(state): State<AppState>,
    range: Result<Query<DateRange>, QueryRejection>,
) -> Result<Json<[i64; 24]>, ApiError> {
    let Query(range) = range.map_err(|r| reject("hourly-distribution", r))?;
    run_query(
        &state,
        "hourly-distribution",
        "HOURLY_DISTRIBUTION_FAILED",
        move |conn| analytics::hourly_distribution(conn, &range),
    )
    .await
}

async fn fare_analysis(
    State(state): State<AppState>,
    query: Result<Query<FareQuery>, QueryRejection>,
) -> Result<Json<analytics::FareAnalysis>, ApiError> {
    let Query(query) = query.map_err(|r| reject("fare-analysis", r))?;
    run_query(&state, "fare-analysis", "FARE_ANALYSIS_FAILED", move |conn| {
        analytics::fare_analysis(conn, &query)
    })
    .await
}

async fn mobility_insights(
    State(state): State<AppState>,
) -> Result<Json<analytics::MobilityInsights>, ApiError> {
    run_query(
        &state,
        "mobility-insights",
        "MOBILITY_INSIGHTS_FAILED",
        analytics::mobility_insights,
    )
    .await
}

async fn vendor_performance(
    State(state): State<AppState>,
) -> Result<Json<analytics::VendorReport>, ApiError> {
    run_query(
        &state,
        "vendor-performance",
        "VENDOR_PERFORMANCE_FAILED",
        analytics::vendor_performance,
    )
    .await
}

async fn metrics_endpoint() -> Response {
    match crate::observability::render() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

/// Build the router with every API route and permissive GET CORS.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/stats", get(stats))
        .route("/api/trips", get(trips))
        .route("/api/zones", get(zones))
        .route("/api/busiest-zones", get(busiest_zones))
        .route("/api/all-zones", get(all_zones))
        .route("/api/hourly-distribution", get(hourly_distribution))
        .route("/api/fare-analysis", get(fare_analysis))
        .route("/api/mobility-insights", get(mobility_insights))
        .route("/api/vendor-performance", get(vendor_performance))
        .route("/metrics", get(metrics_endpoint))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(cors))
}

/// Serve the API until the process is stopped.
pub async fn start_server(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_router(AppState::from_config(config));

    let host: std::net::IpAddr = config.server.host.parse()?;
    let port = config.server.port;
    let addr = SocketAddr::from((host, port));

    info!(%addr, database = %config.database_path.display(), "Starting API server");
    println!("🚀 API server running on http://localhost:{port}");
    println!("💚 Health check: http://localhost:{port}/health");
    println!("📊 Stats:        http://localhost:{port}/api/stats");
    println!("📈 Metrics:      http://localhost:{port}/metrics");

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
