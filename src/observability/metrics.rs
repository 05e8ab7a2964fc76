//! Prometheus metrics for the cleaning pipeline, the loader and the HTTP layer.
//!
//! Recording functions are grouped by phase. They are no-ops until `init`
//! installs the recorder, so library code can call them unconditionally.

use std::fmt;
use std::sync::OnceLock;
use tracing::info;

/// Every metric name emitted by the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Cleaning
    CleaningRecordsRead,
    CleaningRecordsCleaned,
    CleaningRecordsExcluded,
    CleaningDuration,

    // Loader
    LoaderVendorsInserted,
    LoaderZonesWritten,
    LoaderTripsInserted,
    LoaderTripsSkipped,
    LoaderUnresolvedZoneRefs,
    LoaderChunksCommitted,
    LoaderFailures,
    LoaderDuration,

    // API
    ApiRequests,
    ApiErrors,
    ApiRequestDuration,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CleaningRecordsRead => "mobility_cleaning_records_read_total",
            MetricName::CleaningRecordsCleaned => "mobility_cleaning_records_cleaned_total",
            MetricName::CleaningRecordsExcluded => "mobility_cleaning_records_excluded_total",
            MetricName::CleaningDuration => "mobility_cleaning_duration_seconds",

            MetricName::LoaderVendorsInserted => "mobility_loader_vendors_inserted_total",
            MetricName::LoaderZonesWritten => "mobility_loader_zones_written_total",
            MetricName::LoaderTripsInserted => "mobility_loader_trips_inserted_total",
            MetricName::LoaderTripsSkipped => "mobility_loader_trips_skipped_total",
            MetricName::LoaderUnresolvedZoneRefs => "mobility_loader_unresolved_zone_refs_total",
            MetricName::LoaderChunksCommitted => "mobility_loader_chunks_committed_total",
            MetricName::LoaderFailures => "mobility_loader_failures_total",
            MetricName::LoaderDuration => "mobility_loader_duration_seconds",

            MetricName::ApiRequests => "mobility_api_requests_total",
            MetricName::ApiErrors => "mobility_api_errors_total",
            MetricName::ApiRequestDuration => "mobility_api_request_duration_seconds",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static PROMETHEUS_HANDLE: OnceLock<metrics_exporter_prometheus::PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Calling it again after a successful install is a no-op.
pub fn init() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }

    let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {}", e))?;

    PROMETHEUS_HANDLE.set(handle).ok();
    info!("Metrics recorder installed");
    Ok(())
}

/// Render the current metrics in Prometheus text format, if the recorder is installed.
pub fn render() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|handle| handle.render())
}

// ============================================================================
// Cleaning Metrics
// ============================================================================

pub mod cleaning {
    use super::MetricName;

    pub fn records_read(count: usize) {
        ::metrics::counter!(MetricName::CleaningRecordsRead.as_str()).increment(count as u64);
    }

    pub fn records_cleaned(count: usize) {
        ::metrics::counter!(MetricName::CleaningRecordsCleaned.as_str()).increment(count as u64);
    }

    /// Excluded records, labelled by the filter that dropped them.
    pub fn records_excluded(reason: &'static str, count: usize) {
        ::metrics::counter!(MetricName::CleaningRecordsExcluded.as_str(), "reason" => reason)
            .increment(count as u64);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::CleaningDuration.as_str()).record(secs);
    }
}

// ============================================================================
// Loader Metrics
// ============================================================================

pub mod loader {
    use super::MetricName;

    pub fn vendors_inserted(count: usize) {
        ::metrics::counter!(MetricName::LoaderVendorsInserted.as_str()).increment(count as u64);
    }

    pub fn zones_written(count: usize) {
        ::metrics::counter!(MetricName::LoaderZonesWritten.as_str()).increment(count as u64);
    }

    pub fn trips_inserted(count: usize) {
        ::metrics::counter!(MetricName::LoaderTripsInserted.as_str()).increment(count as u64);
    }

    pub fn trips_skipped(count: usize) {
        ::metrics::counter!(MetricName::LoaderTripsSkipped.as_str()).increment(count as u64);
    }

    pub fn unresolved_zone_refs(count: usize) {
        ::metrics::counter!(MetricName::LoaderUnresolvedZoneRefs.as_str()).increment(count as u64);
    }

    pub fn chunk_committed() {
        ::metrics::counter!(MetricName::LoaderChunksCommitted.as_str()).increment(1);
    }

    pub fn failure(phase: &'static str) {
        ::metrics::counter!(MetricName::LoaderFailures.as_str(), "phase" => phase).increment(1);
    }

    pub fn duration(secs: f64) {
        ::metrics::histogram!(MetricName::LoaderDuration.as_str()).record(secs);
    }
}

// ============================================================================
// API Metrics
// ============================================================================

pub mod api {
    use super::MetricName;

    pub fn request(endpoint: &'static str) {
        ::metrics::counter!(MetricName::ApiRequests.as_str(), "endpoint" => endpoint).increment(1);
    }

    pub fn error(endpoint: &'static str, code: &'static str) {
        ::metrics::counter!(
            MetricName::ApiErrors.as_str(),
            "endpoint" => endpoint,
            "code" => code
        )
        .increment(1);
    }

    pub fn request_duration(endpoint: &'static str, secs: f64) {
        ::metrics::histogram!(MetricName::ApiRequestDuration.as_str(), "endpoint" => endpoint)
            .record(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_names_use_crate_prefix_and_unit_suffix() {
        for name in [
            MetricName::CleaningRecordsRead,
            MetricName::LoaderTripsInserted,
            MetricName::ApiRequests,
        ] {
            assert!(name.as_str().starts_with("mobility_"));
            assert!(name.as_str().ends_with("_total"));
        }
        assert!(MetricName::LoaderDuration.as_str().ends_with("_seconds"));
        assert_eq!(
            MetricName::ApiErrors.to_string(),
            "mobility_api_errors_total"
        );
    }
}
