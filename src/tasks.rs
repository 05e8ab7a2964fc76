//! Orchestration for the CLI: cleaning to disk, loading snapshots, the
//! process-if-needed path, interactive batch loading and database setup.

use crate::config::Config;
use crate::pipeline::{source, CleaningPipeline, ExclusionReason, LoadReport, Loader};
use crate::prompt::{BatchAction, Prompter, SchemaChoice};
use crate::storage::{ResetMode, SqliteStore, TripStore};
use anyhow::Context;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct CleanSummary {
    pub input_count: usize,
    pub cleaned: usize,
    pub excluded: usize,
    pub retention_pct: f64,
    pub excluded_by_reason: BTreeMap<ExclusionReason, usize>,
    pub snapshot_path: PathBuf,
    pub ledger_path: Option<PathBuf>,
}

/// Open the configured SQLite store and make sure the schema exists.
pub fn open_store(config: &Config) -> anyhow::Result<SqliteStore> {
    let mut store = SqliteStore::open(&config.database_path, config.busy_timeout())
        .with_context(|| format!("Failed to open database at {}", config.database_path.display()))?;
    store.init_schema().context("Failed to initialize schema")?;
    Ok(store)
}

/// Clean up to `max_records` raw rows, then write the snapshot and the ledger.
///
/// Nothing is written when the raw source cannot be read.
pub fn clean_and_save(config: &Config, max_records: usize) -> anyhow::Result<CleanSummary> {
    let pipeline = CleaningPipeline::with_zone_grid(config.zone_grid);
    let outcome = pipeline
        .run(&config.raw_csv, max_records)
        .with_context(|| format!("Failed to clean {}", config.raw_csv.display()))?;

    source::write_cleaned_snapshot(&config.cleaned_csv, &outcome.records)
        .context("Failed to write cleaned snapshot")?;
    let ledger_written = source::write_ledger(&config.ledger_path, &outcome.ledger)
        .context("Failed to write exclusion ledger")?;

    Ok(CleanSummary {
        input_count: outcome.input_count,
        cleaned: outcome.records.len(),
        excluded: outcome.ledger.len(),
        retention_pct: outcome.retention_pct(),
        excluded_by_reason: outcome.ledger.count_by_reason(),
        snapshot_path: config.cleaned_csv.clone(),
        ledger_path: ledger_written.then(|| config.ledger_path.clone()),
    })
}

/// Ask before cleaning. Returns `None` when the operator declines.
pub fn clean_with_confirmation(
    config: &Config,
    max_records: usize,
    prompter: &dyn Prompter,
) -> anyhow::Result<Option<CleanSummary>> {
    let question = format!(
        "Clean up to {max_records} records from {} into {}?",
        config.raw_csv.display(),
        config.cleaned_csv.display()
    );
    if !prompter.confirm(&question, false)? {
        info!("Cleaning cancelled by operator");
        return Ok(None);
    }
    clean_and_save(config, max_records).map(Some)
}

/// Load up to `max_records` rows of the cleaned snapshot without recomputing features.
pub fn load_snapshot(
    config: &Config,
    store: &mut dyn TripStore,
    max_records: Option<usize>,
) -> anyhow::Result<LoadReport> {
    let records = source::read_cleaned_snapshot(&config.cleaned_csv, 0, max_records)
        .with_context(|| format!("Failed to read snapshot {}", config.cleaned_csv.display()))?;
    let report = Loader::new(config.chunk_size)
        .load(store, &records)
        .context("Failed to load cleaned records")?;
    Ok(report)
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProcessOutcome {
    AlreadyLoaded { trips: i64 },
    LoadedSnapshot { load: LoadReport },
    CleanedAndLoaded { cleaning: CleanSummary, load: LoadReport },
}

/// Populate an empty store: reuse the snapshot if present, otherwise clean the raw feed first.
pub fn process_if_needed(config: &Config, store: &mut dyn TripStore) -> anyhow::Result<ProcessOutcome> {
    if store.has_trips()? {
        let trips = store.trip_count()?;
        info!(trips, "Trips already loaded, skipping processing");
        return Ok(ProcessOutcome::AlreadyLoaded { trips });
    }

    if config.cleaned_csv.exists() {
        info!(path = %config.cleaned_csv.display(), "Loading existing cleaned snapshot");
        let load = load_snapshot(config, store, Some(config.max_records))?;
        return Ok(ProcessOutcome::LoadedSnapshot { load });
    }

    info!("No cleaned snapshot found, cleaning raw data");
    let cleaning = clean_and_save(config, config.max_records)?;
    let load = load_snapshot(config, store, None)?;
    Ok(ProcessOutcome::CleanedAndLoaded { cleaning, load })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractiveSummary {
    pub batches: usize,
    pub records_loaded: usize,
    pub stopped_early: bool,
    pub load: LoadReport,
}

/// Load the snapshot `batch_size` rows at a time, asking after each batch.
///
/// Cleans first (after confirmation) when no snapshot exists. Returns `None`
/// if that cleaning is declined.
pub fn load_interactive(
    config: &Config,
    store: &mut dyn TripStore,
    batch_size: usize,
    prompter: &dyn Prompter,
) -> anyhow::Result<Option<InteractiveSummary>> {
    if !config.cleaned_csv.exists() {
        warn!(path = %config.cleaned_csv.display(), "No cleaned snapshot found");
        if clean_with_confirmation(config, config.max_records, prompter)?.is_none() {
            return Ok(None);
        }
    }

    let batch_size = batch_size.max(1);
    let total = source::count_snapshot_rows(&config.cleaned_csv)?;
    let loader = Loader::new(config.chunk_size);
    let mut summary = InteractiveSummary::default();

    while summary.records_loaded < total {
        let batch = source::read_cleaned_snapshot(
            &config.cleaned_csv,
            summary.records_loaded,
            Some(batch_size),
        )?;
        if batch.is_empty() {
            break;
        }

        let report = loader.load(store, &batch).context("Failed to load batch")?;
        summary.load.absorb(&report);
        summary.records_loaded += batch.len();
        summary.batches += 1;
        info!(
            batch = summary.batches,
            loaded = summary.records_loaded,
            total,
            "Batch committed"
        );

        let remaining = total.saturating_sub(summary.records_loaded);
        if remaining == 0 {
            break;
        }

        match prompter.batch_action(summary.records_loaded, remaining)? {
            BatchAction::Continue => continue,
            BatchAction::LoadAll => {
                let rest = source::read_cleaned_snapshot(&config.cleaned_csv, summary.records_loaded, None)?;
                let report = loader.load(store, &rest).context("Failed to load remaining records")?;
                summary.load.absorb(&report);
                summary.records_loaded += rest.len();
                summary.batches += 1;
                break;
            }
            BatchAction::Quit => {
                summary.stopped_early = true;
                break;
            }
        }
    }

    Ok(Some(summary))
}

#[derive(Debug, Clone, Default)]
pub struct SetupOptions {
    /// Schema handling; asked interactively when `None`.
    pub schema: Option<SchemaChoice>,
    /// Reuse an existing snapshot; asked interactively when `None`.
    pub reuse_snapshot: Option<bool>,
    pub max_records: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupSummary {
    pub schema: &'static str,
    pub cleaning: Option<CleanSummary>,
    pub load: LoadReport,
}

/// Prepare the schema, optionally re-clean, then load the snapshot.
pub fn setup(
    config: &Config,
    store: &mut dyn TripStore,
    options: SetupOptions,
    prompter: &dyn Prompter,
) -> anyhow::Result<SetupSummary> {
    let schema = match options.schema {
        Some(choice) => choice,
        None => prompter.schema_choice()?,
    };

    match schema {
        SchemaChoice::Recreate => store.reset(ResetMode::Recreate)?,
        SchemaChoice::Clear => {
            store.init_schema()?;
            store.reset(ResetMode::ClearData)?;
        }
        SchemaChoice::Keep => store.init_schema()?,
    }
    info!(?schema, "Schema prepared");

    let max_records = options.max_records.unwrap_or(config.max_records);
    let reuse = if config.cleaned_csv.exists() {
        match options.reuse_snapshot {
            Some(reuse) => reuse,
            None => prompter.confirm(
                &format!("Use existing cleaned data in {}?", config.cleaned_csv.display()),
                false,
            )?,
        }
    } else {
        false
    };

    let cleaning = if reuse {
        None
    } else {
        Some(clean_and_save(config, max_records)?)
    };

    let load = load_snapshot(config, store, Some(max_records))?;

    Ok(SetupSummary {
        schema: match schema {
            SchemaChoice::Recreate => "recreate",
            SchemaChoice::Clear => "clear",
            SchemaChoice::Keep => "keep",
        },
        cleaning,
        load,
    })
}
