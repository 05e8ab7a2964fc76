mod common;

use std::cell::RefCell;
use std::collections::VecDeque;
use urban_mobility::error::Result;
use urban_mobility::pipeline::ExclusionReason;
use urban_mobility::prompt::{AssumeYes, BatchAction, Prompter, SchemaChoice};
use urban_mobility::storage::TripStore;
use urban_mobility::tasks::{self, ProcessOutcome, SetupOptions};

/// Replays canned answers in order.
struct ScriptedPrompter {
    confirms: RefCell<VecDeque<bool>>,
    actions: RefCell<VecDeque<BatchAction>>,
}

impl ScriptedPrompter {
    fn new(confirms: &[bool], actions: &[BatchAction]) -> Self {
        Self {
            confirms: RefCell::new(confirms.iter().copied().collect()),
            actions: RefCell::new(actions.iter().copied().collect()),
        }
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, _question: &str, default: bool) -> Result<bool> {
        Ok(self.confirms.borrow_mut().pop_front().unwrap_or(default))
    }

    fn batch_action(&self, _loaded: usize, _remaining: usize) -> Result<BatchAction> {
        Ok(self
            .actions
            .borrow_mut()
            .pop_front()
            .unwrap_or(BatchAction::Quit))
    }

    fn schema_choice(&self) -> Result<SchemaChoice> {
        Ok(SchemaChoice::Keep)
    }
}

#[test]
fn test_clean_and_save_writes_snapshot_and_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::mixed_rows());

    let summary = tasks::clean_and_save(&config, 100).unwrap();
    assert_eq!(summary.input_count, 6);
    assert_eq!(summary.cleaned, 3);
    assert_eq!(summary.excluded, 3);
    assert!((summary.retention_pct - 50.0).abs() < 1e-9);
    assert_eq!(summary.excluded_by_reason[&ExclusionReason::DuplicateId], 1);
    assert_eq!(summary.ledger_path.as_deref(), Some(config.ledger_path.as_path()));

    let ledger = std::fs::read_to_string(&config.ledger_path).unwrap();
    assert_eq!(
        ledger.lines().collect::<Vec<_>>(),
        vec!["id2875421", "id_missing", "id_backwards"]
    );
    assert!(config.cleaned_csv.exists());
}

#[test]
fn test_clean_without_exclusions_skips_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);

    let summary = tasks::clean_and_save(&config, 100).unwrap();
    assert_eq!(summary.excluded, 0);
    assert!(summary.ledger_path.is_none());
    assert!(!config.ledger_path.exists());
}

#[test]
fn test_declined_confirmation_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);

    let prompter = ScriptedPrompter::new(&[false], &[]);
    let result = tasks::clean_with_confirmation(&config, 100, &prompter).unwrap();
    assert!(result.is_none());
    assert!(!config.cleaned_csv.exists());
}

#[test]
fn test_process_if_needed_cleans_then_skips() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::mixed_rows());
    let mut store = tasks::open_store(&config).unwrap();

    match tasks::process_if_needed(&config, &mut store).unwrap() {
        ProcessOutcome::CleanedAndLoaded { cleaning, load } => {
            assert_eq!(cleaning.cleaned, 3);
            assert_eq!(load.trips_inserted, 3);
        }
        other => panic!("expected a clean and load, got {other:?}"),
    }
    assert!(config.ledger_path.exists());

    match tasks::process_if_needed(&config, &mut store).unwrap() {
        ProcessOutcome::AlreadyLoaded { trips } => assert_eq!(trips, 3),
        other => panic!("expected a skip, got {other:?}"),
    }
}

#[test]
fn test_process_if_needed_prefers_existing_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);
    tasks::clean_and_save(&config, 100).unwrap();
    std::fs::remove_file(&config.raw_csv).unwrap();

    let mut store = tasks::open_store(&config).unwrap();
    match tasks::process_if_needed(&config, &mut store).unwrap() {
        ProcessOutcome::LoadedSnapshot { load } => assert_eq!(load.trips_inserted, 3),
        other => panic!("expected a snapshot load, got {other:?}"),
    }
}

#[test]
fn test_interactive_load_stops_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);
    tasks::clean_and_save(&config, 100).unwrap();

    let mut store = tasks::open_store(&config).unwrap();
    let prompter = ScriptedPrompter::new(&[], &[BatchAction::Continue, BatchAction::Quit]);
    let summary = tasks::load_interactive(&config, &mut store, 1, &prompter)
        .unwrap()
        .unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.records_loaded, 2);
    assert!(summary.stopped_early);
    assert_eq!(store.trip_count().unwrap(), 2);
}

#[test]
fn test_interactive_load_all_finishes_remaining() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);

    let mut store = tasks::open_store(&config).unwrap();
    // No snapshot yet: AssumeYes confirms the clean, then loads everything after batch one
    let summary = tasks::load_interactive(&config, &mut store, 1, &AssumeYes)
        .unwrap()
        .unwrap();

    assert_eq!(summary.records_loaded, 3);
    assert_eq!(summary.batches, 2);
    assert!(!summary.stopped_early);
    assert_eq!(summary.load.trips_inserted, 3);
}

#[test]
fn test_setup_recreate_reuses_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::VALID_ROWS);

    let mut store = tasks::open_store(&config).unwrap();
    tasks::process_if_needed(&config, &mut store).unwrap();

    let options = SetupOptions {
        schema: Some(SchemaChoice::Recreate),
        ..SetupOptions::default()
    };
    let summary = tasks::setup(&config, &mut store, options, &AssumeYes).unwrap();
    assert_eq!(summary.schema, "recreate");
    assert!(summary.cleaning.is_none());
    assert_eq!(summary.load.trips_inserted, 3);
    assert_eq!(store.counts().unwrap().trips, 3);
}

#[test]
fn test_setup_clear_with_fresh_clean() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::config_in(dir.path());
    common::write_raw_csv(&config.raw_csv, &common::mixed_rows());

    let mut store = tasks::open_store(&config).unwrap();
    let options = SetupOptions {
        schema: Some(SchemaChoice::Clear),
        reuse_snapshot: Some(false),
        max_records: Some(4),
    };
    let summary = tasks::setup(&config, &mut store, options, &AssumeYes).unwrap();
    let cleaning = summary.cleaning.unwrap();
    assert_eq!(cleaning.input_count, 4);
    assert_eq!(cleaning.cleaned, 3);
    assert_eq!(summary.load.trips_inserted, 3);
}
