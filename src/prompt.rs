//! Operator prompts for interactive loading and setup.
//!
//! Tasks receive a `&dyn Prompter` so the same flow runs against a terminal
//! (`DialoguerPrompter`) or unattended (`AssumeYes`).

use crate::error::{MobilityError, Result};
use dialoguer::{Confirm, Select};

/// What to do after an interactive batch finishes loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction {
    Continue,
    LoadAll,
    Quit,
}

/// How setup should treat an existing schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemaChoice {
    /// Drop and recreate all tables.
    Recreate,
    /// Delete all rows but keep the tables.
    Clear,
    /// Leave existing data in place.
    Keep,
}

pub trait Prompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    fn batch_action(&self, loaded: usize, remaining: usize) -> Result<BatchAction>;

    fn schema_choice(&self) -> Result<SchemaChoice>;
}

/// Answers every prompt affirmatively: confirm yes, load everything, keep the schema.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssumeYes;

impl Prompter for AssumeYes {
    fn confirm(&self, _question: &str, _default: bool) -> Result<bool> {
        Ok(true)
    }

    fn batch_action(&self, _loaded: usize, _remaining: usize) -> Result<BatchAction> {
        Ok(BatchAction::LoadAll)
    }

    fn schema_choice(&self) -> Result<SchemaChoice> {
        Ok(SchemaChoice::Keep)
    }
}

/// Terminal prompts backed by `dialoguer`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialoguerPrompter;

impl Prompter for DialoguerPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        Confirm::new()
            .with_prompt(question)
            .default(default)
            .interact()
            .map_err(|e| MobilityError::Prompt(e.to_string()))
    }

    fn batch_action(&self, loaded: usize, remaining: usize) -> Result<BatchAction> {
        let items = [
            "Load next batch".to_string(),
            format!("Load all {remaining} remaining"),
            "Stop here".to_string(),
        ];
        let idx = Select::new()
            .with_prompt(format!("Loaded {loaded} records so far, {remaining} remaining"))
            .items(&items)
            .default(0)
            .interact()
            .map_err(|e| MobilityError::Prompt(e.to_string()))?;

        Ok(match idx {
            0 => BatchAction::Continue,
            1 => BatchAction::LoadAll,
            _ => BatchAction::Quit,
        })
    }

    fn schema_choice(&self) -> Result<SchemaChoice> {
        let items = [
            "Recreate tables (drops existing data)",
            "Clear data, keep tables",
            "Keep existing data",
        ];
        let idx = Select::new()
            .with_prompt("Existing database found. How should it be handled?")
            .items(&items)
            .default(2)
            .interact()
            .map_err(|e| MobilityError::Prompt(e.to_string()))?;

        Ok(match idx {
            0 => SchemaChoice::Recreate,
            1 => SchemaChoice::Clear,
            _ => SchemaChoice::Keep,
        })
    }
}
