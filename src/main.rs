use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use urban_mobility::config::Config;
use urban_mobility::constants::DEFAULT_INTERACTIVE_BATCH_SIZE;
use urban_mobility::prompt::{AssumeYes, DialoguerPrompter, Prompter, SchemaChoice};
use urban_mobility::tasks::{self, CleanSummary, ProcessOutcome, SetupOptions};
use urban_mobility::{analytics, logging, observability, server};

#[derive(Parser)]
#[command(name = "urban_mobility")]
#[command(about = "NYC taxi trip cleaning, loading and analytics")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./mobility.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean the raw CSV and write the snapshot and exclusion ledger
    Clean {
        #[arg(long)]
        max_records: Option<usize>,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Load the cleaned snapshot into the database
    Load {
        #[arg(long)]
        max_records: Option<usize>,
    },
    /// Populate an empty database from the snapshot, cleaning first if needed
    Process,
    /// Load the snapshot batch by batch with a prompt after each
    Interactive {
        #[arg(long, default_value_t = DEFAULT_INTERACTIVE_BATCH_SIZE)]
        batch_size: usize,
    },
    /// Prepare the schema, optionally re-clean, then load
    Setup {
        #[arg(long, value_enum)]
        schema: Option<SchemaChoice>,
        /// Reuse the existing cleaned snapshot instead of re-cleaning
        #[arg(long)]
        reuse_snapshot: bool,
        /// Answer every prompt with its automatic default
        #[arg(long)]
        yes: bool,
    },
    /// Create the normalized tables if they do not exist
    InitDb,
    /// Print the overview statistics as JSON
    Stats,
    /// Start the HTTP API
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

fn print_clean_summary(summary: &CleanSummary) {
    println!("\n📊 Cleaning results:");
    println!("   Input records: {}", summary.input_count);
    println!("   Cleaned: {}", summary.cleaned);
    println!("   Excluded: {}", summary.excluded);
    println!("   Retained: {:.1}%", summary.retention_pct);
    for (reason, count) in &summary.excluded_by_reason {
        println!("     - {}: {}", reason.as_str(), count);
    }
    println!("   Snapshot: {}", summary.snapshot_path.display());
    match &summary.ledger_path {
        Some(path) => println!("   Ledger: {}", path.display()),
        None => println!("   Ledger: (nothing excluded)"),
    }
}

fn print_load_report(report: &urban_mobility::pipeline::LoadReport) {
    println!("\n📦 Load results:");
    println!("   Vendors inserted: {}", report.vendors_inserted);
    println!("   Zones written: {}", report.zones_written);
    println!("   Trips inserted: {}", report.trips_inserted);
    println!("   Trips skipped (already present): {}", report.trips_skipped);
    if report.unresolved_zone_refs > 0 {
        println!("   ⚠️  Unresolved zone references: {}", report.unresolved_zone_refs);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Clean { max_records, yes } => {
            println!("🧹 Cleaning {}...", config.raw_csv.display());
            let max = max_records.unwrap_or(config.max_records);
            let prompter: Box<dyn Prompter> = if yes {
                Box::new(AssumeYes)
            } else {
                Box::new(DialoguerPrompter)
            };
            match tasks::clean_with_confirmation(&config, max, prompter.as_ref())? {
                Some(summary) => {
                    print_clean_summary(&summary);
                    println!("✅ Cleaning completed");
                }
                None => println!("⏹️  Cleaning cancelled"),
            }
        }
        Commands::Load { max_records } => {
            println!("📥 Loading {}...", config.cleaned_csv.display());
            let mut store = tasks::open_store(&config)?;
            let report = tasks::load_snapshot(&config, &mut store, max_records)?;
            print_load_report(&report);
            println!("✅ Load completed");
        }
        Commands::Process => {
            println!("🔄 Processing data if needed...");
            let mut store = tasks::open_store(&config)?;
            match tasks::process_if_needed(&config, &mut store)? {
                ProcessOutcome::AlreadyLoaded { trips } => {
                    println!("ℹ️  Database already holds {trips} trips, nothing to do");
                }
                ProcessOutcome::LoadedSnapshot { load } => print_load_report(&load),
                ProcessOutcome::CleanedAndLoaded { cleaning, load } => {
                    print_clean_summary(&cleaning);
                    print_load_report(&load);
                }
            }
            println!("✅ Processing completed");
        }
        Commands::Interactive { batch_size } => {
            let mut store = tasks::open_store(&config)?;
            match tasks::load_interactive(&config, &mut store, batch_size, &DialoguerPrompter)? {
                Some(summary) => {
                    print_load_report(&summary.load);
                    println!(
                        "   Batches: {} ({} records)",
                        summary.batches, summary.records_loaded
                    );
                    if summary.stopped_early {
                        println!("⏹️  Stopped before loading every record");
                    } else {
                        println!("✅ All records loaded");
                    }
                }
                None => println!("⏹️  Nothing loaded"),
            }
        }
        Commands::Setup {
            schema,
            reuse_snapshot,
            yes,
        } => {
            println!("🛠️  Setting up database at {}...", config.database_path.display());
            let mut store = tasks::open_store(&config)?;
            let prompter: Box<dyn Prompter> = if yes {
                Box::new(AssumeYes)
            } else {
                Box::new(DialoguerPrompter)
            };
            let options = SetupOptions {
                schema,
                reuse_snapshot: (reuse_snapshot || yes).then_some(reuse_snapshot),
                max_records: None,
            };
            let summary = tasks::setup(&config, &mut store, options, prompter.as_ref())?;
            println!("   Schema: {}", summary.schema);
            if let Some(cleaning) = &summary.cleaning {
                print_clean_summary(cleaning);
            }
            print_load_report(&summary.load);
            println!("✅ Setup completed");
            println!("\n👉 Start the API with: urban_mobility serve");
        }
        Commands::InitDb => {
            tasks::open_store(&config)?;
            println!("✅ Schema ready at {}", config.database_path.display());
        }
        Commands::Stats => {
            let store = tasks::open_store(&config)?;
            let report = analytics::stats(store.connection()).context("Failed to compute stats")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            runtime
                .block_on(server::start_server(&config))
                .map_err(|e| anyhow::anyhow!("Server error: {e}"))?;
        }
    }

    Ok(())
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();

    if let Err(e) = observability::init() {
        error!("Failed to install metrics recorder: {e}");
    }

    let cli = Cli::parse();
    info!("urban_mobility starting");

    if let Err(e) = run(cli) {
        error!("Command failed: {e:#}");
        println!("❌ {e:#}");
        return Err(e);
    }
    Ok(())
}
