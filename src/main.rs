//! CleanData CLI - Import, transform and export CSV datasets
//!
//! # Main Commands
//!
//! ```bash
//! cleandata serve                      # Start HTTP server (port 3000)
//! cleandata import data.csv            # Import a CSV into the session
//! cleandata transform "trim emails"    # Run an AI transform
//! cleandata export -o cleaned.csv      # Export the cleaned dataset
//! ```
//!
//! # Debug Commands (for development)
//!
//! ```bash
//! cleandata parse data.csv             # Just parse CSV to JSON
//! cleandata usage                      # Show usage counters and limits
//! cleandata models                     # List the AI model catalog
//! ```

use clap::{Parser, Subcommand};
use cleandata::{
    codec, models_for_tier, pipeline, AiClient, ImportOutcome, PlanTier, SessionStore,
};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cleandata")]
#[command(about = "AI-powered CSV cleaning with plan-metered usage", long_about = None)]
struct Cli {
    /// Directory holding the persisted session state
    #[arg(long, default_value = ".", global = true)]
    state_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a CSV file and output JSON (no session mutation)
    Parse {
        /// Input CSV file
        input: PathBuf,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import a CSV file into the session, subject to plan limits
    Import {
        /// Input CSV file
        input: PathBuf,

        /// Accept a truncated import when the file exceeds remaining quota
        #[arg(long)]
        accept_partial: bool,
    },

    /// Run an AI transform over the session dataset
    Transform {
        /// Cleaning instruction for the AI
        instruction: String,

        /// Model to use (default: the session's selected model)
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Export the cleaned dataset as CSV
    Export {
        /// Output file (default: cleaned_<source> in the current dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clear the session dataset
    Clear,

    /// Show usage counters and plan limits
    Usage,

    /// Reset usage counters for a new billing period
    ResetUsage,

    /// List available AI models and their plan tiers
    Models,

    /// Set the session's plan tier (standard | pro)
    Plan {
        /// Tier identifier
        tier: String,
    },

    /// Start the HTTP server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Parse { input, output } => cmd_parse(&input, output.as_deref()),
        Commands::Import {
            input,
            accept_partial,
        } => cmd_import(&cli.state_dir, &input, accept_partial),
        Commands::Transform { instruction, model } => {
            cmd_transform(&cli.state_dir, &instruction, model).await
        }
        Commands::Export { output } => cmd_export(&cli.state_dir, output.as_deref()),
        Commands::Clear => cmd_clear(&cli.state_dir),
        Commands::Usage => cmd_usage(&cli.state_dir),
        Commands::ResetUsage => cmd_reset_usage(&cli.state_dir),
        Commands::Models => cmd_models(&cli.state_dir),
        Commands::Plan { tier } => cmd_plan(&cli.state_dir, &tier),
        Commands::Serve { port } => cmd_serve(port, &cli.state_dir).await,
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_parse(input: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Parsing CSV: {}", input.display());

    let bytes = fs::read(input)?;
    let text = codec::decode(&bytes)?;
    let rows = codec::parse(&text);

    eprintln!("   Columns: {}", codec::columns(&rows).join(", "));
    eprintln!("✅ Parsed {} rows", rows.len());

    let json = serde_json::to_string_pretty(&rows)?;
    write_output(&json, output)?;

    Ok(())
}

fn cmd_import(
    state_dir: &Path,
    input: &Path,
    accept_partial: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", input.display());

    let bytes = fs::read(input)?;
    let file_name = input
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("upload.csv");

    let mut store = SessionStore::load(state_dir);
    match pipeline::import_bytes(&mut store, &bytes, file_name, accept_partial)? {
        ImportOutcome::Admitted(summary) => {
            eprintln!("   Columns: {}", summary.columns.join(", "));
            eprintln!(
                "   Size: {}",
                codec::format_size(summary.byte_size as u64)
            );
            if summary.truncated {
                eprintln!(
                    "⚠️  Partial import: {} of {} rows admitted (quota limit)",
                    summary.admitted_rows, summary.total_rows
                );
            } else {
                eprintln!("✅ Imported {} rows", summary.admitted_rows);
            }
        }
        ImportOutcome::PartialAvailable {
            admissible,
            total_rows,
        } => {
            eprintln!(
                "⚠️  File has {} rows but only {} remain in your monthly quota.",
                total_rows, admissible
            );
            eprintln!(
                "   Re-run with --accept-partial to import the first {} rows.",
                admissible
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn cmd_transform(
    state_dir: &Path,
    instruction: &str,
    model: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SessionStore::load(state_dir);
    if let Some(model) = model {
        store.set_model(model)?;
    }

    eprintln!("🤖 Model: {}", store.selected_model());

    let client = AiClient::from_env()?;
    let summary = pipeline::run_transform(&mut store, &client, instruction).await?;

    eprintln!(
        "✅ Merged {} transformed rows into {} dataset rows",
        summary.rows_returned,
        store.dataset().len()
    );

    Ok(())
}

fn cmd_export(state_dir: &Path, output: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::load(state_dir);
    let payload = pipeline::export(&store)?;

    let path = output
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&payload.file_name));
    fs::write(&path, &payload.content)?;
    eprintln!("💾 Exported {} rows to: {}", store.dataset().len(), path.display());

    Ok(())
}

fn cmd_clear(state_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SessionStore::load(state_dir);
    pipeline::clear(&mut store)?;
    eprintln!("🗑️  Dataset cleared");
    Ok(())
}

fn cmd_usage(state_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::load(state_dir);
    let limits = store.plan().limits();
    let usage = store.usage();

    println!("📊 Plan: {}", store.plan().name());
    println!("   Rows processed: {} / {}", usage.rows_processed, limits.monthly_rows);
    println!("   AI calls made:  {}", usage.ai_calls_made);
    println!(
        "   Max file size:  {}",
        codec::format_size(limits.max_file_size)
    );
    println!("   Max columns:    {}", limits.max_columns);

    Ok(())
}

fn cmd_reset_usage(state_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut store = SessionStore::load(state_dir);
    store.reset_usage()?;
    eprintln!("✅ Usage counters reset");
    Ok(())
}

fn cmd_models(state_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let store = SessionStore::load(state_dir);
    let tier = store.plan();

    println!("🤖 Available models ({} plan):\n", tier.name());
    for model in models_for_tier(PlanTier::Pro) {
        let marker = if tier.can_use_model(model.id) {
            "✅"
        } else {
            "🔒"
        };
        println!("  {} {} ({})", marker, model.name, model.id);
        println!("     {}", model.description);
        println!("     Tier: {}", model.tier.name());
        println!();
    }

    Ok(())
}

fn cmd_plan(state_dir: &Path, tier: &str) -> Result<(), Box<dyn std::error::Error>> {
    let tier = PlanTier::from_code(tier)
        .ok_or_else(|| format!("Unknown tier: {} (expected standard or pro)", tier))?;

    let mut store = SessionStore::load(state_dir);
    store.set_plan(tier)?;

    let limits = tier.limits();
    eprintln!("✅ Plan set to {}", tier.name());
    eprintln!("   Monthly rows: {}", limits.monthly_rows);
    eprintln!("   Max file size: {}", codec::format_size(limits.max_file_size));

    Ok(())
}

async fn cmd_serve(port: u16, state_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    cleandata::server::start_server(port, state_dir).await
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Output written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
