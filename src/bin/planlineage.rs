//! planlineage CLI - extract dataset lineage from a serialized query plan
//!
//! Reads a JSON plan tree, dispatches it as a lifecycle event and writes the
//! resulting lineage record to stdout. Logs go to stderr.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::process;

use planlineage::serialization::{JsonArrayWriter, NdjsonWriter};
use planlineage::{EventKind, LifecycleEvent, LineageConfig, LineageRecord, PlanNode};

const CONFIG_ENV: &str = "PLANLINEAGE_CONFIG";

#[derive(Parser)]
#[command(name = "planlineage")]
#[command(version, about = "Dataset lineage extraction from query plans", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract lineage from a JSON plan file
    Extract {
        /// Path to the JSON-encoded plan tree
        #[arg(short, long)]
        plan: PathBuf,

        /// Lifecycle event to dispatch (start or end)
        #[arg(short, long, default_value = "start")]
        event: EventKind,

        /// Lineage config file (defaults to $PLANLINEAGE_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Ndjson)]
        format: OutputFormat,
    },

    /// Validate a lineage config file
    Validate {
        /// Path to the YAML config file
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Print the producer URI stamped on every facet
    Version {
        /// Lineage config file (defaults to $PLANLINEAGE_CONFIG)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Ndjson,
    Json,
}

fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("planlineage=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract { plan, event, config, format } => extract(plan, event, config, format),
        Commands::Validate { config } => validate_config(config),
        Commands::Version { config } => print_version(config),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Explicit path first, then the environment, then built-in defaults.
fn load_config(path: Option<PathBuf>) -> Result<LineageConfig, String> {
    let path = path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    match path {
        Some(path) => LineageConfig::load_from_file(&path)
            .map_err(|e| format!("Failed to load config: {}", e)),
        None => {
            tracing::debug!("No config given, using defaults");
            Ok(LineageConfig::default())
        }
    }
}

fn extract(
    plan_path: PathBuf,
    kind: EventKind,
    config: Option<PathBuf>,
    format: OutputFormat,
) -> Result<(), String> {
    let config = load_config(config)?;

    let contents = fs::read_to_string(&plan_path)
        .map_err(|e| format!("Failed to read plan {}: {}", plan_path.display(), e))?;
    let plan: PlanNode = serde_json::from_str(&contents)
        .map_err(|e| format!("Failed to parse plan {}: {}", plan_path.display(), e))?;

    let dispatcher = config
        .build_dispatcher()
        .map_err(|e| format!("Failed to build dispatcher: {}", e))?;

    let event = LifecycleEvent::new(kind, Some(plan));
    let outcome = dispatcher.dispatch(&event);

    // Individual failures were already logged by the dispatcher.
    tracing::info!(
        "Visited {} nodes, found {} datasets ({} extractor failures)",
        outcome.nodes_visited(),
        outcome.datasets().len(),
        outcome.failures().len()
    );

    let mut record = LineageRecord::for_event(&event, &outcome, dispatcher.context().producer());
    if config.deduplicate {
        record = record.deduplicated();
    }

    let stdout = io::stdout();
    let out = stdout.lock();
    match format {
        OutputFormat::Ndjson => {
            let mut writer = NdjsonWriter::new(out);
            writer.write(&record).map_err(|e| e.to_string())?;
            writer.flush().map_err(|e| e.to_string())?;
        }
        OutputFormat::Json => {
            let mut writer = JsonArrayWriter::new(out).map_err(|e| e.to_string())?;
            writer.write(&record).map_err(|e| e.to_string())?;
            writer.finish().map_err(|e| e.to_string())?;
        }
    }

    Ok(())
}

fn validate_config(path: PathBuf) -> Result<(), String> {
    let config = LineageConfig::load_from_file(&path)
        .map_err(|e| format!("Invalid config {}: {}", path.display(), e))?;

    let registry = config.build_registry();
    println!("✓ {} is valid", path.display());
    println!("  Extractors: {}", registry.names().join(", "));
    if !config.extension_providers.is_empty() {
        println!("  Extension providers: {}", config.extension_providers.join(", "));
    }
    if let Some(ms) = config.resolver_timeout_ms {
        println!("  Resolver timeout: {}ms", ms);
    }

    Ok(())
}

fn print_version(config: Option<PathBuf>) -> Result<(), String> {
    let config = load_config(config)?;
    println!("{}", config.producer_uri());
    Ok(())
}
