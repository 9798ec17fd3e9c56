use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

mod commands;

use commands::{Context, InspectFormat, KindArg, OutputFormat};

#[derive(Parser)]
#[command(
    name = "vellum-resolve",
    about = "Resolves cross-dataset references and validates Vellum/ILCD corpora",
    version,
    author,
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Corpus root directory
    #[arg(short, long, default_value = ".", global = true)]
    corpus: PathBuf,

    /// Upper bound for reading a single document, in milliseconds
    #[arg(long, env = "VELLUM_LOAD_TIMEOUT_MS", global = true)]
    timeout_ms: Option<u64>,

    /// Enable verbose output (use -vv for debug output)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the whole corpus, or only the listed datasets
    Validate {
        /// Datasets to validate, as KIND:ID (e.g. flow:0d9d0b8c-...)
        datasets: Vec<String>,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Resolve the unit of every exchange of a process
    Resolve {
        /// Process dataset id
        process: Uuid,

        /// Only resolve the exchange with this internal id
        #[arg(short, long)]
        exchange: Option<u32>,

        #[arg(short, long, value_enum, default_value = "human")]
        format: OutputFormat,
    },

    /// Print a parsed dataset
    Inspect {
        #[arg(value_enum)]
        kind: KindArg,

        id: Uuid,

        #[arg(short, long, value_enum, default_value = "pretty")]
        format: InspectFormat,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag
    init_logging(cli.verbose);

    let context = Context::open(&cli.corpus, cli.timeout_ms)?;

    match cli.command {
        Commands::Validate { datasets, format } => {
            commands::validate_command(&context, &datasets, format).await?;
        }
        Commands::Resolve {
            process,
            exchange,
            format,
        } => {
            commands::resolve_command(&context, process, exchange, format).await?;
        }
        Commands::Inspect { kind, id, format } => {
            commands::inspect_command(&context, kind, id, format).await?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::new("vellum_resolve=warn"), // Default: warnings and errors only
        1 => EnvFilter::new("vellum_resolve=info"), // -v: info messages
        _ => EnvFilter::new("vellum_resolve=debug"), // -vv or more: full debug
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}
