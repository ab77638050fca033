mod eval;
mod info;

use std::io::stderr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chdo::dictionary::{ChdoConfiguration, ParserRegistry};
use clap::{Parser, Subcommand};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// CHDO dictionary file.
    #[arg(short, long, value_name = "path", global = true, default_value = "chdo.json")]
    dictionary: PathBuf,

    /// Dictionary format.
    #[arg(long, default_value = "json", global = true)]
    dictionary_kind: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a file of SFDUs.
    Info {
        /// Input SFDU file
        input: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Time field used for the first and last SFDU times.
        #[arg(short, long, default_value = "ert")]
        time_field: String,
    },
    /// Evaluate dictionary properties for every SFDU in a file.
    ///
    /// Results are written one SFDU per line.
    Eval {
        /// Input SFDU file
        input: PathBuf,

        /// Properties to evaluate. Defaults to every property in the dictionary.
        #[arg(short, long, value_delimiter = ',', value_name = "csv")]
        properties: Vec<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Only output SFDUs where all properties are true.
        #[arg(long, action)]
        matching: bool,
    },
}

fn load_dictionary(path: &Path, kind: &str) -> Result<ChdoConfiguration> {
    let registry = ParserRegistry::default();
    let parser = registry
        .resolve(kind)
        .with_context(|| format!("resolving dictionary kind {kind}"))?;
    let config = parser
        .parse(path)
        .with_context(|| format!("loading dictionary {path:?}"))?;
    info!(
        "loaded dictionary version {} from {path:?}",
        config.version()
    );
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("CHDO_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = load_dictionary(&cli.dictionary, &cli.dictionary_kind)?;

    match &cli.command {
        Commands::Info {
            input,
            format,
            time_field,
        } => info::info(&config, input, format, time_field),
        Commands::Eval {
            input,
            properties,
            format,
            matching,
        } => eval::eval(&config, input, properties, format, *matching),
    }
}
