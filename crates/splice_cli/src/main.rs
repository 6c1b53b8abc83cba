//! Splice CLI
//!
//! Runs the post-compile class-file pipeline against a project's build
//! output.
//!
//! # Commands
//!
//! - `run` - Resolve segments and run every stage
//! - `resolve` - Show the active segments without touching the output
//! - `redact` - Run redaction and opportunistic pruning only
//! - `inspect` - Summarise a single class file

mod commands;

use clap::{Parser, Subcommand};
use commands::ProjectArgs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Splice post-compile class transformation.
#[derive(Parser)]
#[command(name = "splice")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve segments and run every stage
    Run(ProjectArgs),

    /// Show the active segments and what they would do
    Resolve(ProjectArgs),

    /// Run redaction and opportunistic pruning only
    Redact(ProjectArgs),

    /// Summarise a single class file
    Inspect {
        /// Class file to read
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => commands::run::run(&args)?,
        Commands::Resolve(args) => commands::resolve::run(&args)?,
        Commands::Redact(args) => commands::redact::run(&args)?,
        Commands::Inspect { file, format } => commands::inspect::run(&file, &format)?,
        Commands::Version => {
            println!("Splice CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
