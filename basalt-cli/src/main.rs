//! Basalt CLI: load a module image and execute it.
//!
//! Exit codes:
//! - 0: Success
//! - 1: Input/decode/configuration error
//! - 3: Runtime error (including link failures)

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::ImageFormat;

#[derive(Parser, Debug)]
#[command(name = "basalt")]
#[command(about = "Run Basalt bytecode module images", version)]
struct Cli {
    /// Log debug output to stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a module image and report its exit code
    Run(RunArgs),
    /// Print the declared types and functions of a compiled module
    Info {
        /// Path to a compiled module container
        module: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Path to the module image (default: module.bin)
    pub image: Option<PathBuf>,

    /// TOML file with `image`, `format` and a `[vm]` table
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// How to read the image file
    #[arg(long, value_enum)]
    pub format: Option<ImageFormat>,

    /// Stack region size in bytes
    #[arg(long)]
    pub stack_size: Option<usize>,

    /// Initial heap reservation in bytes
    #[arg(long)]
    pub heap_size: Option<usize>,

    /// Maximum number of instructions to execute
    #[arg(long)]
    pub instruction_limit: Option<u64>,

    /// Print per-opcode counts and timings after the run
    #[arg(long)]
    pub profile: bool,
}

fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match &cli.command {
        Command::Run(args) => commands::run(args),
        Command::Info { module } => commands::info(module),
    };

    if let Err(code) = result {
        process::exit(code);
    }
}
