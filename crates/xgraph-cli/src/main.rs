//! xgraph CLI
//!
//! Command-line front end for the mapping engine:
//! - `run`: map one XML document (or a directory of them) to triples
//! - `check`: load and validate a mapping and policy without executing

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

mod run;

#[derive(Parser)]
#[command(name = "xgraph")]
#[command(author, version, about = "xgraph: declarative XML-to-RDF mapping")]
struct Cli {
    /// Log traversal decisions (DEBUG).
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Only log errors.
    #[arg(short, long, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a mapping against XML input and write the resulting triples.
    Run(RunArgs),
    /// Load and validate a mapping (and policy) without executing it.
    Check(ConfigArgs),
}

#[derive(Args, Clone)]
pub(crate) struct ConfigArgs {
    /// Mapping specification (`<x3ml>` XML or JSON).
    #[arg(short, long)]
    pub(crate) mapping: PathBuf,
    /// Generator policy (`<generator_policy>` XML or JSON).
    #[arg(short, long)]
    pub(crate) policy: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub(crate) struct RunArgs {
    /// XML input: a file, a directory of `*.xml` files, or `@` for stdin.
    #[arg(short = 'x', long)]
    pub(crate) xml: PathBuf,
    #[command(flatten)]
    pub(crate) config: ConfigArgs,
    /// Output file (default: stdout).
    #[arg(short, long)]
    pub(crate) out: Option<PathBuf>,
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Ntriples)]
    pub(crate) format: OutputFormat,
    /// Replace random UUIDs with sequential `uuid:AAA...` identifiers of this width.
    #[arg(long)]
    pub(crate) uuid_test_size: Option<usize>,
    /// Exit non-zero when any resolution was skipped.
    #[arg(long)]
    pub(crate) strict: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Ntriples,
    Json,
}

fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else if quiet {
        tracing::Level::ERROR
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Run(args) => run::cmd_run(&args),
        Commands::Check(args) => run::cmd_check(&args),
    }
}
