//! Command line argument parsing for the tessera CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

/// Tessera - conformance checking for postings codecs
#[derive(Parser, Debug, Clone)]
#[command(name = "tessera")]
#[command(about = "Randomized conformance checks for postings codecs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct TesseraArgs {
    /// Verbosity level (repeat for more: -v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl TesseraArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n + 1,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Write a random segment with a codec and verify every read path
    Verify(VerifyArgs),

    /// Print the default configuration as JSON
    Config,
}

/// Arguments for a conformance run
#[derive(Parser, Debug, Clone)]
pub struct VerifyArgs {
    /// Codec to check (default: every codec)
    #[arg(short, long)]
    pub codec: Option<CodecName>,

    /// Seed of the run (default: random)
    #[arg(short, long, env = "TESSERA_SEED")]
    pub seed: Option<u64>,

    /// Rounds per verifier thread
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Number of verifier threads
    #[arg(short, long)]
    pub threads: Option<usize>,

    /// Configuration file (JSON)
    #[arg(long, value_name = "CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Write segments into this directory instead of memory
    #[arg(long, value_name = "DIR")]
    pub storage_dir: Option<PathBuf>,

    /// Keep the codec's configured tuning instead of randomizing it
    #[arg(long)]
    pub fixed_codec: bool,
}

/// Codecs selectable from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecName {
    Simple,
    Block,
}

impl CodecName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodecName::Simple => "simple",
            CodecName::Block => "block",
        }
    }
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}
