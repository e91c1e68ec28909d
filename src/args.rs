//! CLI argument parsing with clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Replay recorded desktop step sequences.
///
/// Each executed step is printed to stdout as one JSON line; logs go to
/// stderr (tune with RUST_LOG).
#[derive(Debug, Parser)]
#[command(name = "seeclaw-replay", version)]
pub struct Cli {
    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a recording against the live desktop
    #[command(after_help = "\
Examples:
  seeclaw-replay play login.json                 # Play from the first step
  seeclaw-replay play login.json --start 4       # Resume at step index 4
  seeclaw-replay play login.json --window 1337   # Search inside one window
  seeclaw-replay play login.json -c ./replay.toml")]
    Play(PlayArgs),

    /// Check a recording for steps that cannot be replayed
    Validate(ValidateArgs),
}

#[derive(Debug, Args)]
pub struct PlayArgs {
    /// Recording JSON file
    pub recording: PathBuf,

    /// Step index to start from
    #[arg(short, long, default_value_t = 0)]
    pub start: usize,

    /// Config file [default: config.toml in the standard locations]
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Platform window id used for whole-window captures
    #[arg(short, long)]
    pub window: Option<u32>,
}

#[derive(Debug, Args)]
pub struct ValidateArgs {
    /// Recording JSON file
    pub recording: PathBuf,
}
