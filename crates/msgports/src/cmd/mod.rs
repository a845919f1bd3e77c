use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod decode;
pub mod replay;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scenario script through a port registry and senders.
    Replay(ReplayArgs),
    /// Print the messages in a wire capture.
    Decode(DecodeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Replay(args) => replay::run(args, format),
        Command::Decode(args) => decode::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ReplayArgs {
    /// Scenario script (JSON).
    pub script: PathBuf,
    /// Also write delivered messages to this file as wire frames.
    #[arg(long, value_name = "FILE")]
    pub out: Option<PathBuf>,
    /// Exit with a data error if any post was rejected.
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct DecodeArgs {
    /// Wire capture written by `replay --out`.
    pub path: PathBuf,
    /// Maximum accepted payload size in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_payload: Option<usize>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
