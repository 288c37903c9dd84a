use clap::{Args, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send commands to an engine and print each reply.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, connection: &ConnectionArgs, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, connection, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Engine endpoint: host[:port] or unix:/path/to/socket.
    #[arg(
        long,
        short = 'e',
        env = "MVCP_ENDPOINT",
        default_value = "localhost:5250",
        global = true
    )]
    pub endpoint: String,
    /// Connect and per-reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", global = true)]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Commands to send, one per argument (e.g. "load u0 clip.mp4" "play u0").
    #[arg(
        value_name = "COMMAND",
        required_unless_present = "file",
        conflicts_with = "file"
    )]
    pub commands: Vec<String>,
    /// Read commands from a file, one per line. Blank lines and lines
    /// starting with '#' are skipped.
    #[arg(long, value_name = "PATH")]
    pub file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
