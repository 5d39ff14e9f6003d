use clap::{Args, Subcommand, ValueEnum};
use std::net::IpAddr;
use std::path::PathBuf;

use dapbridge_server::{DEFAULT_CONSOLE_PORT, DEFAULT_MAX_PROTOCOL_ERRORS, DEFAULT_PORT};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod client;
pub mod info;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the probe-side server.
    Serve(ServeArgs),
    /// Send one request frame and print the response.
    Send(SendArgs),
    /// Query a probe's packet size and count with DAP_Info.
    Info(InfoArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Info(args) => info::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Command processor answering requests in `serve`.
#[derive(Copy, Clone, Debug, ValueEnum, PartialEq, Eq)]
pub enum ProcessorKind {
    /// Respond with the request bytes.
    Echo,
    /// Answer DAP_Info packet size/count; reject every other command.
    DapStub,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "DAPBRIDGE_BIND", default_value = "0.0.0.0")]
    pub bind: IpAddr,
    /// TCP port for framed CMSIS-DAP traffic (0 picks a free port).
    #[arg(long, env = "DAPBRIDGE_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Command processor.
    #[arg(long, value_enum, default_value = "dap-stub")]
    pub processor: ProcessorKind,
    /// Consecutive protocol errors before a client is dropped (0 = never).
    #[arg(long, default_value_t = DEFAULT_MAX_PROTOCOL_ERRORS)]
    pub max_protocol_errors: u32,
    /// Seconds of idle time before the first keepalive probe.
    #[arg(long, default_value_t = 1)]
    pub keepalive_idle: u64,
    /// Seconds between keepalive probes.
    #[arg(long, default_value_t = 1)]
    pub keepalive_interval: u64,
    /// Unanswered keepalive probes before the client is considered gone.
    #[arg(long, default_value_t = 5)]
    pub keepalive_count: u32,
    /// Leave TCP keepalive off.
    #[arg(long, conflicts_with_all = ["keepalive_idle", "keepalive_interval", "keepalive_count"])]
    pub no_keepalive: bool,
    /// Character device to relay on the console port (e.g. /dev/ttyUSB0).
    #[arg(long, value_name = "PATH")]
    pub console_device: Option<PathBuf>,
    /// TCP port for the console relay.
    #[arg(long, default_value_t = DEFAULT_CONSOLE_PORT, requires = "console_device")]
    pub console_port: u16,
    /// Sleep between idle ticks (e.g. 1ms, 10ms).
    #[arg(long, default_value = "1ms")]
    pub idle_sleep: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Probe address (HOST:PORT).
    pub addr: String,
    /// Request payload as hex (e.g. "00 ff").
    #[arg(long, conflicts_with = "file", required_unless_present = "file")]
    pub data: Option<String>,
    /// Read the request payload from a file.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Connect and response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Probe address (HOST:PORT).
    pub addr: String,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<std::time::Duration> {
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

    Ok(match unit {
        "ms" => std::time::Duration::from_millis(value),
        _ => std::time::Duration::from_secs(value),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("bad").is_err());
        assert_eq!(parse_duration("").unwrap_err().code, USAGE);
    }
}
