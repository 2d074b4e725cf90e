use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tapo_core::Protocol;

pub fn parse_duration(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let seconds = arg.parse()?;
    Ok(Duration::from_secs(seconds))
}

fn parse_millis(arg: &str) -> Result<Duration, std::num::ParseIntError> {
    let millis = arg.parse()?;
    Ok(Duration::from_millis(millis))
}

/// TP-Link Tapo local protocol client (KLAP and SSL-AES passthrough)
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TP-Link cloud account username (email).
    /// Can also be set via TAPO_USERNAME environment variable.
    #[arg(short, long, global = true, env = "TAPO_USERNAME")]
    pub username: Option<String>,

    /// Read password from stdin.
    /// Useful for scripting: echo "password" | tapo -u user@example.com --password-stdin exec 192.168.1.100 get_device_info
    #[arg(long, global = true)]
    pub password_stdin: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show version information for CLI and core library
    Version,

    /// Execute a single RPC method on a device
    Exec {
        /// Target hostname or IP address, optionally with :port
        target: String,

        /// RPC method name (e.g. get_device_info)
        method: String,

        /// Method parameters as a JSON object
        params: Option<String>,

        /// Transport protocol spoken by the device
        #[arg(long, value_enum, default_value_t = ProtocolArg::Klap)]
        protocol: ProtocolArg,

        /// Retries after a failed attempt (no retries if omitted)
        #[arg(long)]
        retries: Option<u32>,

        /// Delay in seconds between retries
        #[arg(long, value_parser = parse_duration, default_value = "3")]
        retry_delay: Duration,

        /// Only retry when the device answers 403
        #[arg(long = "retry-403-only")]
        retry_403_only: bool,

        /// HTTP timeout in seconds
        #[arg(long, value_parser = parse_duration, default_value = "10")]
        timeout: Duration,

        /// Settling delay after each handshake stage, in milliseconds
        #[arg(long = "handshake-delay-ms", value_parser = parse_millis, default_value = "200")]
        handshake_delay: Duration,

        /// Log decrypted payloads (requires --verbose)
        #[arg(long)]
        debug: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ProtocolArg {
    Klap,
    SslAes,
}

impl From<ProtocolArg> for Protocol {
    fn from(arg: ProtocolArg) -> Self {
        match arg {
            ProtocolArg::Klap => Protocol::Klap,
            ProtocolArg::SslAes => Protocol::SslAes,
        }
    }
}
