mod cli;
mod handlers;
mod utils;

use clap::Parser;

use crate::cli::{Cli, Command};
use crate::handlers::{ExecOptions, handle_exec};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    }

    match cli.command {
        Command::Version => {
            println!("tapo {}", env!("CARGO_PKG_VERSION"));
            println!("tapo-core {}", tapo_core::VERSION);
        }

        Command::Exec {
            target,
            method,
            params,
            protocol,
            retries,
            retry_delay,
            retry_403_only,
            timeout,
            handshake_delay,
            debug,
        } => {
            let options = ExecOptions {
                target,
                method,
                params,
                protocol: protocol.into(),
                retries,
                retry_delay,
                retry_403_only,
                timeout,
                handshake_delay,
                debug,
            };
            handle_exec(options, cli.username, cli.password_stdin).await;
        }
    }
}
