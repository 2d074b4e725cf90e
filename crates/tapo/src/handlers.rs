use std::time::Duration;

use tapo_core::{Device, Protocol, RetryPolicy, TransportConfig};
use tracing::{debug, error};

use crate::utils::{get_credentials, parse_params, print_json_response};

/// Options for a single `exec` invocation.
pub struct ExecOptions {
    pub target: String,
    pub method: String,
    pub params: Option<String>,
    pub protocol: Protocol,
    pub retries: Option<u32>,
    pub retry_delay: Duration,
    pub retry_403_only: bool,
    pub timeout: Duration,
    pub handshake_delay: Duration,
    pub debug: bool,
}

impl ExecOptions {
    fn config(&self) -> TransportConfig {
        let mut config = TransportConfig::new(&self.target, self.protocol)
            .with_timeout(self.timeout)
            .with_handshake_delay(self.handshake_delay)
            .with_debug(self.debug);
        if let Some(retries) = self.retries {
            config = config.with_retry(
                RetryPolicy::new(retries, self.retry_delay)
                    .with_forbidden_only(self.retry_403_only),
            );
        }
        config
    }
}

/// Handle the exec command.
pub async fn handle_exec(options: ExecOptions, username: Option<String>, password_stdin: bool) {
    let params = match parse_params(options.params.as_deref()) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let credentials = match get_credentials(username, password_stdin) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let config = options.config().with_credentials(credentials);
    debug!(host = %options.target, protocol = %options.protocol, "connecting");

    let mut device = match Device::connect(config).await {
        Ok(device) => device,
        Err(e) => {
            error!(host = %options.target, error = %e, "could not connect to device");
            eprintln!("Error: Could not connect to {}: {}", options.target, e);
            std::process::exit(1);
        }
    };
    debug!(host = device.host(), protocol = %device.protocol(), "connected");

    match device.execute(&options.method, params).await {
        Ok(payload) => print_json_response(&payload),
        Err(e) => {
            error!(method = %options.method, error = %e, "request failed");
            eprintln!("Error: {} failed: {}", options.method, e);
            std::process::exit(1);
        }
    }
}
