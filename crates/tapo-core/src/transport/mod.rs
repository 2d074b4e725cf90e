//! Transport layer for communicating with Tapo devices.
//!
//! Two encrypted transports are provided:
//!
//! - [`KlapTransport`]: seed-exchange handshake, AES-CBC frames over HTTP on port 80
//! - [`SslAesTransport`]: nonce-exchange login, secure passthrough over HTTPS on port 443
//!
//! Use [`connect`] to run the selected protocol's handshake and get a ready
//! [`Transport`].

pub mod klap;
pub mod passthrough;
pub mod ssl_aes;

pub use klap::KlapTransport;
pub use ssl_aes::SslAesTransport;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    Credentials,
    error::Error,
    http::HttpClient,
    request::RequestEnvelope,
    retry::{RetryExecutor, RetryPolicy},
};

/// Default timeout for HTTP operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default settling delay after each handshake stage.
pub const DEFAULT_HANDSHAKE_DELAY: Duration = Duration::from_millis(200);

/// Encrypted protocol spoken by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// KLAP on port 80.
    Klap,
    /// SSL-AES secure passthrough on port 443.
    SslAes,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Protocol::Klap => write!(f, "KLAP"),
            Protocol::SslAes => write!(f, "SSL-AES"),
        }
    }
}

impl FromStr for Protocol {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "klap" => Ok(Protocol::Klap),
            "ssl-aes" | "ssl_aes" | "sslaes" | "aes" => Ok(Protocol::SslAes),
            other => Err(Error::Protocol(format!("unknown protocol '{}'", other))),
        }
    }
}

/// Configuration for connecting to a device.
#[derive(Clone)]
pub struct TransportConfig {
    /// Device host, optionally with `:port`.
    pub host: String,
    /// Protocol to connect with.
    pub protocol: Protocol,
    /// Account credentials.
    pub credentials: Credentials,
    /// Retry policy; `None` makes exactly one attempt per call.
    pub retry: Option<RetryPolicy>,
    /// Settling delay after each handshake stage.
    pub handshake_delay: Duration,
    /// HTTP connect and I/O timeout for the default client.
    pub timeout: Duration,
    /// Replaces the default HTTP client.
    pub http_client: Option<Arc<dyn HttpClient>>,
    /// Logs decrypted payloads at debug level.
    pub debug: bool,
    /// Verifies the signature of inbound KLAP frames.
    pub verify_signatures: bool,
}

impl TransportConfig {
    pub fn new(host: impl Into<String>, protocol: Protocol) -> Self {
        Self {
            host: host.into(),
            protocol,
            credentials: Credentials::blank(),
            retry: None,
            handshake_delay: DEFAULT_HANDSHAKE_DELAY,
            timeout: DEFAULT_TIMEOUT,
            http_client: None,
            debug: false,
            verify_signatures: false,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_handshake_delay(mut self, delay: Duration) -> Self {
        self.handshake_delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_verify_signatures(mut self, verify: bool) -> Self {
        self.verify_signatures = verify;
        self
    }

    pub(crate) fn executor(&self) -> RetryExecutor {
        RetryExecutor::new(self.retry)
    }
}

impl std::fmt::Debug for TransportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportConfig")
            .field("host", &self.host)
            .field("protocol", &self.protocol)
            .field("credentials", &self.credentials)
            .field("retry", &self.retry)
            .field("handshake_delay", &self.handshake_delay)
            .field("timeout", &self.timeout)
            .field("custom_http_client", &self.http_client.is_some())
            .field("debug", &self.debug)
            .field("verify_signatures", &self.verify_signatures)
            .finish()
    }
}

/// Performs the configured protocol's handshake and returns the channel.
///
/// # Example
///
/// ```no_run
/// use tapo_core::{Credentials, RequestEnvelope};
/// use tapo_core::transport::{Protocol, TransportConfig, connect};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TransportConfig::new("192.168.1.100", Protocol::Klap)
///         .with_credentials(Credentials::new("user@example.com", "password"));
///
///     let mut transport = connect(config).await?;
///     let response = transport
///         .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
///         .await?;
///     println!("{}", response);
///     Ok(())
/// }
/// ```
pub async fn connect(config: TransportConfig) -> Result<Box<dyn Transport>, Error> {
    tracing::debug!(host = %config.host, protocol = %config.protocol, "connecting");
    match config.protocol {
        Protocol::Klap => Ok(Box::new(KlapTransport::connect(&config).await?)),
        Protocol::SslAes => Ok(Box::new(SslAesTransport::connect(&config).await?)),
    }
}

/// An authenticated, encrypted channel to one device.
///
/// `execute` takes `&mut self`: a channel's sequence counter and cookies are
/// single-writer state. Share a transport between tasks only behind a lock.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends one RPC and returns the decrypted JSON payload.
    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        request: &RequestEnvelope,
    ) -> Result<Value, Error>;

    /// Returns the protocol used by this transport.
    fn protocol(&self) -> Protocol;

    /// Returns the device address, including port.
    fn host(&self) -> &str;
}
