//! Core library for communicating with TP-Link Tapo smart home devices.
//!
//! Tapo devices speak one of two encrypted, stateful RPC transports over the
//! local network:
//!
//! - **KLAP** (plugs, bulbs, hubs): a seed-exchange handshake over HTTP, then
//!   AES-CBC frames whose IV and signature are bound to a sequence number
//! - **SSL-AES passthrough** (cameras, H-series hubs): a nonce-exchange login
//!   over HTTPS, then every call wrapped in an encrypted `securePassthrough`
//!   envelope signed with a per-request tag
//!
//! Both are exposed through the [`Transport`] trait: hand it a
//! [`RequestEnvelope`], get back the decrypted JSON payload.
//!
//! # Example
//!
//! ```no_run
//! use tapo_core::{Credentials, Device, Protocol, RetryPolicy, TransportConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tapo_core::Error> {
//!     let config = TransportConfig::new("192.168.1.100", Protocol::Klap)
//!         .with_credentials(Credentials::new("user@example.com", "password"))
//!         .with_retry(RetryPolicy::default());
//!
//!     let mut device = Device::connect(config).await?;
//!     let info = device.execute("get_device_info", None).await?;
//!     println!("{}", info["result"]["model"]);
//!     Ok(())
//! }
//! ```
//!
//! # Concurrency
//!
//! A transport owns a sequence counter and session cookies that must advance
//! in lock-step with the device. [`Transport::execute`] therefore takes
//! `&mut self`; to share one device between tasks, put it behind a
//! `tokio::sync::Mutex`.

pub mod credentials;
pub mod crypto;
pub mod device;
pub mod error;
pub mod http;
pub mod request;
pub mod retry;
pub mod transport;

pub use credentials::Credentials;
pub use device::Device;
pub use error::{Error, ErrorLayer};
pub use http::{HttpClient, RawHttpClient};
pub use request::RequestEnvelope;
pub use retry::{RetryExecutor, RetryPolicy};
pub use transport::{Protocol, Transport, TransportConfig, connect};

pub use tokio_util::sync::CancellationToken;

/// The version of the tapo-core library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
