//! Error types for tapo-core.
//!
//! Every failure surfaces as a variant of [`Error`]. Only transport-level
//! failures ([`Error::Transport`] and [`Error::NonSuccessStatus`]) are retried;
//! cryptographic and parsing failures indicate a protocol mismatch or a
//! corrupted session and are returned immediately.

use std::fmt;

use thiserror::Error;

/// Where an application-level error code was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLayer {
    /// Outer `securePassthrough` envelope (`error_code` / `result.data.code`).
    Passthrough,
    /// Decrypted payload (`err_code` / `err_msg`, or KLAP `error_code`).
    Device,
    /// One entry of a batched `result.responses` array.
    SubRequest,
}

impl fmt::Display for ErrorLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLayer::Passthrough => write!(f, "passthrough"),
            ErrorLayer::Device => write!(f, "device"),
            ErrorLayer::SubRequest => write!(f, "sub-request"),
        }
    }
}

/// Error type for tapo-core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A handshake stage was rejected or returned an unusable response.
    #[error("handshake failed at stage {stage}: {reason}")]
    HandshakeFailed { stage: u8, reason: String },

    /// Key or IV has an unsupported length.
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Ciphertext is not block aligned or not decodable.
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// PKCS7 padding failed validation after decryption.
    #[error("invalid PKCS7 padding")]
    InvalidPadding,

    /// KLAP frame is shorter than its 32-byte signature prefix.
    #[error("frame too short: {len} bytes")]
    FrameTooShort { len: usize },

    /// KLAP frame signature does not match the ciphertext.
    #[error("frame signature mismatch")]
    SignatureMismatch,

    /// Network, DNS or I/O failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The device answered with a status other than 200.
    #[error("unexpected HTTP status {code}")]
    NonSuccessStatus { code: u16 },

    /// The device reported a non-zero error code.
    #[error("{layer} error code {code}{}", describe_context(.context))]
    Application {
        layer: ErrorLayer,
        code: i64,
        context: Option<String>,
    },

    /// Every allowed attempt failed.
    #[error("request failed{}: {cause}", describe_status(.status))]
    RequestFailed {
        status: Option<u16>,
        cause: Box<Error>,
    },

    /// The caller's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// Unexpected response shape or invalid JSON.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Returns `true` for failures the retry policy may act on.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::NonSuccessStatus { .. })
    }

    pub(crate) fn handshake(stage: u8, reason: impl Into<String>) -> Self {
        Error::HandshakeFailed {
            stage,
            reason: reason.into(),
        }
    }
}

fn describe_context(context: &Option<String>) -> String {
    match context {
        Some(context) => format!(" ({})", context),
        None => String::new(),
    }
}

fn describe_status(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!(" with status {}", status),
        None => String::new(),
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Protocol(format!("invalid JSON: {}", err))
    }
}
