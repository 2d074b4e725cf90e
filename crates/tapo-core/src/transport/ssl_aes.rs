//! SSL-AES secure passthrough transport for Tapo cameras and H-series hubs.
//!
//! Runs over HTTPS on port 443. Devices present self-signed certificates and
//! only negotiate TLS 1.2, so this transport installs its own TLS
//! configuration; it is never shared with other connections.
//!
//! # Protocol Overview
//!
//! 1. **Login 1**: client posts an 8-byte hex `cnonce`; the device answers with
//!    its own nonce in `result.data.nonce`
//! 2. **Login 2**: client posts `digest_passwd`, proving knowledge of the
//!    password; the device answers with a session token (`stok`) and the
//!    starting sequence number
//! 3. **Request**: client posts `{"method":"securePassthrough",...}` wrapping
//!    the AES-CBC encrypted request to `/stok=<stok>/ds`, with `Seq` and
//!    `Tapo_tag` headers
//!
//! The login username is always `admin`; only the password is used.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use rustls::pki_types::ServerName;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Credentials,
    crypto::ssl_aes::{LOCAL_NONCE_LEN, SslAesSession},
    error::Error,
    http::{Endpoint, HttpClient, HttpRequest, HttpResponse, RawHttpClient, Scheme},
    request::RequestEnvelope,
    retry::{RawExchange, RawResponse, RetryExecutor},
    transport::{
        Protocol, Transport, TransportConfig,
        passthrough::{self, PassthroughRequest, PassthroughResponse},
    },
};

/// Default HTTPS port for SSL-AES.
pub const DEFAULT_PORT: u16 = 443;

/// Login username expected by the device.
const LOGIN_USERNAME: &str = "admin";

/// Encryption type requested during login.
const ENCRYPT_TYPE: &str = "3";

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    method: &'static str,
    params: LoginParams<'a>,
}

#[derive(Debug, Serialize)]
struct LoginParams<'a> {
    cnonce: &'a str,
    encrypt_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    digest_passwd: Option<&'a str>,
    username: &'static str,
}

impl<'a> LoginRequest<'a> {
    fn new(cnonce: &'a str, digest_passwd: Option<&'a str>) -> Self {
        Self {
            method: "login",
            params: LoginParams {
                cnonce,
                encrypt_type: ENCRYPT_TYPE,
                digest_passwd,
                username: LOGIN_USERNAME,
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct NonceResponse {
    #[serde(default)]
    result: NonceResult,
}

#[derive(Debug, Default, Deserialize)]
struct NonceResult {
    #[serde(default)]
    data: NonceData,
}

#[derive(Debug, Default, Deserialize)]
struct NonceData {
    #[serde(default)]
    nonce: String,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    result: TokenResult,
}

#[derive(Debug, Default, Deserialize)]
struct TokenResult {
    #[serde(default)]
    stok: String,
    #[serde(default)]
    start_seq: i64,
}

/// Builds the device TLS configuration.
///
/// TLS 1.2 only, a single ECDHE-RSA AES-256-GCM suite, and no certificate
/// verification. Use it only for connections to Tapo devices.
pub fn device_tls_config() -> Result<rustls::ClientConfig, Error> {
    use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
    use rustls::crypto::{CryptoProvider, ring};
    use rustls::pki_types::{CertificateDer, UnixTime};
    use rustls::{DigitallySignedStruct, SignatureScheme};

    #[derive(Debug)]
    struct AcceptAnyCertificate(Vec<SignatureScheme>);

    impl ServerCertVerifier for AcceptAnyCertificate {
        fn verify_server_cert(
            &self,
            _end_entity: &CertificateDer<'_>,
            _intermediates: &[CertificateDer<'_>],
            _server_name: &ServerName<'_>,
            _ocsp_response: &[u8],
            _now: UnixTime,
        ) -> Result<ServerCertVerified, rustls::Error> {
            Ok(ServerCertVerified::assertion())
        }

        fn verify_tls12_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn verify_tls13_signature(
            &self,
            _message: &[u8],
            _cert: &CertificateDer<'_>,
            _dss: &DigitallySignedStruct,
        ) -> Result<HandshakeSignatureValid, rustls::Error> {
            Ok(HandshakeSignatureValid::assertion())
        }

        fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
            self.0.clone()
        }
    }

    let base = ring::default_provider();
    let schemes = base
        .signature_verification_algorithms
        .supported_schemes();
    let provider = CryptoProvider {
        cipher_suites: vec![ring::cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384],
        ..base
    };

    let config = rustls::ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(&[&rustls::version::TLS12])
        .map_err(|e| Error::Transport(format!("TLS configuration rejected: {}", e)))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(schemes)))
        .with_no_client_auth();

    Ok(config)
}

/// Adds the headers the device firmware expects on every request.
fn device_request(endpoint: &Endpoint, path: impl Into<String>, body: Vec<u8>) -> HttpRequest {
    HttpRequest::new(path)
        .header("Accept", "application/json")
        .header("Accept-Encoding", "gzip, deflate")
        .header("Content-Type", "application/json; charset=UTF-8")
        .header("Host", endpoint.authority())
        .header("Referer", format!("https://{}", endpoint.authority()))
        .header("Requestbyapp", "true")
        .header("User-Agent", "Tapo CameraClient Android")
        .body(body)
}

/// An authenticated SSL-AES session bound to one device.
///
/// The sequence number advances only after a response has been decrypted and
/// passed every error check, so a failed call never desynchronizes it from
/// the device.
pub struct SslAesChannel {
    endpoint: Endpoint,
    client: Arc<dyn HttpClient>,
    session: SslAesSession,
    stok: String,
    seq: i64,
    debug: bool,
}

impl SslAesChannel {
    /// Runs both login stages and derives the session.
    pub async fn handshake(
        endpoint: Endpoint,
        client: Arc<dyn HttpClient>,
        credentials: &Credentials,
        config: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut nonce = [0u8; LOCAL_NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let local_nonce = hex::encode_upper(nonce);

        let server_nonce = login_nonce(client.as_ref(), &endpoint, &local_nonce).await?;
        settle(config.handshake_delay).await;

        let session =
            SslAesSession::new(credentials.expose_password(), &local_nonce, &server_nonce);
        let (stok, seq) = login_token(
            client.as_ref(),
            &endpoint,
            &local_nonce,
            &session.digest_password(),
        )
        .await?;
        settle(config.handshake_delay).await;

        debug!(endpoint = %endpoint, seq, "SSL-AES session established");

        Ok(Self {
            endpoint,
            client,
            session,
            stok,
            seq,
            debug: config.debug,
        })
    }

    /// Sequence number the next request will carry.
    pub fn seq(&self) -> i64 {
        self.seq
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl RawExchange for SslAesChannel {
    async fn exchange(&mut self, request: &RequestEnvelope) -> Result<RawResponse, Error> {
        let inner = request.to_json()?;
        let ciphertext = self.session.encrypt(inner.as_bytes())?;
        let outer = serde_json::to_string(&PassthroughRequest::new(&ciphertext))?;
        let tag = self.session.tag(&outer, self.seq);

        debug!(
            endpoint = %self.endpoint,
            seq = self.seq,
            method = %request.method,
            "Sending SSL-AES request"
        );

        let http_request = device_request(
            &self.endpoint,
            format!("/stok={}/ds", self.stok),
            outer.into_bytes(),
        )
        .header("Seq", self.seq.to_string())
        .header("Tapo_tag", tag);
        let response = self.client.post(&self.endpoint, http_request).await?;

        if response.status != 200 {
            return Ok(RawResponse {
                status: response.status,
                body: response.body,
            });
        }

        let ciphertext = PassthroughResponse::parse(&response.body)?.into_ciphertext()?;
        let plaintext = self.session.decrypt(&ciphertext)?;

        if self.debug {
            debug!(payload = %String::from_utf8_lossy(&plaintext), "SSL-AES response");
        } else {
            debug!(bytes = plaintext.len(), "SSL-AES response");
        }

        passthrough::check_payload(&plaintext)?;
        self.seq += 1;

        Ok(RawResponse {
            status: response.status,
            body: plaintext,
        })
    }
}

impl std::fmt::Debug for SslAesChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslAesChannel")
            .field("endpoint", &self.endpoint)
            .field("session", &self.session)
            .field("stok", &"[REDACTED]")
            .field("seq", &self.seq)
            .finish()
    }
}

/// Login stage 1: exchanges nonces.
async fn login_nonce(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    local_nonce: &str,
) -> Result<String, Error> {
    debug!(endpoint = %endpoint, local_nonce, "Performing SSL-AES login1");

    let body = serde_json::to_vec(&LoginRequest::new(local_nonce, None))?;
    let response = post_stage(client, endpoint, 1, body).await?;

    let parsed: NonceResponse = serde_json::from_slice(&response.body)
        .map_err(|e| Error::handshake(1, format!("invalid response: {}", e)))?;
    let server_nonce = parsed.result.data.nonce;
    if server_nonce.is_empty() {
        return Err(Error::handshake(1, "response has no result.data.nonce"));
    }

    debug!(server_nonce = %server_nonce, "Login1 received nonce");
    Ok(server_nonce)
}

/// Login stage 2: exchanges the password digest for a session token.
async fn login_token(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    local_nonce: &str,
    digest_passwd: &str,
) -> Result<(String, i64), Error> {
    debug!(endpoint = %endpoint, "Performing SSL-AES login2");

    let body = serde_json::to_vec(&LoginRequest::new(local_nonce, Some(digest_passwd)))?;
    let response = post_stage(client, endpoint, 2, body).await?;

    let parsed: TokenResponse = serde_json::from_slice(&response.body)
        .map_err(|e| Error::handshake(2, format!("invalid response: {}", e)))?;
    if parsed.error_code != 0 {
        return Err(Error::handshake(
            2,
            format!("device returned error_code {}", parsed.error_code),
        ));
    }
    if parsed.result.stok.is_empty() {
        return Err(Error::handshake(2, "response has no result.stok"));
    }

    debug!(start_seq = parsed.result.start_seq, "Login2 succeeded");
    Ok((parsed.result.stok, parsed.result.start_seq))
}

async fn post_stage(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    stage: u8,
    body: Vec<u8>,
) -> Result<HttpResponse, Error> {
    let response = client
        .post(endpoint, device_request(endpoint, "/", body))
        .await
        .map_err(|e| Error::handshake(stage, e.to_string()))?;

    if response.status != 200 {
        return Err(Error::handshake(
            stage,
            format!("device returned status {}", response.status),
        ));
    }
    Ok(response)
}

async fn settle(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// SSL-AES [`Transport`]: an [`SslAesChannel`] driven by a [`RetryExecutor`].
#[derive(Debug)]
pub struct SslAesTransport {
    host: String,
    channel: SslAesChannel,
    executor: RetryExecutor,
}

impl SslAesTransport {
    /// Connects to the configured host (port 443 unless given).
    pub async fn connect(config: &TransportConfig) -> Result<Self, Error> {
        let endpoint = Endpoint::parse(&config.host, Scheme::Https, DEFAULT_PORT)?;
        let client: Arc<dyn HttpClient> = match &config.http_client {
            Some(client) => Arc::clone(client),
            None => Arc::new(
                RawHttpClient::new(config.timeout).with_tls(Arc::new(device_tls_config()?)),
            ),
        };

        debug!(endpoint = %endpoint, "Attempting SSL-AES connection");
        let channel =
            SslAesChannel::handshake(endpoint, client, &config.credentials, config).await?;

        Ok(Self {
            host: channel.endpoint().authority(),
            channel,
            executor: config.executor(),
        })
    }

    /// Sequence number the next request will carry.
    pub fn seq(&self) -> i64 {
        self.channel.seq()
    }
}

#[async_trait]
impl Transport for SslAesTransport {
    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        request: &RequestEnvelope,
    ) -> Result<Value, Error> {
        let plaintext = self
            .executor
            .execute(cancel, &mut self.channel, request)
            .await?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn protocol(&self) -> Protocol {
        Protocol::SslAes
    }

    fn host(&self) -> &str {
        &self.host
    }
}
