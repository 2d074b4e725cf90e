//! KLAP transport for Tapo plugs, bulbs and hubs.
//!
//! KLAP runs over plain HTTP on port 80. Every request body is an AES-CBC
//! frame whose IV and signature are bound to a per-session sequence number.
//!
//! # Protocol Overview
//!
//! 1. **Handshake 1**: client posts a random 16-byte seed to `/app/handshake1`;
//!    the device answers with its own 16-byte seed and a session cookie
//! 2. **Handshake 2**: client posts `SHA256(remote | local | credential_hash)`
//!    to `/app/handshake2` with the cookie; the device answers 200 if the
//!    credentials match
//! 3. **Request**: client posts `signature | ciphertext` to
//!    `/app/request?seq=N`; the device answers with a frame encrypted under the
//!    same sequence number
//!
//! `credential_hash = SHA256(SHA1(username) | SHA1(password))`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::RngCore;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    Credentials,
    crypto::klap::{KlapSession, SEED_LEN, auth_proof, credential_hash},
    error::Error,
    http::{CookieJar, Endpoint, HttpClient, HttpRequest, HttpResponse, RawHttpClient, Scheme},
    request::RequestEnvelope,
    retry::{RawExchange, RawResponse, RetryExecutor},
    transport::{Protocol, Transport, TransportConfig, passthrough},
};

/// Default HTTP port for KLAP.
pub const DEFAULT_PORT: u16 = 80;

/// An established KLAP session bound to one device.
///
/// Implements [`RawExchange`]: each exchange encrypts the request under the
/// next sequence number and decrypts the response under the same one.
pub struct KlapChannel {
    endpoint: Endpoint,
    client: Arc<dyn HttpClient>,
    cookies: CookieJar,
    session: KlapSession,
    verify_signatures: bool,
    debug: bool,
}

impl KlapChannel {
    /// Runs both handshake stages and derives the session.
    pub async fn handshake(
        endpoint: Endpoint,
        client: Arc<dyn HttpClient>,
        credentials: &Credentials,
        config: &TransportConfig,
    ) -> Result<Self, Error> {
        let mut cookies = CookieJar::new();

        let mut local_seed = [0u8; SEED_LEN];
        rand::rng().fill_bytes(&mut local_seed);

        let remote_seed = seed_exchange(client.as_ref(), &endpoint, &local_seed, &mut cookies).await?;
        settle(config.handshake_delay).await;

        let hash = credential_hash(credentials);
        auth_verify(
            client.as_ref(),
            &endpoint,
            &auth_proof(&local_seed, &remote_seed, &hash),
            &cookies,
        )
        .await?;
        settle(config.handshake_delay).await;

        let session = KlapSession::new(&local_seed, &remote_seed, &hash);
        debug!(endpoint = %endpoint, seq = session.seq(), "KLAP session established");

        Ok(Self {
            endpoint,
            client,
            cookies,
            session,
            verify_signatures: config.verify_signatures,
            debug: config.debug,
        })
    }

    /// Current sequence number.
    pub fn seq(&self) -> i32 {
        self.session.seq()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn request(&self, path: String) -> HttpRequest {
        let request = HttpRequest::new(path);
        match self.cookies.header_value() {
            Some(cookie) => request.header("Cookie", cookie),
            None => request,
        }
    }
}

#[async_trait]
impl RawExchange for KlapChannel {
    async fn exchange(&mut self, request: &RequestEnvelope) -> Result<RawResponse, Error> {
        let json = request.to_json()?;
        let frame = self.session.encrypt(json.as_bytes())?;

        debug!(
            endpoint = %self.endpoint,
            seq = frame.seq,
            method = %request.method,
            "Sending KLAP request"
        );

        let http_request = self
            .request(format!("/app/request?seq={}", frame.seq))
            .header("Content-Type", "application/json")
            .body(frame.payload);
        let response = self.client.post(&self.endpoint, http_request).await?;

        if response.status != 200 {
            return Ok(RawResponse {
                status: response.status,
                body: response.body,
            });
        }

        if self.verify_signatures {
            self.session.verify_signature(&response.body)?;
        }
        let plaintext = self.session.decrypt(&response.body)?;

        if self.debug {
            debug!(payload = %String::from_utf8_lossy(&plaintext), "KLAP response");
        } else {
            debug!(bytes = plaintext.len(), "KLAP response");
        }

        Ok(RawResponse {
            status: response.status,
            body: plaintext,
        })
    }
}

impl std::fmt::Debug for KlapChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlapChannel")
            .field("endpoint", &self.endpoint)
            .field("cookies", &self.cookies)
            .field("session", &self.session)
            .finish()
    }
}

/// Stage 1: posts the local seed and returns the remote seed.
async fn seed_exchange(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    local_seed: &[u8; SEED_LEN],
    cookies: &mut CookieJar,
) -> Result<[u8; SEED_LEN], Error> {
    debug!(
        endpoint = %endpoint,
        local_seed = %hex::encode(local_seed),
        "Performing KLAP handshake1"
    );

    let response = post_stage(
        client,
        endpoint,
        1,
        HttpRequest::new("/app/handshake1").body(local_seed.to_vec()),
    )
    .await?;

    if response.body.len() < SEED_LEN {
        return Err(Error::handshake(
            1,
            format!(
                "response has {} bytes, expected at least {}",
                response.body.len(),
                SEED_LEN
            ),
        ));
    }

    cookies.clear();
    cookies.capture(&response);

    let mut remote_seed = [0u8; SEED_LEN];
    remote_seed.copy_from_slice(&response.body[..SEED_LEN]);

    debug!(
        remote_seed = %hex::encode(remote_seed),
        cookies = ?cookies,
        "Handshake1 received response"
    );
    Ok(remote_seed)
}

/// Stage 2: proves knowledge of the credentials.
async fn auth_verify(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    proof: &[u8; 32],
    cookies: &CookieJar,
) -> Result<(), Error> {
    debug!(endpoint = %endpoint, "Performing KLAP handshake2");

    let mut request = HttpRequest::new("/app/handshake2").body(proof.to_vec());
    if let Some(cookie) = cookies.header_value() {
        request = request.header("Cookie", cookie);
    }
    post_stage(client, endpoint, 2, request).await?;

    debug!(endpoint = %endpoint, "Handshake2 succeeded");
    Ok(())
}

async fn post_stage(
    client: &dyn HttpClient,
    endpoint: &Endpoint,
    stage: u8,
    request: HttpRequest,
) -> Result<HttpResponse, Error> {
    let response = client
        .post(endpoint, request)
        .await
        .map_err(|e| Error::handshake(stage, e.to_string()))?;

    if response.status != 200 {
        debug!(
            stage,
            status = response.status,
            body = %String::from_utf8_lossy(&response.body),
            "KLAP handshake rejected"
        );
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

/// KLAP [`Transport`]: a [`KlapChannel`] driven by a [`RetryExecutor`].
///
/// # Example
///
/// ```no_run
/// use tapo_core::{Credentials, RequestEnvelope};
/// use tapo_core::transport::{KlapTransport, Protocol, Transport, TransportConfig};
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = TransportConfig::new("192.168.1.100", Protocol::Klap)
///         .with_credentials(Credentials::new("user@example.com", "password"));
///     let mut transport = KlapTransport::connect(&config).await?;
///
///     let info = transport
///         .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
///         .await?;
///     println!("{}", info["result"]["model"]);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct KlapTransport {
    host: String,
    channel: KlapChannel,
    executor: RetryExecutor,
}

impl KlapTransport {
    /// Connects to the configured host (port 80 unless given).
    pub async fn connect(config: &TransportConfig) -> Result<Self, Error> {
        let endpoint = Endpoint::parse(&config.host, Scheme::Http, DEFAULT_PORT)?;
        let client: Arc<dyn HttpClient> = match &config.http_client {
            Some(client) => Arc::clone(client),
            None => Arc::new(RawHttpClient::new(config.timeout)),
        };

        debug!(endpoint = %endpoint, "Attempting KLAP connection");
        let channel = KlapChannel::handshake(endpoint, client, &config.credentials, config).await?;

        Ok(Self {
            host: channel.endpoint().authority(),
            channel,
            executor: config.executor(),
        })
    }

    /// Current sequence number.
    pub fn seq(&self) -> i32 {
        self.channel.seq()
    }
}

#[async_trait]
impl Transport for KlapTransport {
    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        request: &RequestEnvelope,
    ) -> Result<Value, Error> {
        let plaintext = self
            .executor
            .execute(cancel, &mut self.channel, request)
            .await?;
        passthrough::check_payload(&plaintext)
    }

    fn protocol(&self) -> Protocol {
        Protocol::Klap
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorLayer;
    use crate::retry::RetryPolicy;
    use std::sync::Mutex;

    const REMOTE_SEED: [u8; SEED_LEN] = [0x42; SEED_LEN];

    #[derive(Default)]
    struct DeviceState {
        local_seed: Option<[u8; SEED_LEN]>,
        session: Option<KlapSession>,
        cookies_seen: Vec<Option<String>>,
        methods: Vec<String>,
        fail_requests_with: Option<u16>,
        corrupt_signature: bool,
        reply: Option<Value>,
        request_posts: u32,
    }

    /// In-memory KLAP device.
    struct FakeDevice {
        credentials: Credentials,
        state: Mutex<DeviceState>,
    }

    impl FakeDevice {
        fn new(credentials: Credentials) -> Arc<Self> {
            Arc::new(Self {
                credentials,
                state: Mutex::new(DeviceState::default()),
            })
        }

        fn respond(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> HttpResponse {
            HttpResponse {
                status,
                headers,
                body,
            }
        }
    }

    #[async_trait]
    impl HttpClient for FakeDevice {
        async fn post(&self, _: &Endpoint, request: HttpRequest) -> Result<HttpResponse, Error> {
            let mut guard = self.state.lock().unwrap();
            let state = &mut *guard;
            let cookie = request
                .headers
                .iter()
                .find(|(n, _)| n == "Cookie")
                .map(|(_, v)| v.clone());

            match request.path.as_str() {
                "/app/handshake1" => {
                    let mut local = [0u8; SEED_LEN];
                    local.copy_from_slice(&request.body);
                    state.local_seed = Some(local);
                    let mut body = REMOTE_SEED.to_vec();
                    body.extend_from_slice(&[0u8; 32]);
                    Ok(Self::respond(
                        200,
                        vec![(
                            "Set-Cookie".into(),
                            "TP_SESSIONID=ABC123;TIMEOUT=86400".into(),
                        )],
                        body,
                    ))
                }
                "/app/handshake2" => {
                    state.cookies_seen.push(cookie);
                    let local = state.local_seed.unwrap_or_default();
                    let hash = credential_hash(&self.credentials);
                    if request.body != auth_proof(&local, &REMOTE_SEED, &hash) {
                        return Ok(Self::respond(403, Vec::new(), Vec::new()));
                    }
                    state.session = Some(KlapSession::new(&local, &REMOTE_SEED, &hash));
                    Ok(Self::respond(200, Vec::new(), Vec::new()))
                }
                path if path.starts_with("/app/request?seq=") => {
                    state.request_posts += 1;
                    state.cookies_seen.push(cookie);
                    if let Some(status) = state.fail_requests_with {
                        return Ok(Self::respond(status, Vec::new(), Vec::new()));
                    }

                    let seq: i32 = path["/app/request?seq=".len()..].parse().unwrap();
                    let reply = state
                        .reply
                        .clone()
                        .unwrap_or_else(|| serde_json::json!({"error_code": 0, "result": {"ok": true}}));
                    let corrupt = state.corrupt_signature;
                    let session = state.session.as_mut().unwrap();
                    let mut frame = session.encrypt(reply.to_string().as_bytes()).unwrap();
                    assert_eq!(frame.seq, seq);

                    let request_json = session.decrypt(&request.body).unwrap();
                    let envelope: RequestEnvelope = serde_json::from_slice(&request_json).unwrap();
                    state.methods.push(envelope.method);

                    if corrupt {
                        frame.payload[0] ^= 0xff;
                    }
                    Ok(Self::respond(200, Vec::new(), frame.payload))
                }
                _ => Ok(Self::respond(404, Vec::new(), Vec::new())),
            }
        }
    }

    fn config(device: &Arc<FakeDevice>, credentials: Credentials) -> TransportConfig {
        TransportConfig::new("10.0.0.2", Protocol::Klap)
            .with_credentials(credentials)
            .with_handshake_delay(Duration::ZERO)
            .with_http_client(device.clone())
    }

    fn creds() -> Credentials {
        Credentials::new("user@example.com", "hunter2")
    }

    #[tokio::test]
    async fn test_handshake_and_execute() {
        let device = FakeDevice::new(creds());
        let mut transport = KlapTransport::connect(&config(&device, creds())).await.unwrap();
        assert_eq!(transport.host(), "10.0.0.2:80");
        assert_eq!(transport.protocol(), Protocol::Klap);

        let before = transport.seq();
        let response = transport
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
            .await
            .unwrap();
        assert_eq!(response["result"]["ok"], Value::Bool(true));
        assert_eq!(transport.seq(), before.wrapping_add(1));

        transport
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_energy_usage"))
            .await
            .unwrap();

        let state = device.state.lock().unwrap();
        assert_eq!(state.methods, ["get_device_info", "get_energy_usage"]);
        assert!(
            state
                .cookies_seen
                .iter()
                .all(|c| c.as_deref() == Some("TP_SESSIONID=ABC123"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handshake_settles_after_each_stage() {
        let device = FakeDevice::new(creds());
        let delay = Duration::from_millis(200);
        let config = config(&device, creds()).with_handshake_delay(delay);

        let start = tokio::time::Instant::now();
        KlapTransport::connect(&config).await.unwrap();
        let elapsed = start.elapsed();

        assert!(elapsed >= delay * 2, "elapsed {:?}", elapsed);
        assert!(elapsed < delay * 3, "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_wrong_credentials_fail_stage_two() {
        let device = FakeDevice::new(creds());
        let err = KlapTransport::connect(&config(&device, Credentials::new("user@example.com", "wrong")))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { stage: 2, .. }));
    }

    #[tokio::test]
    async fn test_short_seed_fails_stage_one() {
        struct ShortSeed;

        #[async_trait]
        impl HttpClient for ShortSeed {
            async fn post(&self, _: &Endpoint, _: HttpRequest) -> Result<HttpResponse, Error> {
                Ok(HttpResponse {
                    status: 200,
                    headers: Vec::new(),
                    body: vec![1, 2, 3],
                })
            }
        }

        let config = TransportConfig::new("10.0.0.2", Protocol::Klap)
            .with_handshake_delay(Duration::ZERO)
            .with_http_client(Arc::new(ShortSeed));
        let err = KlapTransport::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { stage: 1, .. }));
    }

    #[tokio::test]
    async fn test_transport_error_during_handshake_is_staged() {
        struct Unreachable;

        #[async_trait]
        impl HttpClient for Unreachable {
            async fn post(&self, _: &Endpoint, _: HttpRequest) -> Result<HttpResponse, Error> {
                Err(Error::Transport("connection refused".into()))
            }
        }

        let config = TransportConfig::new("10.0.0.2", Protocol::Klap)
            .with_http_client(Arc::new(Unreachable));
        let err = KlapTransport::connect(&config).await.unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed { stage: 1, .. }));
    }

    #[tokio::test]
    async fn test_device_error_code_surfaces() {
        let device = FakeDevice::new(creds());
        let mut transport = KlapTransport::connect(&config(&device, creds())).await.unwrap();
        device.state.lock().unwrap().reply = Some(serde_json::json!({"error_code": -1008}));

        let err = transport
            .execute(&CancellationToken::new(), &RequestEnvelope::new("set_device_info"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Application {
                layer: ErrorLayer::Device,
                code: -1008,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_non_success_status_is_retried() {
        let device = FakeDevice::new(creds());
        let config = config(&device, creds()).with_retry(RetryPolicy::new(2, Duration::ZERO));
        let mut transport = KlapTransport::connect(&config).await.unwrap();
        device.state.lock().unwrap().fail_requests_with = Some(500);

        let err = transport
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RequestFailed { status: Some(500), .. }));
        assert_eq!(device.state.lock().unwrap().request_posts, 3);
    }

    #[tokio::test]
    async fn test_signature_verification_is_opt_in() {
        let device = FakeDevice::new(creds());
        let mut lenient = KlapTransport::connect(&config(&device, creds())).await.unwrap();
        device.state.lock().unwrap().corrupt_signature = true;
        lenient
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
            .await
            .unwrap();

        let device = FakeDevice::new(creds());
        let strict_config = config(&device, creds()).with_verify_signatures(true);
        let mut strict = KlapTransport::connect(&strict_config).await.unwrap();
        strict
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
            .await
            .unwrap();

        device.state.lock().unwrap().corrupt_signature = true;
        let err = strict
            .execute(&CancellationToken::new(), &RequestEnvelope::new("get_device_info"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SignatureMismatch));
    }
}
