//! Minimal HTTP/1.1 client used by both transports.
//!
//! Tapo firmware runs a non-compliant HTTP server that rejects lower-cased
//! header names, which rules out clients that normalise headers. Requests are
//! therefore written by hand with headers emitted exactly as given, and every
//! request is sent with `Connection: close` so a response ends at EOF when it
//! carries no `Content-Length`.
//!
//! Plain HTTP uses `tokio::net::TcpStream`. HTTPS uses blocking `rustls`
//! inside `spawn_blocking`, with a TLS configuration supplied by the caller
//! (only the SSL-AES transport installs one).

use std::io::{Read, Write};
use std::net::ToSocketAddrs;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::Error;

/// Upper bound on a response we are willing to buffer.
const MAX_RESPONSE_LEN: usize = 1024 * 1024;

/// URL scheme of an [`Endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

/// A device address: scheme, host and port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    /// Parses `host`, `host:port`, `[v6]` or `[v6]:port`, applying
    /// `default_port` when absent. A bare IPv6 literal takes the default port.
    pub fn parse(address: &str, scheme: Scheme, default_port: u16) -> Result<Self, Error> {
        let address = address.trim();
        if address.is_empty() {
            return Err(Error::Transport("empty host".into()));
        }
        let invalid_port = || Error::Transport(format!("invalid port in '{}'", address));

        let (host, port) = if let Some(rest) = address.strip_prefix('[') {
            let Some((host, tail)) = rest.split_once(']') else {
                return Err(Error::Transport(format!("unterminated '[' in '{}'", address)));
            };
            let port = match tail {
                "" => default_port,
                _ => tail
                    .strip_prefix(':')
                    .and_then(|p| p.parse().ok())
                    .ok_or_else(invalid_port)?,
            };
            (host, port)
        } else {
            match address.rsplit_once(':') {
                Some((host, port)) if !host.contains(':') => {
                    (host, port.parse().map_err(|_| invalid_port())?)
                }
                _ => (address, default_port),
            }
        };
        if host.is_empty() {
            return Err(Error::Transport(format!("empty host in '{}'", address)));
        }

        Ok(Self {
            scheme,
            host: host.to_string(),
            port,
        })
    }

    /// `host:port`, as used in the `Host` header. IPv6 hosts are bracketed.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = match self.scheme {
            Scheme::Http => "http",
            Scheme::Https => "https",
        };
        write!(f, "{}://{}", scheme, self.authority())
    }
}

/// An outgoing POST request.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Serializes the request head and body for the wire.
    pub fn to_bytes(&self, endpoint: &Endpoint) -> Vec<u8> {
        let mut head = format!("POST {} HTTP/1.1\r\n", self.path);

        if !self.has_header("Host") {
            head.push_str(&format!("Host: {}\r\n", endpoint.authority()));
        }
        for (name, value) in &self.headers {
            head.push_str(&format!("{}: {}\r\n", name, value));
        }
        head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        head.push_str("Connection: close\r\n\r\n");

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    fn has_header(&self, name: &str) -> bool {
        self.headers.iter().any(|(n, _)| n.eq_ignore_ascii_case(name))
    }
}

/// A parsed response.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// First header value with the given name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All header values with the given name (case-insensitive).
    pub fn header_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.headers
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Sends HTTP POST requests to a device.
///
/// Implement this to substitute a custom client (proxying, instrumentation,
/// tests). Non-200 statuses are returned as responses, not errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn post(&self, endpoint: &Endpoint, request: HttpRequest) -> Result<HttpResponse, Error>;
}

/// The default [`HttpClient`], speaking raw HTTP/1.1.
#[derive(Clone)]
pub struct RawHttpClient {
    timeout: Duration,
    tls_config: Option<Arc<rustls::ClientConfig>>,
}

impl RawHttpClient {
    /// A plain-HTTP client. HTTPS endpoints fail until a TLS config is set.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            tls_config: None,
        }
    }

    /// Installs the TLS configuration used for HTTPS endpoints.
    pub fn with_tls(mut self, tls_config: Arc<rustls::ClientConfig>) -> Self {
        self.tls_config = Some(tls_config);
        self
    }

    async fn post_plain(&self, endpoint: &Endpoint, wire: Vec<u8>) -> Result<Vec<u8>, Error> {
        let addr = endpoint.authority();
        let mut stream = timeout(self.timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Transport(format!("connection to {} timed out", addr)))?
            .map_err(|e| Error::Transport(format!("connection to {} failed: {}", addr, e)))?;

        timeout(self.timeout, stream.write_all(&wire))
            .await
            .map_err(|_| Error::Transport("write timed out".into()))?
            .map_err(|e| Error::Transport(format!("write failed: {}", e)))?;

        let mut response = Vec::with_capacity(1024);
        let mut buf = [0u8; 4096];
        while !response_complete(&response) {
            let n = timeout(self.timeout, stream.read(&mut buf))
                .await
                .map_err(|_| Error::Transport("read timed out".into()))?
                .map_err(|e| Error::Transport(format!("read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&buf[..n]);
            check_size(&response)?;
        }

        Ok(response)
    }

    async fn post_tls(&self, endpoint: &Endpoint, wire: Vec<u8>) -> Result<Vec<u8>, Error> {
        let tls_config = self
            .tls_config
            .clone()
            .ok_or_else(|| Error::Transport("no TLS configuration for HTTPS endpoint".into()))?;
        let host = endpoint.host.clone();
        let port = endpoint.port;
        let io_timeout = self.timeout;

        tokio::task::spawn_blocking(move || {
            send_tls_blocking(&host, port, &wire, tls_config, io_timeout)
        })
        .await
        .map_err(|e| Error::Transport(format!("task join error: {}", e)))?
    }
}

#[async_trait]
impl HttpClient for RawHttpClient {
    async fn post(&self, endpoint: &Endpoint, request: HttpRequest) -> Result<HttpResponse, Error> {
        debug!(endpoint = %endpoint, path = %request.path, bytes = request.body.len(), "POST");

        let wire = request.to_bytes(endpoint);
        let raw = match endpoint.scheme {
            Scheme::Http => self.post_plain(endpoint, wire).await?,
            Scheme::Https => self.post_tls(endpoint, wire).await?,
        };

        let response = parse_response(&raw)?;
        debug!(status = response.status, bytes = response.body.len(), "response");
        Ok(response)
    }
}

impl std::fmt::Debug for RawHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHttpClient")
            .field("timeout", &self.timeout)
            .field("tls", &self.tls_config.is_some())
            .finish()
    }
}

fn send_tls_blocking(
    host: &str,
    port: u16,
    wire: &[u8],
    tls_config: Arc<rustls::ClientConfig>,
    io_timeout: Duration,
) -> Result<Vec<u8>, Error> {
    let addr = (host, port)
        .to_socket_addrs()
        .map_err(|e| Error::Transport(format!("cannot resolve {}: {}", host, e)))?
        .next()
        .ok_or_else(|| Error::Transport(format!("no address for {}", host)))?;

    let mut tcp_stream = std::net::TcpStream::connect_timeout(&addr, io_timeout)
        .map_err(|e| Error::Transport(format!("TCP connect failed: {}", e)))?;
    tcp_stream.set_read_timeout(Some(io_timeout))?;
    tcp_stream.set_write_timeout(Some(io_timeout))?;

    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| Error::Transport(format!("invalid server name '{}'", host)))?;
    let mut conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| Error::Transport(format!("TLS setup failed: {}", e)))?;
    let mut tls_stream = rustls::Stream::new(&mut conn, &mut tcp_stream);

    tls_stream
        .write_all(wire)
        .map_err(|e| Error::Transport(format!("write failed: {}", e)))?;
    tls_stream
        .flush()
        .map_err(|e| Error::Transport(format!("flush failed: {}", e)))?;

    let mut response = Vec::with_capacity(4096);
    let mut buf = [0u8; 4096];
    while !response_complete(&response) {
        match tls_stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => response.extend_from_slice(&buf[..n]),
            // Devices often close without close_notify.
            Err(e)
                if !response.is_empty()
                    && matches!(
                        e.kind(),
                        std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
                    ) =>
            {
                break;
            }
            Err(e) => return Err(Error::Transport(format!("read failed: {}", e))),
        }
        check_size(&response)?;
    }

    Ok(response)
}

fn check_size(response: &[u8]) -> Result<(), Error> {
    if response.len() > MAX_RESPONSE_LEN {
        return Err(Error::Transport(format!(
            "response exceeds {} bytes",
            MAX_RESPONSE_LEN
        )));
    }
    Ok(())
}

/// Find the position of "\r\n\r\n" (end of headers).
fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Whether a buffered response already holds its full body.
///
/// Without `Content-Length` or chunked framing the body runs to EOF.
fn response_complete(data: &[u8]) -> bool {
    let Some(header_end) = find_header_end(data) else {
        return false;
    };
    let head = String::from_utf8_lossy(&data[..header_end]);
    let body = &data[header_end + 4..];
    if is_chunked(&head) {
        return body.ends_with(b"0\r\n\r\n");
    }
    match parse_content_length(&head) {
        Some(len) => body.len() >= len,
        None => false,
    }
}

fn parse_status_code(head: &str) -> Option<u16> {
    head.lines().next()?.split_whitespace().nth(1)?.parse().ok()
}

fn head_value<'a>(head: &'a str, wanted: &str) -> Option<&'a str> {
    head.lines().skip(1).find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.trim().eq_ignore_ascii_case(wanted).then(|| value.trim())
    })
}

fn parse_content_length(head: &str) -> Option<usize> {
    head_value(head, "content-length")?.parse().ok()
}

fn is_chunked(head: &str) -> bool {
    head_value(head, "transfer-encoding")
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
}

/// Decodes a `Transfer-Encoding: chunked` body. Trailers are ignored.
fn decode_chunked(mut data: &[u8]) -> Result<Vec<u8>, Error> {
    let truncated = || Error::Transport("truncated chunked body".into());
    let mut body = Vec::new();

    loop {
        let line_end = data
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(truncated)?;
        let size_line = String::from_utf8_lossy(&data[..line_end]);
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| Error::Transport(format!("invalid chunk size '{}'", size_hex)))?;
        data = &data[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if data.len() < size + 2 {
            return Err(truncated());
        }
        if &data[size..size + 2] != b"\r\n" {
            return Err(Error::Transport("chunk missing CRLF terminator".into()));
        }
        body.extend_from_slice(&data[..size]);
        data = &data[size + 2..];
    }
}

/// Parses a buffered HTTP/1.1 response.
pub(crate) fn parse_response(data: &[u8]) -> Result<HttpResponse, Error> {
    let header_end = find_header_end(data)
        .ok_or_else(|| Error::Transport("invalid HTTP response: no header end".into()))?;
    let head = String::from_utf8_lossy(&data[..header_end]);

    let status = parse_status_code(&head)
        .ok_or_else(|| Error::Transport("invalid HTTP response: no status code".into()))?;

    let headers = head
        .lines()
        .skip(1)
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_string(), value.trim().to_string()))
        })
        .collect();

    let raw_body = &data[header_end + 4..];
    let body = if is_chunked(&head) {
        decode_chunked(raw_body)?
    } else if let Some(len) = parse_content_length(&head) {
        if raw_body.len() < len {
            return Err(Error::Transport(format!(
                "truncated body: got {} of {} bytes",
                raw_body.len(),
                len
            )));
        }
        raw_body[..len].to_vec()
    } else {
        raw_body.to_vec()
    };

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}

/// Cookies captured from a handshake response and replayed on every request.
#[derive(Clone, Default)]
pub struct CookieJar {
    cookies: Vec<(String, String)>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores every `Set-Cookie` pair of `response`, replacing same-named ones.
    pub fn capture(&mut self, response: &HttpResponse) {
        for value in response.header_values("Set-Cookie") {
            let pair = value.split(';').next().unwrap_or_default();
            let Some((name, value)) = pair.split_once('=') else {
                continue;
            };
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            let value = value.trim().to_string();
            match self.cookies.iter_mut().find(|(n, _)| n == name) {
                Some(existing) => existing.1 = value,
                None => self.cookies.push((name.to_string(), value)),
            }
        }
    }

    /// The `Cookie` header value, or `None` when the jar is empty.
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        let pairs: Vec<String> = self
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Some(pairs.join("; "))
    }

    /// Returns the value of a named cookie.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.cookies
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn clear(&mut self) {
        self.cookies.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }
}

impl std::fmt::Debug for CookieJar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.cookies.iter().map(|(n, _)| n.as_str()).collect();
        f.debug_struct("CookieJar").field("names", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_endpoint_parse() {
        let ep = Endpoint::parse("192.168.1.10", Scheme::Http, 80).unwrap();
        assert_eq!(ep.authority(), "192.168.1.10:80");

        let ep = Endpoint::parse("camera.local:8443", Scheme::Https, 443).unwrap();
        assert_eq!(ep.host, "camera.local");
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.to_string(), "https://camera.local:8443");

        assert!(Endpoint::parse("host:notaport", Scheme::Http, 80).is_err());
        assert!(Endpoint::parse("  ", Scheme::Http, 80).is_err());
    }

    #[test]
    fn test_endpoint_parse_ipv6() {
        let ep = Endpoint::parse("::1", Scheme::Http, 80).unwrap();
        assert_eq!(ep.host, "::1");
        assert_eq!(ep.port, 80);
        assert_eq!(ep.authority(), "[::1]:80");

        let ep = Endpoint::parse("[fe80::1]:8443", Scheme::Https, 443).unwrap();
        assert_eq!(ep.host, "fe80::1");
        assert_eq!(ep.port, 8443);
        assert_eq!(ep.to_string(), "https://[fe80::1]:8443");

        let ep = Endpoint::parse("[::1]", Scheme::Https, 443).unwrap();
        assert_eq!(ep.authority(), "[::1]:443");

        assert!(Endpoint::parse("[::1", Scheme::Http, 80).is_err());
        assert!(Endpoint::parse("[::1]:x", Scheme::Http, 80).is_err());
        assert!(Endpoint::parse("[::1]80", Scheme::Http, 80).is_err());
        assert!(Endpoint::parse("[]:80", Scheme::Http, 80).is_err());
    }

    #[test]
    fn test_request_serialization_keeps_header_case() {
        let ep = Endpoint::parse("10.0.0.2", Scheme::Http, 80).unwrap();
        let wire = HttpRequest::new("/app/handshake1")
            .header("Content-Type", "application/octet-stream")
            .body(vec![1u8, 2, 3])
            .to_bytes(&ep);
        let text = String::from_utf8_lossy(&wire);

        assert!(text.starts_with("POST /app/handshake1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: 10.0.0.2:80\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(text.contains("Content-Length: 3\r\n"));
        assert!(wire.ends_with(b"\r\n\r\n\x01\x02\x03"));
    }

    #[test]
    fn test_explicit_host_header_not_duplicated() {
        let ep = Endpoint::parse("10.0.0.2", Scheme::Https, 443).unwrap();
        let wire = HttpRequest::new("/").header("Host", "10.0.0.2:443").to_bytes(&ep);
        let text = String::from_utf8_lossy(&wire);
        assert_eq!(text.matches("Host:").count(), 1);
    }

    #[test]
    fn test_parse_response() {
        let raw = b"HTTP/1.1 200 OK\r\nSet-Cookie: TP_SESSIONID=abc;TIMEOUT=86400\r\nContent-Length: 4\r\n\r\nbodyEXTRA";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"body");
        assert_eq!(
            response.header("set-cookie"),
            Some("TP_SESSIONID=abc;TIMEOUT=86400")
        );
    }

    #[test]
    fn test_parse_response_without_content_length() {
        let raw = b"HTTP/1.1 403 Forbidden\r\n\r\nnope";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(response.body, b"nope");
        assert!(parse_response(b"garbage").is_err());
    }

    #[test]
    fn test_truncated_body_is_transport_error() {
        let err = parse_response(b"HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\r\nshort").unwrap_err();
        assert!(matches!(err, Error::Transport(ref msg) if msg.contains("got 5 of 64")));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_parse_chunked_response() {
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\n\r\n";
        let response = parse_response(raw).unwrap();
        assert_eq!(response.body, b"hello world");
        assert!(response_complete(raw));

        let partial = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhel";
        assert!(!response_complete(partial));
        assert!(matches!(parse_response(partial), Err(Error::Transport(_))));

        let bad_size = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nzz\r\n";
        assert!(matches!(parse_response(bad_size), Err(Error::Transport(_))));
    }

    #[test]
    fn test_response_complete() {
        assert!(!response_complete(b"HTTP/1.1 200 OK\r\n"));
        assert!(!response_complete(
            b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nabc"
        ));
        assert!(response_complete(
            b"HTTP/1.1 200 OK\r\nContent-Length: 3\r\n\r\nabc"
        ));
    }

    #[test]
    fn test_cookie_jar_capture_and_replay() {
        let response = HttpResponse {
            status: 200,
            headers: vec![
                ("Set-Cookie".into(), "TP_SESSIONID=abc;TIMEOUT=86400".into()),
                ("set-cookie".into(), "other=1; Path=/".into()),
                ("Set-Cookie".into(), "TP_SESSIONID=def".into()),
            ],
            body: Vec::new(),
        };

        let mut jar = CookieJar::new();
        assert!(jar.header_value().is_none());
        jar.capture(&response);

        assert_eq!(jar.get("TP_SESSIONID"), Some("def"));
        assert_eq!(
            jar.header_value().as_deref(),
            Some("TP_SESSIONID=def; other=1")
        );
        assert!(!format!("{:?}", jar).contains("def"));

        jar.clear();
        assert!(jar.is_empty());
    }

    #[tokio::test]
    async fn test_raw_client_plain_http() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !response_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok")
                .await
                .unwrap();
            request
        });

        let client = RawHttpClient::new(Duration::from_secs(5));
        let endpoint = Endpoint::parse(&format!("127.0.0.1:{}", port), Scheme::Http, 80).unwrap();
        let response = client
            .post(&endpoint, HttpRequest::new("/ping").body(b"hi".to_vec()))
            .await
            .unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, b"ok");

        let request = server.await.unwrap();
        let text = String::from_utf8_lossy(&request);
        assert!(text.starts_with("POST /ping HTTP/1.1\r\n"));
        assert!(text.ends_with("\r\n\r\nhi"));
    }

    #[tokio::test]
    async fn test_https_without_tls_config_fails() {
        let client = RawHttpClient::new(Duration::from_secs(1));
        let endpoint = Endpoint::parse("127.0.0.1:1", Scheme::Https, 443).unwrap();
        let err = client
            .post(&endpoint, HttpRequest::new("/"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }
}
