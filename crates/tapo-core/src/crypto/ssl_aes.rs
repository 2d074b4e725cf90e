//! SSL-AES passthrough session cryptography.
//!
//! All intermediate digests are upper-case hex strings and are concatenated as
//! text, so the derivations below operate on `&str` rather than raw bytes.

use sha2::{Digest, Sha256};

use crate::{crypto::aes_cbc, error::Error};

/// Number of random bytes in a client nonce (hex-encoded to 16 characters).
pub const LOCAL_NONCE_LEN: usize = 8;

/// Upper-case hex SHA-256 of `data`.
pub fn sha256_upper(data: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(data))
}

/// `SHA256(password)` as upper-case hex.
pub fn password_hash(password: &str) -> String {
    sha256_upper(password.as_bytes())
}

/// `SHA256(pwd_hash | local | server) | local | server`, sent in login stage 2.
pub fn digest_password(pwd_hash: &str, local_nonce: &str, server_nonce: &str) -> String {
    let digest = sha256_upper(format!("{}{}{}", pwd_hash, local_nonce, server_nonce).as_bytes());
    format!("{}{}{}", digest, local_nonce, server_nonce)
}

/// `SHA256(tag | local | server | SHA256(local | pwd_hash | server))[..16]`.
pub fn derive_token(tag: &str, local_nonce: &str, server_nonce: &str, pwd_hash: &str) -> [u8; 16] {
    let hashed_key = sha256_upper(format!("{}{}{}", local_nonce, pwd_hash, server_nonce).as_bytes());
    let full = Sha256::digest(format!("{}{}{}{}", tag, local_nonce, server_nonce, hashed_key));
    let mut token = [0u8; 16];
    token.copy_from_slice(&full[..16]);
    token
}

/// Derived SSL-AES session material.
///
/// Holds no sequence number; the channel owns it so that it can advance only
/// after a fully successful round-trip.
#[derive(Clone)]
pub struct SslAesSession {
    pwd_hash: String,
    local_nonce: String,
    server_nonce: String,
    key: [u8; 16],
    iv: [u8; 16],
}

impl SslAesSession {
    /// Derives the session from the password and both nonces.
    pub fn new(password: &str, local_nonce: &str, server_nonce: &str) -> Self {
        Self::from_password_hash(password_hash(password), local_nonce, server_nonce)
    }

    /// Derives the session from an already computed password hash.
    pub fn from_password_hash(
        pwd_hash: String,
        local_nonce: &str,
        server_nonce: &str,
    ) -> Self {
        let key = derive_token("lsk", local_nonce, server_nonce, &pwd_hash);
        let iv = derive_token("ivb", local_nonce, server_nonce, &pwd_hash);

        Self {
            pwd_hash,
            local_nonce: local_nonce.to_string(),
            server_nonce: server_nonce.to_string(),
            key,
            iv,
        }
    }

    /// The `digest_passwd` value for login stage 2.
    pub fn digest_password(&self) -> String {
        digest_password(&self.pwd_hash, &self.local_nonce, &self.server_nonce)
    }

    /// Per-request tag: `SHA256(SHA256(pwd_hash | local) | body | seq)`.
    pub fn tag(&self, body: &str, seq: i64) -> String {
        let pwd_nonce_hash = sha256_upper(format!("{}{}", self.pwd_hash, self.local_nonce).as_bytes());
        sha256_upper(format!("{}{}{}", pwd_nonce_hash, body, seq).as_bytes())
    }

    /// Encrypts a request payload to base64.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, Error> {
        aes_cbc::encrypt_base64(&self.key, &self.iv, plaintext)
    }

    /// Decrypts a base64 response payload.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>, Error> {
        aes_cbc::decrypt_base64(&self.key, &self.iv, encoded)
    }
}

impl std::fmt::Debug for SslAesSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SslAesSession")
            .field("local_nonce", &self.local_nonce)
            .field("server_nonce", &self.server_nonce)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
