//! KLAP session cryptography.
//!
//! After the two-stage seed exchange, both sides derive the same session
//! material from `local_seed`, `remote_seed` and the credential hash:
//!
//! - `key  = sha256("lsk" | local | remote | hash)[..16]`
//! - `iv   = sha256("iv"  | local | remote | hash)`, split into a 12-byte base
//!   and a big-endian `i32` starting sequence from the last 4 bytes
//! - `sig  = sha256("ldk" | local | remote | hash)[..28]`
//!
//! Every frame is encrypted with AES-128-CBC under `iv_base | be32(seq)` and
//! prefixed with `sha256(sig | be32(seq) | ciphertext)`.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::{Credentials, crypto::aes_cbc, error::Error};

/// Length of a KLAP seed in bytes.
pub const SEED_LEN: usize = 16;

/// Length of the signature prefix on every frame.
pub const SIGNATURE_LEN: usize = 32;

/// `sha256(sha1(username) | sha1(password))`.
pub fn credential_hash(credentials: &Credentials) -> [u8; 32] {
    let user = Sha1::digest(credentials.username.as_bytes());
    let pass = Sha1::digest(credentials.expose_password().as_bytes());

    let mut hasher = Sha256::new();
    hasher.update(user);
    hasher.update(pass);
    hasher.finalize().into()
}

/// Handshake2 payload: `sha256(remote_seed | local_seed | credential_hash)`.
pub fn auth_proof(
    local_seed: &[u8; SEED_LEN],
    remote_seed: &[u8; SEED_LEN],
    credential_hash: &[u8],
) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(remote_seed);
    hasher.update(local_seed);
    hasher.update(credential_hash);
    hasher.finalize().into()
}

fn derive(label: &[u8], local_seed: &[u8], remote_seed: &[u8], credential_hash: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(label);
    hasher.update(local_seed);
    hasher.update(remote_seed);
    hasher.update(credential_hash);
    hasher.finalize().into()
}

/// Derives the 16-byte AES session key.
pub fn derive_key(local_seed: &[u8], remote_seed: &[u8], credential_hash: &[u8]) -> [u8; 16] {
    let hash = derive(b"lsk", local_seed, remote_seed, credential_hash);
    let mut key = [0u8; 16];
    key.copy_from_slice(&hash[..16]);
    key
}

/// Derives the 12-byte IV base and the initial sequence number.
pub fn derive_iv(local_seed: &[u8], remote_seed: &[u8], credential_hash: &[u8]) -> ([u8; 12], i32) {
    let hash = derive(b"iv", local_seed, remote_seed, credential_hash);
    let mut iv_base = [0u8; 12];
    iv_base.copy_from_slice(&hash[..12]);
    let seq = i32::from_be_bytes([hash[12], hash[13], hash[14], hash[15]]);
    (iv_base, seq)
}

/// Derives the 28-byte signature base.
pub fn derive_signature_base(
    local_seed: &[u8],
    remote_seed: &[u8],
    credential_hash: &[u8],
) -> [u8; 28] {
    let hash = derive(b"ldk", local_seed, remote_seed, credential_hash);
    let mut sig = [0u8; 28];
    sig.copy_from_slice(&hash[..28]);
    sig
}

/// An encrypted request frame and the sequence number it is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KlapFrame {
    /// Sequence number carried in the `seq` query parameter.
    pub seq: i32,
    /// `signature | ciphertext`.
    pub payload: Vec<u8>,
}

/// KLAP session state.
///
/// The sequence counter is the only mutable state; it advances by one on
/// every [`encrypt`](Self::encrypt) and is never reset without a new
/// handshake. A session must be driven by a single caller.
pub struct KlapSession {
    key: [u8; 16],
    iv_base: [u8; 12],
    sig_base: [u8; 28],
    seq: i32,
}

impl KlapSession {
    /// Derives a session from both seeds and the credential hash.
    pub fn new(
        local_seed: &[u8; SEED_LEN],
        remote_seed: &[u8; SEED_LEN],
        credential_hash: &[u8],
    ) -> Self {
        let key = derive_key(local_seed, remote_seed, credential_hash);
        let (iv_base, seq) = derive_iv(local_seed, remote_seed, credential_hash);
        let sig_base = derive_signature_base(local_seed, remote_seed, credential_hash);

        Self {
            key,
            iv_base,
            sig_base,
            seq,
        }
    }

    /// Returns the current sequence number.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    /// Advances the sequence and encrypts `plaintext` into a signed frame.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<KlapFrame, Error> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        let ciphertext = aes_cbc::encrypt(&self.key, &self.iv_for(seq), plaintext)?;
        let signature = self.sign(seq, &ciphertext);

        let mut payload = Vec::with_capacity(SIGNATURE_LEN + ciphertext.len());
        payload.extend_from_slice(&signature);
        payload.extend_from_slice(&ciphertext);

        Ok(KlapFrame { seq, payload })
    }

    /// Decrypts a response frame using the current sequence number.
    ///
    /// The device answers with the sequence the caller just sent, so this
    /// must be called after the matching [`encrypt`](Self::encrypt). The
    /// signature prefix is skipped; see [`verify_signature`](Self::verify_signature).
    pub fn decrypt(&self, frame: &[u8]) -> Result<Vec<u8>, Error> {
        let ciphertext = split_frame(frame)?.1;
        aes_cbc::decrypt(&self.key, &self.iv_for(self.seq), ciphertext)
    }

    /// Checks a frame's signature against the current sequence number.
    pub fn verify_signature(&self, frame: &[u8]) -> Result<(), Error> {
        let (signature, ciphertext) = split_frame(frame)?;
        let expected = self.sign(self.seq, ciphertext);
        if expected.as_slice() != signature {
            return Err(Error::SignatureMismatch);
        }
        Ok(())
    }

    fn iv_for(&self, seq: i32) -> [u8; 16] {
        let mut iv = [0u8; 16];
        iv[..12].copy_from_slice(&self.iv_base);
        iv[12..].copy_from_slice(&seq.to_be_bytes());
        iv
    }

    fn sign(&self, seq: i32, ciphertext: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.sig_base);
        hasher.update(seq.to_be_bytes());
        hasher.update(ciphertext);
        hasher.finalize().into()
    }
}

fn split_frame(frame: &[u8]) -> Result<(&[u8], &[u8]), Error> {
    if frame.len() < SIGNATURE_LEN {
        return Err(Error::FrameTooShort { len: frame.len() });
    }
    Ok(frame.split_at(SIGNATURE_LEN))
}

impl std::fmt::Debug for KlapSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KlapSession")
            .field("seq", &self.seq)
            .field("key", &"[REDACTED]")
            .finish()
    }
}
