//! Cryptographic primitives for Tapo device communication.
//!
//! - [`aes_cbc`]: AES-CBC with PKCS7 padding, shared by both protocols
//! - [`klap`]: KLAP seed-derived session with sequence-bound IVs and signatures
//! - [`ssl_aes`]: SSL-AES passthrough nonce-derived key, IV and request tags

pub mod aes_cbc;
pub mod klap;
pub mod ssl_aes;

pub use klap::{KlapFrame, KlapSession, auth_proof, credential_hash};
pub use ssl_aes::SslAesSession;
