//! AES-CBC block cipher codec with PKCS7 padding.
//!
//! Shared by both transports. The codec pads and unpads explicitly instead of
//! delegating to the cipher crate so that padding failures surface as
//! [`Error::InvalidPadding`] rather than being folded into a generic
//! decryption error.

use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit, block_padding::NoPadding};
use aes::{Aes128, Aes192, Aes256};
use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::Error;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Appends PKCS7 padding, always adding between 1 and [`BLOCK_SIZE`] bytes.
pub fn pkcs7_pad(data: &[u8]) -> Vec<u8> {
    let pad_len = BLOCK_SIZE - data.len() % BLOCK_SIZE;
    let mut padded = Vec::with_capacity(data.len() + pad_len);
    padded.extend_from_slice(data);
    padded.resize(data.len() + pad_len, pad_len as u8);
    padded
}

/// Strips and validates PKCS7 padding.
///
/// The pad length must lie in `1..=BLOCK_SIZE` and every pad byte must equal
/// it.
pub fn pkcs7_unpad(data: &[u8]) -> Result<&[u8], Error> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(Error::InvalidPadding);
    }

    let pad_len = data[data.len() - 1] as usize;
    if pad_len == 0 || pad_len > BLOCK_SIZE {
        return Err(Error::InvalidPadding);
    }

    let (body, padding) = data.split_at(data.len() - pad_len);
    if padding.iter().any(|&b| b as usize != pad_len) {
        return Err(Error::InvalidPadding);
    }

    Ok(body)
}

/// Encrypts `plaintext` with AES-CBC after PKCS7 padding.
///
/// The key selects AES-128/192/256 by length; the IV must be one block.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, Error> {
    check_iv(iv)?;
    let mut buf = pkcs7_pad(plaintext);

    match key.len() {
        16 => encrypt_blocks::<cbc::Encryptor<Aes128>>(key, iv, &mut buf)?,
        24 => encrypt_blocks::<cbc::Encryptor<Aes192>>(key, iv, &mut buf)?,
        32 => encrypt_blocks::<cbc::Encryptor<Aes256>>(key, iv, &mut buf)?,
        len => return Err(invalid_key_len(len)),
    }

    Ok(buf)
}

/// Decrypts AES-CBC `ciphertext` and removes its PKCS7 padding.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
    check_iv(iv)?;
    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(invalid_key_len(key.len()));
    }
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(Error::MalformedCiphertext(format!(
            "length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    let mut buf = ciphertext.to_vec();
    match key.len() {
        16 => decrypt_blocks::<cbc::Decryptor<Aes128>>(key, iv, &mut buf)?,
        24 => decrypt_blocks::<cbc::Decryptor<Aes192>>(key, iv, &mut buf)?,
        _ => decrypt_blocks::<cbc::Decryptor<Aes256>>(key, iv, &mut buf)?,
    }

    let len = pkcs7_unpad(&buf)?.len();
    buf.truncate(len);
    Ok(buf)
}

/// Encrypts and base64-encodes (standard alphabet, padded).
pub fn encrypt_base64(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<String, Error> {
    encrypt(key, iv, plaintext).map(|ciphertext| STANDARD.encode(ciphertext))
}

/// Base64-decodes and decrypts.
pub fn decrypt_base64(key: &[u8], iv: &[u8], encoded: &str) -> Result<Vec<u8>, Error> {
    let ciphertext = STANDARD
        .decode(encoded)
        .map_err(|e| Error::MalformedCiphertext(format!("base64 decode failed: {}", e)))?;
    decrypt(key, iv, &ciphertext)
}

fn check_iv(iv: &[u8]) -> Result<(), Error> {
    if iv.len() != BLOCK_SIZE {
        return Err(Error::InvalidKeyMaterial(format!(
            "IV must be {} bytes, got {}",
            BLOCK_SIZE,
            iv.len()
        )));
    }
    Ok(())
}

fn invalid_key_len(len: usize) -> Error {
    Error::InvalidKeyMaterial(format!("key must be 16, 24 or 32 bytes, got {}", len))
}

fn encrypt_blocks<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: KeyIvInit + BlockEncryptMut,
{
    let len = buf.len();
    C::new_from_slices(key, iv)
        .map_err(|_| Error::InvalidKeyMaterial("cipher rejected key or IV".into()))?
        .encrypt_padded_mut::<NoPadding>(buf, len)
        .map_err(|_| Error::MalformedCiphertext("plaintext is not block aligned".into()))?;
    Ok(())
}

fn decrypt_blocks<C>(key: &[u8], iv: &[u8], buf: &mut [u8]) -> Result<(), Error>
where
    C: KeyIvInit + BlockDecryptMut,
{
    C::new_from_slices(key, iv)
        .map_err(|_| Error::InvalidKeyMaterial("cipher rejected key or IV".into()))?
        .decrypt_padded_mut::<NoPadding>(buf)
        .map_err(|_| Error::MalformedCiphertext("ciphertext is not block aligned".into()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x11; 16];
    const IV: [u8; 16] = [0x22; 16];

    #[test]
    fn test_pad_unpad_all_lengths() {
        for len in 0..1000 {
            let data: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let padded = pkcs7_pad(&data);
            assert_eq!(padded.len() % BLOCK_SIZE, 0);
            assert!(padded.len() > data.len());
            assert_eq!(pkcs7_unpad(&padded).unwrap(), data.as_slice());
        }
    }

    #[test]
    fn test_unpad_rejects_oversized_pad_length() {
        let mut block = [0u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 1] = 17;
        assert!(matches!(pkcs7_unpad(&block), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_unpad_rejects_zero_pad_length() {
        let block = [0u8; BLOCK_SIZE];
        assert!(matches!(pkcs7_unpad(&block), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_unpad_rejects_inconsistent_pad_bytes() {
        let mut block = [4u8; BLOCK_SIZE];
        block[BLOCK_SIZE - 3] = 9;
        assert!(matches!(pkcs7_unpad(&block), Err(Error::InvalidPadding)));
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_key_sizes() {
        let plaintext = br#"{"method":"get_device_info"}"#;
        for key_len in [16, 24, 32] {
            let key = vec![0x5a; key_len];
            let ciphertext = encrypt(&key, &IV, plaintext).unwrap();
            assert_eq!(ciphertext.len() % BLOCK_SIZE, 0);
            assert_eq!(decrypt(&key, &IV, &ciphertext).unwrap(), plaintext);
        }
    }

    #[test]
    fn test_empty_plaintext_is_one_padding_block() {
        let key: Vec<u8> = (0u8..16).collect();
        let ciphertext = encrypt(&key, &[0u8; 16], b"").unwrap();
        assert_eq!(ciphertext.len(), BLOCK_SIZE);
        assert_eq!(decrypt(&key, &[0u8; 16], &ciphertext).unwrap(), b"");
    }

    #[test]
    fn test_invalid_key_material() {
        assert!(matches!(
            encrypt(&[0u8; 15], &IV, b"x"),
            Err(Error::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            encrypt(&KEY, &[0u8; 12], b"x"),
            Err(Error::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            decrypt(&[0u8; 20], &IV, &[0u8; 16]),
            Err(Error::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_unaligned_ciphertext_is_malformed() {
        assert!(matches!(
            decrypt(&KEY, &IV, &[0u8; 17]),
            Err(Error::MalformedCiphertext(_))
        ));
        assert!(matches!(
            decrypt(&KEY, &IV, &[]),
            Err(Error::MalformedCiphertext(_))
        ));
    }

    #[test]
    fn test_tampered_iv_fails_padding() {
        // 10 bytes of plaintext leave 6 bytes of 0x06 padding in the only
        // block. Flipping the IV's last byte by 0x06 turns the final
        // plaintext byte into 0x00, which is never a valid pad length.
        let ciphertext = encrypt(&KEY, &IV, b"hello tapo").unwrap();
        assert_eq!(ciphertext.len(), BLOCK_SIZE);

        let mut iv = IV;
        iv[BLOCK_SIZE - 1] ^= 0x06;
        assert!(matches!(
            decrypt(&KEY, &iv, &ciphertext),
            Err(Error::InvalidPadding)
        ));
    }

    #[test]
    fn test_base64_roundtrip() {
        let encoded = encrypt_base64(&KEY, &IV, b"payload").unwrap();
        assert_eq!(decrypt_base64(&KEY, &IV, &encoded).unwrap(), b"payload");
        assert!(matches!(
            decrypt_base64(&KEY, &IV, "not base64!"),
            Err(Error::MalformedCiphertext(_))
        ));
    }
}
