//! Versioned authenticated-encryption envelope.
//!
//! Uses XChaCha20-Poly1305 (192-bit random nonce).
//!
//! Wire format:
//!   [ magic "sbox" (4) | version u32 LE (4) | nonce (24) | ciphertext + tag ]
//!
//! The 8-byte header is bound as associated data, so the version cannot be
//! altered without failing authentication.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    XChaCha20Poly1305, XNonce,
};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::key::EncryptionKey;

const MAGIC: &[u8; 4] = b"sbox";
const HEADER_SIZE: usize = 8;
const NONCE_SIZE: usize = 24;
const TAG_SIZE: usize = 16;

fn header(version: u32) -> [u8; HEADER_SIZE] {
    let mut out = [0u8; HEADER_SIZE];
    out[..4].copy_from_slice(MAGIC);
    out[4..].copy_from_slice(&version.to_le_bytes());
    out
}

/// Seal `plaintext` under `key`, tagging the envelope with `version`.
pub fn seal(version: u32, key: &EncryptionKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadEncrypt)?;
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
    let header = header(version);

    let ciphertext = cipher
        .encrypt(&nonce, Payload { msg: plaintext, aad: &header })
        .map_err(|_| CryptoError::AeadEncrypt)?;

    let mut out = Vec::with_capacity(HEADER_SIZE + NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&header);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open an envelope produced by [`seal`], returning the plaintext and the
/// version it was sealed with.
pub fn open(key: &EncryptionKey, envelope: &[u8]) -> Result<(Zeroizing<Vec<u8>>, u32), CryptoError> {
    if envelope.len() < HEADER_SIZE + NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::EnvelopeTooShort(envelope.len()));
    }
    let (header, rest) = envelope.split_at(HEADER_SIZE);
    if &header[..4] != MAGIC {
        return Err(CryptoError::BadMagic);
    }
    let version = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let (nonce, ciphertext) = rest.split_at(NONCE_SIZE);

    let cipher = XChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|_| CryptoError::AeadDecrypt)?;
    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(nonce),
            Payload { msg: ciphertext, aad: header },
        )
        .map_err(|_| CryptoError::AeadDecrypt)?;

    Ok((Zeroizing::new(plaintext), version))
}
