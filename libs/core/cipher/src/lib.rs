//! [libs/core/cipher/src/lib.rs]
//! Transport encryption for the Device wire protocol.
//!
//! Every request and response body exchanged with the Device is a single
//! base64 blob: `nonce (12 bytes) || ciphertext || auth tag (16 bytes)`,
//! encrypted under AES-256-GCM with a key derived from the operator's
//! 7-character security key via PBKDF2-HMAC-SHA256.
//!
//! The PBKDF2 salt and iteration count below are a protocol constant, not a
//! tunable: the Device firmware derives its own key the same way, and a
//! mismatch here is silent total decryption failure, not a config error to
//! surface. They are pinned per spec §4.1 / §9 and must not be exposed for
//! configuration.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use thiserror::Error;

/// PBKDF2-HMAC-SHA256 iteration count, fixed to match Device firmware.
const PBKDF2_ITERATIONS: u32 = 210_000;
/// PBKDF2 salt, fixed to match Device firmware. Not derived from any
/// request data — the security key is the only secret material.
const PBKDF2_SALT: &[u8] = b"filament-bridge-device-v1";
const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("auth tag mismatch or wrong security key")]
    Auth,
    #[error("malformed envelope: {0}")]
    Format(String),
}

/// An encrypted request/response body in its wire representation: a single
/// base64-encoded blob of `nonce || ciphertext || tag`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope(String);

impl Envelope {
    pub fn as_wire_str(&self) -> &str {
        &self.0
    }

    pub fn into_wire_string(self) -> String {
        self.0
    }
}

impl TryFrom<&str> for Envelope {
    type Error = CipherError;

    fn try_from(wire: &str) -> Result<Self, Self::Error> {
        let decoded = BASE64
            .decode(wire)
            .map_err(|e| CipherError::Format(format!("invalid base64: {e}")))?;
        if decoded.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Format(format!(
                "envelope too short: {} bytes, need at least {}",
                decoded.len(),
                NONCE_LEN + TAG_LEN
            )));
        }
        Ok(Envelope(wire.to_string()))
    }
}

fn derive_key(password: &str) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), PBKDF2_SALT, PBKDF2_ITERATIONS, &mut key);
    key
}

/// Encrypts `plaintext` under a key derived from `password`, returning the
/// wire-ready envelope. Draws its nonce from the OS RNG; reuse of a nonce
/// under the same key is a protocol break (spec §4.1) and must never
/// happen, which is why the nonce is never accepted as a parameter.
pub fn encrypt(plaintext: &[u8], password: &str) -> Envelope {
    let key_bytes = derive_key(password);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    // Aes256Gcm::encrypt over a correctly sized key/nonce never fails.
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .expect("AES-GCM encryption with fixed-size key/nonce cannot fail");

    let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);

    Envelope(BASE64.encode(blob))
}

/// Decrypts an envelope under a key derived from `password`.
pub fn decrypt(envelope: &Envelope, password: &str) -> Result<Vec<u8>, CipherError> {
    let decoded = BASE64
        .decode(&envelope.0)
        .map_err(|e| CipherError::Format(format!("invalid base64: {e}")))?;
    if decoded.len() < NONCE_LEN + TAG_LEN {
        return Err(CipherError::Format(format!(
            "envelope too short: {} bytes, need at least {}",
            decoded.len(),
            NONCE_LEN + TAG_LEN
        )));
    }

    let (nonce_bytes, ciphertext_and_tag) = decoded.split_at(NONCE_LEN);
    let key_bytes = derive_key(password);
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext_and_tag)
        .map_err(|_| CipherError::Auth)
}

/// Convenience: decrypts a raw wire string directly, folding envelope
/// parsing and decryption into one call for callers that never need to
/// hold an `Envelope` value.
pub fn decrypt_wire(wire: &str, password: &str) -> Result<Vec<u8>, CipherError> {
    let envelope = Envelope::try_from(wire)?;
    decrypt(&envelope, password)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let plaintext = b"tag_id,material,brand\nA1,PLA,Bambu\n";
        let envelope = encrypt(plaintext, "Sw0rdFsh");
        let decrypted = decrypt(&envelope, "Sw0rdFsh").expect("decrypt should succeed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn wrong_key_is_auth_error() {
        let envelope = encrypt(b"hello", "correct1");
        let err = decrypt(&envelope, "wrong001").unwrap_err();
        assert!(matches!(err, CipherError::Auth));
    }

    #[test]
    fn tampered_envelope_is_auth_error() {
        let envelope = encrypt(b"hello world", "correct1");
        let mut raw = BASE64.decode(envelope.as_wire_str()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        let tampered = Envelope(BASE64.encode(raw));
        let err = decrypt(&tampered, "correct1").unwrap_err();
        assert!(matches!(err, CipherError::Auth));
    }

    #[test]
    fn underlength_envelope_is_format_error() {
        let short = Envelope(BASE64.encode(vec![0u8; 10]));
        let err = decrypt(&short, "anykey00").unwrap_err();
        assert!(matches!(err, CipherError::Format(_)));
    }

    #[test]
    fn malformed_base64_is_format_error() {
        let err = Envelope::try_from("not base64!!!").unwrap_err();
        assert!(matches!(err, CipherError::Format(_)));
    }

    #[test]
    fn nonces_are_distinct_across_many_encryptions() {
        let mut seen = std::collections::HashSet::new();
        for _ in 0..1000 {
            let envelope = encrypt(b"same plaintext every time", "fixedKey");
            let decoded = BASE64.decode(envelope.as_wire_str()).unwrap();
            let nonce = decoded[..NONCE_LEN].to_vec();
            assert!(seen.insert(nonce), "nonce reused across encryptions");
        }
    }

    proptest! {
        #[test]
        fn round_trip_arbitrary_plaintext(plaintext in proptest::collection::vec(any::<u8>(), 0..512), password in "[-A-Za-z0-9]{7}") {
            let envelope = encrypt(&plaintext, &password);
            let decrypted = decrypt(&envelope, &password).expect("decrypt should succeed");
            prop_assert_eq!(decrypted, plaintext);
        }
    }
}
