//! AEAD sealing of secrets persisted in cluster state.
//!
//! Every sealed value carries an `enc:` prefix. Sealing is idempotent:
//! a value that already carries the prefix is returned unchanged, so
//! repeated saves never double-encrypt a password the caller forgot was
//! already sealed.

use aes_gcm::aead::{Aead, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use common::GatewayError;
use rand::RngCore;

const PREFIX: &str = "enc:";
const NONCE_LEN: usize = 12;

/// The compiled-in key used when no operator-supplied key file is
/// configured. Documented as not production-grade: see the system's
/// design notes on secret-at-rest open questions. Rotation is undefined.
const DEFAULT_KEY: [u8; 32] = [
    0x67, 0x61, 0x74, 0x65, 0x77, 0x61, 0x79, 0x64, 0x2d, 0x61, 0x67, 0x65, 0x6e, 0x74, 0x2d, 0x73,
    0x65, 0x61, 0x6c, 0x2d, 0x76, 0x31, 0x2d, 0x6b, 0x65, 0x79, 0x2d, 0x2d, 0x2d, 0x2d, 0x2d, 0x2d,
];

pub struct Sealer {
    cipher: Aes256Gcm,
}

impl Sealer {
    pub fn with_default_key() -> Self {
        Self::with_key(&DEFAULT_KEY)
    }

    pub fn with_key(key: &[u8; 32]) -> Self {
        let key = Key::<Aes256Gcm>::from_slice(key);
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Seal `plaintext`, returning it unchanged if it is already sealed.
    pub fn seal(&self, value: &str) -> Result<String, GatewayError> {
        if value.starts_with(PREFIX) || value.is_empty() {
            return Ok(value.to_string());
        }

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, value.as_bytes())
            .map_err(|e| GatewayError::ConfigInvalid(format!("seal failed: {e}")))?;

        let mut payload = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        payload.extend_from_slice(&nonce_bytes);
        payload.extend_from_slice(&ciphertext);

        Ok(format!("{PREFIX}{}", BASE64.encode(payload)))
    }

    /// Unseal a value produced by [`Self::seal`]. A value without the
    /// `enc:` prefix is returned as-is: plaintext in transit, not an error.
    pub fn unseal(&self, value: &str) -> Result<String, GatewayError> {
        let Some(encoded) = value.strip_prefix(PREFIX) else {
            return Ok(value.to_string());
        };

        let payload = BASE64
            .decode(encoded)
            .map_err(|e| GatewayError::ConfigInvalid(format!("malformed sealed value: {e}")))?;
        if payload.len() < NONCE_LEN {
            return Err(GatewayError::ConfigInvalid("sealed value too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = payload.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = self
            .cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| GatewayError::ConfigInvalid(format!("unseal failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| GatewayError::ConfigInvalid(format!("sealed value not utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_then_unseal_round_trips() {
        let sealer = Sealer::with_default_key();
        let sealed = sealer.seal("hunter2").unwrap();
        assert!(sealed.starts_with("enc:"));
        assert_eq!(sealer.unseal(&sealed).unwrap(), "hunter2");
    }

    #[test]
    fn sealing_an_already_sealed_value_is_a_no_op() {
        let sealer = Sealer::with_default_key();
        let sealed = sealer.seal("hunter2").unwrap();
        let sealed_again = sealer.seal(&sealed).unwrap();
        assert_eq!(sealed, sealed_again);
    }

    #[test]
    fn unsealing_plaintext_returns_it_unchanged() {
        let sealer = Sealer::with_default_key();
        assert_eq!(sealer.unseal("plaintext").unwrap(), "plaintext");
    }

    #[test]
    fn empty_values_are_never_sealed() {
        let sealer = Sealer::with_default_key();
        assert_eq!(sealer.seal("").unwrap(), "");
    }
}
