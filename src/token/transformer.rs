use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use std::fmt;
use tracing::debug;

use super::invalid_token;
use crate::error::Error;

const NONCE_LEN: usize = 12;

/// A reversible transform applied to the JSON form of every token
pub trait Transformer: Send + Sync + fmt::Debug {
    /// Seal a plaintext token
    fn encode(&self, plaintext: &str) -> Result<String, Error>;

    /// Open a sealed token; must fail rather than return partial output
    fn decode(&self, token: &str) -> Result<String, Error>;
}

enum Cipher {
    Aes128(Aes128Gcm),
    Aes256(Aes256Gcm),
}

/// AES-GCM sealing: `base64url(nonce || ciphertext || tag)` with a fresh
/// 12-byte nonce per token
pub struct AesGcmTransformer {
    cipher: Cipher,
}

impl AesGcmTransformer {
    /// Build from a 16-byte (AES-128) or 32-byte (AES-256) key
    pub fn new(key: &[u8]) -> Result<Self, Error> {
        let cipher = match key.len() {
            16 => Aes128Gcm::new_from_slice(key).map(Cipher::Aes128),
            32 => Aes256Gcm::new_from_slice(key).map(Cipher::Aes256),
            n => {
                return Err(Error::Token(format!(
                    "AES key must be 16 or 32 bytes, got {n}"
                )));
            }
        }
        .map_err(|_| Error::Token("invalid AES key".into()))?;
        Ok(Self { cipher })
    }
}

impl Transformer for AesGcmTransformer {
    fn encode(&self, plaintext: &str) -> Result<String, Error> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce);
        let nonce_ref = Nonce::from_slice(&nonce);

        let sealed = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.encrypt(nonce_ref, plaintext.as_bytes()),
            Cipher::Aes256(cipher) => cipher.encrypt(nonce_ref, plaintext.as_bytes()),
        }
        .map_err(|_| Error::Token("seal token".into()))?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(URL_SAFE_NO_PAD.encode(out))
    }

    fn decode(&self, token: &str) -> Result<String, Error> {
        let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| {
            debug!("rejected token: not base64url");
            invalid_token()
        })?;
        if bytes.len() < NONCE_LEN {
            debug!(len = bytes.len(), "rejected token: shorter than a nonce");
            return Err(invalid_token());
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce);
        let opened = match &self.cipher {
            Cipher::Aes128(cipher) => cipher.decrypt(nonce, sealed),
            Cipher::Aes256(cipher) => cipher.decrypt(nonce, sealed),
        }
        .map_err(|_| {
            debug!("rejected token: authentication failed");
            invalid_token()
        })?;

        String::from_utf8(opened).map_err(|_| invalid_token())
    }
}

impl fmt::Debug for AesGcmTransformer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = match self.cipher {
            Cipher::Aes128(_) => 128,
            Cipher::Aes256(_) => 256,
        };
        f.debug_struct("AesGcmTransformer")
            .field("bits", &bits)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_lengths() {
        assert!(AesGcmTransformer::new(&[7; 16]).is_ok());
        assert!(AesGcmTransformer::new(&[7; 32]).is_ok());
        for len in [0, 8, 24, 33] {
            let err = AesGcmTransformer::new(&vec![7; len]).unwrap_err();
            assert!(matches!(err, Error::Token(_)), "{len}");
        }
    }

    #[test]
    fn test_layout() {
        let transformer = AesGcmTransformer::new(&[1; 32]).unwrap();
        let sealed = transformer.encode("{}").unwrap();
        let bytes = URL_SAFE_NO_PAD.decode(&sealed).unwrap();
        // nonce, two bytes of ciphertext, 16-byte tag
        assert_eq!(bytes.len(), NONCE_LEN + 2 + 16);
        assert_eq!(transformer.decode(&sealed).unwrap(), "{}");
    }

    #[test]
    fn test_debug_hides_key() {
        let transformer = AesGcmTransformer::new(&[9; 16]).unwrap();
        assert_eq!(format!("{transformer:?}"), "AesGcmTransformer { bits: 128, .. }");
    }
}
