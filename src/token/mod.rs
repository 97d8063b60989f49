//! Opaque pagination tokens.
//!
//! A token is the store's last-evaluated key rendered as compact JSON,
//! `{"name":{"S"|"N"|"B":value}}` with binary values in unpadded base64, and
//! optionally sealed by a [`Transformer`].
//!
//! Table keys have one or two attributes. A secondary index query or scan
//! resumes from the table key plus the index key, so its tokens go through
//! [`Tokenizer::encode_index`] and [`Tokenizer::decode_index`], which accept up
//! to four.
//!
//! ```
//! use aws_sdk_dynamodb::types::AttributeValue;
//! use dynamo_mapper::attribute::Key;
//! use dynamo_mapper::token::Tokenizer;
//!
//! let key = Key::from([("id".to_string(), AttributeValue::S("hash".into()))]);
//! let tokenizer = Tokenizer::new();
//! let token = tokenizer.encode(&key).unwrap();
//! assert_eq!(token, r#"{"id":{"S":"hash"}}"#);
//! assert_eq!(tokenizer.decode(&token).unwrap(), key);
//! ```

mod transformer;

pub use transformer::{AesGcmTransformer, Transformer};

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::attribute::{AttributeKind, Key};
use crate::error::Error;

/// Tagged wire value inside a token
#[derive(Debug, Serialize, Deserialize)]
enum TokenValue {
    S(String),
    N(String),
    B(String),
}

/// Attribute limit of a table key
const TABLE_KEY_ATTRIBUTES: usize = 2;

/// Attribute limit of an index position: index hash and sort plus table hash and sort
const INDEX_KEY_ATTRIBUTES: usize = 4;

/// Token returned for any malformed, tampered or mis-sized input
pub(crate) fn invalid_token() -> Error {
    Error::Token("invalid token".into())
}

/// Encodes store keys as opaque tokens and back
#[derive(Clone, Default)]
pub struct Tokenizer {
    transformer: Option<Arc<dyn Transformer>>,
}

impl Tokenizer {
    /// Plain JSON tokens
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass every token through `transformer`
    pub fn with_transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Seal tokens with AES-GCM; `key` must be 16 or 32 bytes
    pub fn with_aes(self, key: &[u8]) -> Result<Self, Error> {
        Ok(self.with_transformer(AesGcmTransformer::new(key)?))
    }

    /// Encode a key of one or two S, N or B attributes
    pub fn encode(&self, key: &Key) -> Result<String, Error> {
        self.encode_with(key, TABLE_KEY_ATTRIBUTES)
    }

    /// Decode a token produced by [`encode`](Self::encode) with the same settings
    pub fn decode(&self, token: &str) -> Result<Key, Error> {
        self.decode_with(token, TABLE_KEY_ATTRIBUTES)
    }

    /// Encode the last evaluated key of a secondary index, up to four attributes
    pub fn encode_index(&self, key: &Key) -> Result<String, Error> {
        self.encode_with(key, INDEX_KEY_ATTRIBUTES)
    }

    /// Decode a token produced by [`encode_index`](Self::encode_index)
    pub fn decode_index(&self, token: &str) -> Result<Key, Error> {
        self.decode_with(token, INDEX_KEY_ATTRIBUTES)
    }

    fn encode_with(&self, key: &Key, max: usize) -> Result<String, Error> {
        if !(1..=max).contains(&key.len()) {
            return Err(Error::Token(format!(
                "a token key must have 1 to {max} attributes, got {}",
                key.len()
            )));
        }

        let mut entries = BTreeMap::new();
        for (name, value) in key {
            let value = match value {
                AttributeValue::S(s) => TokenValue::S(s.clone()),
                AttributeValue::N(n) => TokenValue::N(n.clone()),
                AttributeValue::B(b) => TokenValue::B(STANDARD_NO_PAD.encode(b.as_ref())),
                other => {
                    let kind = AttributeKind::of(other).map_or("unknown", AttributeKind::type_token);
                    return Err(Error::Token(format!(
                        "attribute \"{name}\" of kind {kind} cannot be part of a token"
                    )));
                }
            };
            let _ = entries.insert(name.as_str(), value);
        }

        let json = serde_json::to_string(&entries)
            .map_err(|e| Error::Token(format!("serialize token: {e}")))?;

        match &self.transformer {
            Some(transformer) => transformer.encode(&json),
            None => Ok(json),
        }
    }

    fn decode_with(&self, token: &str, max: usize) -> Result<Key, Error> {
        let json = match &self.transformer {
            Some(transformer) => transformer.decode(token)?,
            None => token.to_string(),
        };

        let entries: BTreeMap<String, TokenValue> = serde_json::from_str(&json).map_err(|e| {
            debug!(line = e.line(), column = e.column(), "rejected token: malformed json");
            invalid_token()
        })?;
        if !(1..=max).contains(&entries.len()) {
            debug!(attributes = entries.len(), "rejected token: wrong key size");
            return Err(invalid_token());
        }

        entries
            .into_iter()
            .map(|(name, value)| -> Result<(String, AttributeValue), Error> {
                let value = match value {
                    TokenValue::S(s) => AttributeValue::S(s),
                    TokenValue::N(n) => AttributeValue::N(n),
                    TokenValue::B(b) => {
                        let bytes = STANDARD_NO_PAD.decode(b).map_err(|_| {
                            debug!("rejected token: binary value is not base64");
                            invalid_token()
                        })?;
                        AttributeValue::B(Blob::new(bytes))
                    }
                };
                Ok((name, value))
            })
            .collect()
    }
}

impl fmt::Debug for Tokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tokenizer")
            .field("transformer", &self.transformer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AES_128: &[u8; 16] = b"0123456789abcdef";
    const AES_256: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    fn hash_and_range() -> Key {
        Key::from([
            ("id".to_string(), AttributeValue::S("hash".into())),
            (
                "range".to_string(),
                AttributeValue::B(Blob::new(b"hello, world!".to_vec())),
            ),
        ])
    }

    #[test]
    fn test_plain_encoding_is_deterministic() {
        let token = Tokenizer::new().encode(&hash_and_range()).unwrap();
        assert_eq!(
            token,
            r#"{"id":{"S":"hash"},"range":{"B":"aGVsbG8sIHdvcmxkIQ"}}"#
        );
    }

    #[test]
    fn test_round_trip_plain() {
        let tokenizer = Tokenizer::new();
        let numeric = Key::from([
            ("user".to_string(), AttributeValue::S("u-1".into())),
            ("seq".to_string(), AttributeValue::N("42".into())),
        ]);
        for key in [hash_and_range(), numeric] {
            let token = tokenizer.encode(&key).unwrap();
            assert_eq!(tokenizer.decode(&token).unwrap(), key);
        }
    }

    #[test]
    fn test_round_trip_encrypted() {
        for key in [&AES_128[..], &AES_256[..]] {
            let tokenizer = Tokenizer::new().with_aes(key).unwrap();
            let token = tokenizer.encode(&hash_and_range()).unwrap();
            assert!(!token.contains("hash"));
            assert_eq!(tokenizer.decode(&token).unwrap(), hash_and_range());
        }
    }

    #[test]
    fn test_encrypted_tokens_use_fresh_nonces() {
        let tokenizer = Tokenizer::new().with_aes(AES_128).unwrap();
        let first = tokenizer.encode(&hash_and_range()).unwrap();
        let second = tokenizer.encode(&hash_and_range()).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_encode_rejects_key_size() {
        let tokenizer = Tokenizer::new();
        assert!(tokenizer.encode(&Key::new()).is_err());

        let mut key = hash_and_range();
        let _ = key.insert("third".into(), AttributeValue::N("3".into()));
        let err = tokenizer.encode(&key).unwrap_err();
        assert!(matches!(err, Error::Token(_)));
    }

    #[test]
    fn test_index_tokens_carry_table_and_index_key() {
        let mut key = hash_and_range();
        let _ = key.insert("status".into(), AttributeValue::S("open".into()));
        let _ = key.insert("updated".into(), AttributeValue::N("17".into()));

        for tokenizer in [Tokenizer::new(), Tokenizer::new().with_aes(AES_128).unwrap()] {
            let token = tokenizer.encode_index(&key).unwrap();
            assert_eq!(tokenizer.decode_index(&token).unwrap(), key);
            assert!(tokenizer.decode(&token).is_err());
        }

        let _ = key.insert("fifth".into(), AttributeValue::N("5".into()));
        assert!(Tokenizer::new().encode_index(&key).is_err());
    }

    #[test]
    fn test_encode_rejects_non_key_kinds() {
        let key = Key::from([("flag".to_string(), AttributeValue::Bool(true))]);
        let err = Tokenizer::new().encode(&key).unwrap_err();
        assert_eq!(
            err.to_string(),
            "opaque token error: attribute \"flag\" of kind BOOL cannot be part of a token"
        );
    }

    #[test]
    fn test_decode_rejects_malformed_input() {
        let tokenizer = Tokenizer::new();
        for token in [
            "",
            "not json",
            "{}",
            r#"{"a":{"S":"1"},"b":{"S":"2"},"c":{"S":"3"}}"#,
            r#"{"a":{"BOOL":true}}"#,
            r#"{"a":{}}"#,
            r#"{"a":{"S":"1","N":"2"}}"#,
            r#"{"a":{"B":"***"}}"#,
        ] {
            let err = tokenizer.decode(token).unwrap_err();
            assert_eq!(err.to_string(), "opaque token error: invalid token", "{token}");
            assert_eq!(err.phase(), crate::error::Phase::Decode);
        }
    }

    #[test]
    fn test_decode_rejects_tampered_ciphertext() {
        let tokenizer = Tokenizer::new().with_aes(AES_256).unwrap();
        let token = tokenizer.encode(&hash_and_range()).unwrap();

        let mut bytes = token.into_bytes();
        let last = bytes.len() - 2;
        bytes[last] = if bytes[last] == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(tokenizer.decode(&tampered).is_err());
    }

    #[test]
    fn test_decode_rejects_short_or_foreign_tokens() {
        let tokenizer = Tokenizer::new().with_aes(AES_128).unwrap();
        assert!(tokenizer.decode("AAAA").is_err());
        assert!(tokenizer.decode(r#"{"id":{"S":"hash"}}"#).is_err());

        let other = Tokenizer::new().with_aes(AES_256).unwrap();
        let token = other.encode(&hash_and_range()).unwrap();
        assert!(tokenizer.decode(&token).is_err());
    }
}
