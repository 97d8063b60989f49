//! Store attribute kinds and the [`FieldValue`] trait that record fields implement
//! so the schema can classify them.

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ScalarAttributeType};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::error::Error;
use crate::timestamp::TimeEncoding;

/// A key as sent to the store: attribute name to wire value
pub type Key = HashMap<String, AttributeValue>;

/// The primitive wire types of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    /// String
    S,
    /// Number
    N,
    /// Binary
    B,
    /// Boolean
    Bool,
    /// Null
    Null,
    /// List
    L,
    /// Map
    M,
    /// String set
    Ss,
    /// Number set
    Ns,
    /// Binary set
    Bs,
}

impl AttributeKind {
    /// Whether the kind may be used for a hash or sort key
    pub fn is_key_capable(self) -> bool {
        matches!(self, AttributeKind::S | AttributeKind::N | AttributeKind::B)
    }

    /// Kind of a wire value, `None` for variants the SDK does not know about
    pub fn of(value: &AttributeValue) -> Option<Self> {
        let kind = match value {
            AttributeValue::S(_) => AttributeKind::S,
            AttributeValue::N(_) => AttributeKind::N,
            AttributeValue::B(_) => AttributeKind::B,
            AttributeValue::Bool(_) => AttributeKind::Bool,
            AttributeValue::Null(_) => AttributeKind::Null,
            AttributeValue::L(_) => AttributeKind::L,
            AttributeValue::M(_) => AttributeKind::M,
            AttributeValue::Ss(_) => AttributeKind::Ss,
            AttributeValue::Ns(_) => AttributeKind::Ns,
            AttributeValue::Bs(_) => AttributeKind::Bs,
            _ => return None,
        };
        Some(kind)
    }

    /// The type token used by `attribute_type(...)` conditions
    pub fn type_token(self) -> &'static str {
        match self {
            AttributeKind::S => "S",
            AttributeKind::N => "N",
            AttributeKind::B => "B",
            AttributeKind::Bool => "BOOL",
            AttributeKind::Null => "NULL",
            AttributeKind::L => "L",
            AttributeKind::M => "M",
            AttributeKind::Ss => "SS",
            AttributeKind::Ns => "NS",
            AttributeKind::Bs => "BS",
        }
    }

    pub(crate) fn scalar_type(self) -> Option<ScalarAttributeType> {
        match self {
            AttributeKind::S => Some(ScalarAttributeType::S),
            AttributeKind::N => Some(ScalarAttributeType::N),
            AttributeKind::B => Some(ScalarAttributeType::B),
            _ => None,
        }
    }
}

/// A record field type the schema builder can classify.
///
/// `kind` must agree with how `serde_dynamo` marshals the same type, since the
/// item itself is written through serde while keys, versions and timestamps are
/// produced from this trait.
pub trait FieldValue: Send + Sync {
    /// Wire kind of the field
    fn kind() -> AttributeKind;

    /// Default encoding if the field holds a point in time
    fn time_encoding() -> Option<TimeEncoding> {
        None
    }

    /// Whether the field holds its zero value (unassigned version, unset timestamp, ...)
    fn is_zero(&self) -> bool;

    /// Wire value of the field
    fn to_attribute_value(&self) -> Result<AttributeValue, Error>;
}

impl FieldValue for String {
    fn kind() -> AttributeKind {
        AttributeKind::S
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::S(self.clone()))
    }
}

impl FieldValue for bool {
    fn kind() -> AttributeKind {
        AttributeKind::Bool
    }

    fn is_zero(&self) -> bool {
        !*self
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::Bool(*self))
    }
}

macro_rules! impl_numeric_field {
    ($zero:expr => $($ty:ty),+) => {
        $(
            impl FieldValue for $ty {
                fn kind() -> AttributeKind {
                    AttributeKind::N
                }

                fn is_zero(&self) -> bool {
                    *self == $zero
                }

                fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
                    Ok(AttributeValue::N(self.to_string()))
                }
            }
        )+
    };
}

impl_numeric_field!(0 => i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);
impl_numeric_field!(0.0 => f32, f64);

/// Bytes stored as a binary (B) attribute.
///
/// A plain `Vec<u8>` marshals through serde as a list of numbers, so binary keys
/// must use this wrapper.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Binary(pub Vec<u8>);

impl Binary {
    /// The wrapped bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Binary {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Binary {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl Serialize for Binary {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Binary {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BinaryVisitor;

        impl<'de> Visitor<'de> for BinaryVisitor {
            type Value = Binary;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte array")
            }

            fn visit_bytes<E: de::Error>(self, bytes: &[u8]) -> Result<Binary, E> {
                Ok(Binary(bytes.to_vec()))
            }

            fn visit_byte_buf<E: de::Error>(self, bytes: Vec<u8>) -> Result<Binary, E> {
                Ok(Binary(bytes))
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Binary, A::Error> {
                let mut bytes = Vec::with_capacity(seq.size_hint().unwrap_or(0));
                while let Some(byte) = seq.next_element()? {
                    bytes.push(byte);
                }
                Ok(Binary(bytes))
            }
        }

        deserializer.deserialize_byte_buf(BinaryVisitor)
    }
}

impl FieldValue for Binary {
    fn kind() -> AttributeKind {
        AttributeKind::B
    }

    fn is_zero(&self) -> bool {
        self.0.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::B(Blob::new(self.0.clone())))
    }
}

impl FieldValue for Vec<u8> {
    fn kind() -> AttributeKind {
        AttributeKind::L
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::L(
            self.iter()
                .map(|byte| AttributeValue::N(byte.to_string()))
                .collect(),
        ))
    }
}

impl FieldValue for Vec<String> {
    fn kind() -> AttributeKind {
        AttributeKind::L
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::L(
            self.iter().cloned().map(AttributeValue::S).collect(),
        ))
    }
}

impl FieldValue for HashMap<String, String> {
    fn kind() -> AttributeKind {
        AttributeKind::M
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::M(
            self.iter()
                .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
                .collect(),
        ))
    }
}

impl FieldValue for BTreeMap<String, String> {
    fn kind() -> AttributeKind {
        AttributeKind::M
    }

    fn is_zero(&self) -> bool {
        self.is_empty()
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::M(
            self.iter()
                .map(|(k, v)| (k.clone(), AttributeValue::S(v.clone())))
                .collect(),
        ))
    }
}

impl FieldValue for DateTime<Utc> {
    fn kind() -> AttributeKind {
        AttributeKind::S
    }

    fn time_encoding() -> Option<TimeEncoding> {
        Some(TimeEncoding::Rfc3339)
    }

    fn is_zero(&self) -> bool {
        *self == DateTime::<Utc>::UNIX_EPOCH
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        Ok(AttributeValue::S(
            self.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        ))
    }
}

impl<F: FieldValue> FieldValue for Option<F> {
    fn kind() -> AttributeKind {
        F::kind()
    }

    fn time_encoding() -> Option<TimeEncoding> {
        F::time_encoding()
    }

    fn is_zero(&self) -> bool {
        self.as_ref().is_none_or(FieldValue::is_zero)
    }

    fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
        match self {
            Some(value) => value.to_attribute_value(),
            None => Ok(AttributeValue::Null(true)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_capable_kinds() {
        assert!(AttributeKind::S.is_key_capable());
        assert!(AttributeKind::N.is_key_capable());
        assert!(AttributeKind::B.is_key_capable());
        assert!(!AttributeKind::Bool.is_key_capable());
        assert!(!AttributeKind::M.is_key_capable());
        assert!(!AttributeKind::Ss.is_key_capable());
    }

    #[test]
    fn test_kind_of_wire_value() {
        assert_eq!(
            AttributeKind::of(&AttributeValue::N("1".into())),
            Some(AttributeKind::N)
        );
        assert_eq!(
            AttributeKind::of(&AttributeValue::Bool(true)),
            Some(AttributeKind::Bool)
        );
    }

    #[test]
    fn test_numeric_field_values() {
        assert_eq!(<u32 as FieldValue>::kind(), AttributeKind::N);
        assert!(0i64.is_zero());
        assert!(!7u8.is_zero());
        assert_eq!(
            42i64.to_attribute_value().unwrap(),
            AttributeValue::N("42".into())
        );
        assert_eq!(
            1.5f64.to_attribute_value().unwrap(),
            AttributeValue::N("1.5".into())
        );
    }

    #[test]
    fn test_option_field_values() {
        let unset: Option<String> = None;
        assert!(unset.is_zero());
        assert_eq!(
            unset.to_attribute_value().unwrap(),
            AttributeValue::Null(true)
        );
        assert!(Some(String::new()).is_zero());
        assert!(!Some("x".to_string()).is_zero());
        assert_eq!(
            <Option<DateTime<Utc>> as FieldValue>::time_encoding(),
            Some(TimeEncoding::Rfc3339)
        );
    }

    #[test]
    fn test_binary_marshals_as_blob() {
        let bytes = Binary::from(b"ab".as_slice());
        let wire = serde_dynamo::to_attribute_value::<_, AttributeValue>(&bytes).unwrap();
        assert_eq!(wire, AttributeValue::B(Blob::new(b"ab".to_vec())));
        assert_eq!(wire, bytes.to_attribute_value().unwrap());
        let back: Binary = serde_dynamo::from_attribute_value(wire).unwrap();
        assert_eq!(back, bytes);
    }

    #[test]
    fn test_byte_vec_matches_serde_list() {
        let bytes = b"ab".to_vec();
        assert_eq!(<Vec<u8> as FieldValue>::kind(), AttributeKind::L);
        let wire = serde_dynamo::to_attribute_value::<_, AttributeValue>(&bytes).unwrap();
        assert_eq!(wire, bytes.to_attribute_value().unwrap());
    }

    #[test]
    fn test_datetime_field_value() {
        let t = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        assert!(!t.is_zero());
        assert!(DateTime::<Utc>::UNIX_EPOCH.is_zero());
        assert_eq!(
            t.to_attribute_value().unwrap(),
            AttributeValue::S("2023-11-14T22:13:20Z".into())
        );
    }
}
