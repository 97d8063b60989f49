//! Timestamp wrappers with fixed wire encodings.
//!
//! Each wrapper holds a `DateTime<Utc>` and marshals to one format, so a record can
//! choose how its created/modified attributes look in the table by picking a type.
//! The zero value of every wrapper is the Unix epoch.

use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

use crate::attribute::{AttributeKind, FieldValue};
use crate::error::Error;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";
const DAY_FORMAT: &str = "%Y-%m-%d";

/// How a generated timestamp is written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeEncoding {
    /// RFC 3339 string with as many fractional digits as needed
    Rfc3339,
    /// `YYYY-MM-DDTHH:MM:SS.sssZ` string
    Timestamp,
    /// Unix epoch seconds as a number
    EpochSecond,
    /// Unix epoch milliseconds as a number
    EpochMillisecond,
    /// `YYYY-MM-DD` string
    Day,
}

impl TimeEncoding {
    /// Encode `time` as a wire value
    pub fn encode(self, time: DateTime<Utc>) -> AttributeValue {
        match self {
            TimeEncoding::Rfc3339 => {
                AttributeValue::S(time.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            TimeEncoding::Timestamp => AttributeValue::S(time.format(TIMESTAMP_FORMAT).to_string()),
            TimeEncoding::EpochSecond => AttributeValue::N(time.timestamp().to_string()),
            TimeEncoding::EpochMillisecond => {
                AttributeValue::N(time.timestamp_millis().to_string())
            }
            TimeEncoding::Day => AttributeValue::S(time.format(DAY_FORMAT).to_string()),
        }
    }

    /// Read a wire value written in this encoding, `None` if it is not one
    pub fn decode(self, value: &AttributeValue) -> Option<DateTime<Utc>> {
        match (self, value) {
            (TimeEncoding::Rfc3339 | TimeEncoding::Timestamp, AttributeValue::S(raw)) => {
                DateTime::parse_from_rfc3339(raw)
                    .ok()
                    .map(|t| t.with_timezone(&Utc))
            }
            (TimeEncoding::EpochSecond, AttributeValue::N(raw)) => {
                DateTime::from_timestamp(raw.parse().ok()?, 0)
            }
            (TimeEncoding::EpochMillisecond, AttributeValue::N(raw)) => {
                DateTime::from_timestamp_millis(raw.parse().ok()?)
            }
            (TimeEncoding::Day, AttributeValue::S(raw)) => NaiveDate::parse_from_str(raw, DAY_FORMAT)
                .ok()?
                .and_hms_opt(0, 0, 0)
                .map(|naive| naive.and_utc()),
            _ => None,
        }
    }
}

macro_rules! time_wrapper {
    ($(#[$doc:meta])* $name:ident, $kind:expr, $encoding:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub DateTime<Utc>);

        impl $name {
            /// The current time
            pub fn now() -> Self {
                Self::from(Utc::now())
            }

            /// The wrapped instant
            pub fn as_datetime(&self) -> DateTime<Utc> {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self(DateTime::<Utc>::UNIX_EPOCH)
            }
        }

        impl From<$name> for DateTime<Utc> {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FieldValue for $name {
            fn kind() -> AttributeKind {
                $kind
            }

            fn time_encoding() -> Option<TimeEncoding> {
                Some($encoding)
            }

            fn is_zero(&self) -> bool {
                self.0 == DateTime::<Utc>::UNIX_EPOCH
            }

            fn to_attribute_value(&self) -> Result<AttributeValue, Error> {
                Ok($encoding.encode(self.0))
            }
        }
    };
}

time_wrapper!(
    /// Millisecond-precision UTC timestamp stored as `YYYY-MM-DDTHH:MM:SS.sssZ`
    Timestamp,
    AttributeKind::S,
    TimeEncoding::Timestamp
);
time_wrapper!(
    /// Timestamp stored as Unix epoch seconds
    EpochSecond,
    AttributeKind::N,
    TimeEncoding::EpochSecond
);
time_wrapper!(
    /// Timestamp stored as Unix epoch milliseconds
    EpochMillisecond,
    AttributeKind::N,
    TimeEncoding::EpochMillisecond
);
time_wrapper!(
    /// Calendar day stored as `YYYY-MM-DD`
    Day,
    AttributeKind::S,
    TimeEncoding::Day
);

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl From<DateTime<Utc>> for EpochSecond {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl From<DateTime<Utc>> for EpochMillisecond {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value)
    }
}

impl From<DateTime<Utc>> for Day {
    // Truncated to the start of the UTC day.
    fn from(value: DateTime<Utc>) -> Self {
        let start = value
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|naive| naive.and_utc())
            .unwrap_or(value);
        Self(start)
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.format(TIMESTAMP_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| Self(t.with_timezone(&Utc)))
            .map_err(de::Error::custom)
    }
}

impl Serialize for EpochSecond {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0.timestamp())
    }
}

impl<'de> Deserialize<'de> for EpochSecond {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let seconds = i64::deserialize(deserializer)?;
        DateTime::from_timestamp(seconds, 0)
            .map(Self)
            .ok_or_else(|| de::Error::custom(format!("epoch second {seconds} out of range")))
    }
}

impl Serialize for EpochMillisecond {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0.timestamp_millis())
    }
}

impl<'de> Deserialize<'de> for EpochMillisecond {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let millis = i64::deserialize(deserializer)?;
        DateTime::from_timestamp_millis(millis)
            .map(Self)
            .ok_or_else(|| de::Error::custom(format!("epoch millisecond {millis} out of range")))
    }
}

impl Serialize for Day {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0.format(DAY_FORMAT))
    }
}

impl<'de> Deserialize<'de> for Day {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let date = NaiveDate::parse_from_str(&raw, DAY_FORMAT).map_err(de::Error::custom)?;
        date.and_hms_opt(0, 0, 0)
            .map(|naive| Self(naive.and_utc()))
            .ok_or_else(|| de::Error::custom("invalid day"))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(TIMESTAMP_FORMAT))
    }
}

impl fmt::Display for Day {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(DAY_FORMAT))
    }
}
