use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::Accessor;
use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{Update, literal};
use crate::timestamp::TimeEncoding;

/// Generated created/modified timestamps for a record type
pub trait TimestampStrategy<T>: Send + Sync {
    /// Fill timestamp attributes of a full-item Put
    fn put_timestamps(&self, item: &T, now: DateTime<Utc>, attributes: &mut Key)
    -> Result<(), Error>;

    /// Extend an Update with timestamp actions
    fn update_timestamps(&self, item: &T, now: DateTime<Utc>, update: Update)
    -> Result<Update, Error>;
}

pub(crate) struct TimeField<T> {
    pub(crate) name: String,
    pub(crate) encoding: TimeEncoding,
    pub(crate) accessor: Arc<dyn Accessor<T>>,
}

/// Reads a time field in its own encoding and yields Unix epoch seconds
pub(crate) struct UnixSeconds<T> {
    pub(crate) name: String,
    pub(crate) native: TimeEncoding,
    pub(crate) inner: Arc<dyn Accessor<T>>,
}

impl<T> Accessor<T> for UnixSeconds<T> {
    fn value(&self, item: &T) -> Result<AttributeValue, Error> {
        match self.inner.value(item)? {
            AttributeValue::Null(null) => Ok(AttributeValue::Null(null)),
            value => self
                .native
                .decode(&value)
                .map(|time| TimeEncoding::EpochSecond.encode(time))
                .ok_or_else(|| {
                    Error::Request(format!("attribute \"{}\" is not a valid time", self.name))
                }),
        }
    }

    fn is_zero(&self, item: &T) -> bool {
        self.inner.is_zero(item)
    }
}

pub(crate) struct TaggedTimestamps<T> {
    pub(crate) created: Option<TimeField<T>>,
    pub(crate) modified: Option<TimeField<T>>,
}

impl<T> TimestampStrategy<T> for TaggedTimestamps<T> {
    fn put_timestamps(
        &self,
        item: &T,
        now: DateTime<Utc>,
        attributes: &mut Key,
    ) -> Result<(), Error> {
        if let Some(created) = &self.created {
            // an item that already carries a creation time keeps it
            if created.accessor.is_zero(item) {
                let _ = attributes.insert(created.name.clone(), created.encoding.encode(now));
            }
        }
        if let Some(modified) = &self.modified {
            let _ = attributes.insert(modified.name.clone(), modified.encoding.encode(now));
        }
        Ok(())
    }

    fn update_timestamps(
        &self,
        _item: &T,
        now: DateTime<Utc>,
        update: Update,
    ) -> Result<Update, Error> {
        Ok(match &self.modified {
            Some(modified) => update.set(literal(&modified.name), modified.encoding.encode(now)),
            None => update,
        })
    }
}
