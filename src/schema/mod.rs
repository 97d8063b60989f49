//! Record schemas.
//!
//! A [`Record`] declares its key, version and timestamp attributes once in
//! [`Record::schema`]. The declaration is classified into a [`Schema`] the first
//! time the type is used and cached for the life of the process; requests never
//! look at the declaration again.
//!
//! ```
//! use dynamo_mapper::schema::{Record, Schema, SchemaBuilder};
//! use dynamo_mapper::timestamp::Timestamp;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Order {
//!     id: String,
//!     version: i64,
//!     created_at: Timestamp,
//!     modified_at: Timestamp,
//! }
//!
//! impl Record for Order {
//!     const TABLE: &'static str = "orders";
//!
//!     fn schema(schema: &mut SchemaBuilder<Self>) {
//!         schema.field("id", |o| &o.id).hash_key();
//!         schema.field("version", |o| &o.version).version();
//!         schema.field("created_at", |o| &o.created_at).created_time();
//!         schema.field("modified_at", |o| &o.modified_at).modified_time();
//!     }
//! }
//!
//! let schema = Schema::<Order>::of().unwrap();
//! assert_eq!(schema.hash_key().name, "id");
//! assert_eq!(schema.version_name(), Some("version"));
//! ```

mod builder;
mod registry;
mod timestamps;
mod version;

pub use builder::{FieldBuilder, SchemaBuilder};
pub use timestamps::TimestampStrategy;
pub use version::VersionStrategy;

use aws_sdk_dynamodb::types::AttributeValue;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::Arc;

use crate::attribute::{AttributeKind, Key};
use crate::error::Error;
use crate::expression::{Condition, Update};
use crate::timestamp::TimeEncoding;
use version::TaggedVersion;

/// A typed record stored in a table
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Default table name
    const TABLE: &'static str;

    /// Declare the record's key, version and timestamp attributes
    fn schema(schema: &mut SchemaBuilder<Self>);

    /// Table this particular item belongs to
    ///
    /// Batch calls require every item to report the same table.
    fn table_name(&self) -> &str {
        Self::TABLE
    }
}

/// Name and wire kind of a key attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name
    pub name: String,
    /// Attribute kind; always S, N or B
    pub kind: AttributeKind,
}

impl KeyAttribute {
    /// Describe a key attribute
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Reads one field of `T` as a wire value.
pub(crate) trait Accessor<T>: Send + Sync {
    fn value(&self, item: &T) -> Result<AttributeValue, Error>;

    fn is_zero(&self, item: &T) -> bool;
}

/// Custom key function supplied through [`SchemaBuilder::custom_key`]
pub type KeyFn<T> = fn(&T) -> Result<Key, Error>;

enum KeySource<T> {
    Tagged {
        hash: Arc<dyn Accessor<T>>,
        sort: Option<Arc<dyn Accessor<T>>>,
    },
    Custom(KeyFn<T>),
}

enum VersionSource<T> {
    Tagged(TaggedVersion<T>),
    Custom(Arc<dyn VersionStrategy<T>>),
}

/// The classified, immutable schema of a record type
pub struct Schema<T> {
    type_name: &'static str,
    hash_key: KeyAttribute,
    sort_key: Option<KeyAttribute>,
    key: KeySource<T>,
    version: Option<VersionSource<T>>,
    timestamps: Option<Arc<dyn TimestampStrategy<T>>>,
    created_time: Option<String>,
    modified_time: Option<String>,
    /// `unix_time` attributes whose serde form is not epoch seconds
    unix_times: Vec<(String, TimeEncoding)>,
}

impl<T: Record> Schema<T> {
    /// Cached schema for `T`, classifying it on first use
    pub fn of() -> Result<Arc<Self>, Error> {
        registry::cached::<T>()
    }

    /// Classify `T` without consulting the cache
    pub fn build() -> Result<Self, Error> {
        let mut builder = SchemaBuilder::new(std::any::type_name::<T>());
        T::schema(&mut builder);
        builder.build()
    }
}

impl<T> Schema<T> {
    /// Rust type name of the record
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Hash key attribute
    pub fn hash_key(&self) -> &KeyAttribute {
        &self.hash_key
    }

    /// Sort key attribute, if the table has one
    pub fn sort_key(&self) -> Option<&KeyAttribute> {
        self.sort_key.as_ref()
    }

    /// Name of the tag-derived version attribute
    pub fn version_name(&self) -> Option<&str> {
        match &self.version {
            Some(VersionSource::Tagged(tagged)) => Some(&tagged.name),
            _ => None,
        }
    }

    /// Name of the tag-derived created-time attribute
    pub fn created_time_name(&self) -> Option<&str> {
        self.created_time.as_deref()
    }

    /// Name of the tag-derived modified-time attribute
    pub fn modified_time_name(&self) -> Option<&str> {
        self.modified_time.as_deref()
    }

    /// Whether the record supports optimistic locking
    pub fn has_version(&self) -> bool {
        self.version.is_some()
    }

    /// Whether the record supports generated timestamps
    pub fn has_timestamps(&self) -> bool {
        self.timestamps.is_some()
    }

    /// Key of `item`: the hash attribute and, if declared, the sort attribute
    pub fn key(&self, item: &T) -> Result<Key, Error> {
        let key = match &self.key {
            KeySource::Custom(get) => get(item)?,
            KeySource::Tagged { hash, sort } => {
                let mut key = Key::with_capacity(2);
                let _ = key.insert(self.hash_key.name.clone(), hash.value(item)?);
                if let (Some(attribute), Some(sort)) = (&self.sort_key, sort) {
                    let _ = key.insert(attribute.name.clone(), sort.value(item)?);
                }
                key
            }
        };
        self.check_key(&key)?;
        Ok(key)
    }

    /// A key holds exactly the declared attributes, each of its declared kind
    fn check_key(&self, key: &Key) -> Result<(), Error> {
        let expected = 1 + usize::from(self.sort_key.is_some());
        if key.len() != expected {
            return Err(Error::Request(format!(
                "key of type \"{}\" has {} attributes, expected {expected}",
                self.type_name,
                key.len()
            )));
        }
        for attribute in std::iter::once(&self.hash_key).chain(&self.sort_key) {
            let found = key.get(&attribute.name).map(AttributeKind::of);
            if found != Some(Some(attribute.kind)) {
                return Err(Error::Request(format!(
                    "key of type \"{}\" needs attribute \"{}\" of kind {}, found {}",
                    self.type_name,
                    attribute.name,
                    attribute.kind.type_token(),
                    match found.flatten() {
                        Some(kind) => kind.type_token(),
                        None => "nothing",
                    }
                )));
            }
        }
        Ok(())
    }

    /// Condition asserting the stored version matches `item`'s.
    ///
    /// `attribute_not_exists(hash)` when the version is zero, `version = current`
    /// otherwise. Only available for tag-derived versions.
    pub fn expect_version(&self, item: &T) -> Result<Condition, Error> {
        self.tagged_version()?.expect_version(item)
    }

    /// Update incrementing the stored version by one
    pub fn next_version(&self, _item: &T) -> Result<Update, Error> {
        Ok(self.tagged_version()?.next_version())
    }

    /// Rewrite `unix_time` attributes of a marshalled item as epoch seconds
    pub(crate) fn encode_times(&self, item: &mut Key) -> Result<(), Error> {
        for (name, native) in &self.unix_times {
            if let Some(value) = item.get_mut(name) {
                convert(value, *native, TimeEncoding::EpochSecond).map_err(|reason| {
                    Error::SerdeDynamo(serde::ser::Error::custom(format!("{name}: {reason}")))
                })?;
            }
        }
        Ok(())
    }

    /// Rewrite `unix_time` attributes of a stored item back into their serde form
    pub(crate) fn decode_times(&self, item: &mut Key) -> Result<(), Error> {
        for (name, native) in &self.unix_times {
            if let Some(value) = item.get_mut(name) {
                convert(value, TimeEncoding::EpochSecond, *native).map_err(|reason| {
                    Error::Unmarshal(serde::de::Error::custom(format!("{name}: {reason}")))
                })?;
            }
        }
        Ok(())
    }

    /// Wire value for `SET name = value`, converted if `name` is a `unix_time` attribute
    pub(crate) fn encode_time(
        &self,
        name: &str,
        mut value: AttributeValue,
    ) -> Result<AttributeValue, Error> {
        if let Some((_, native)) = self.unix_times.iter().find(|(n, _)| n == name) {
            convert(&mut value, *native, TimeEncoding::EpochSecond).map_err(|reason| {
                Error::SerdeDynamo(serde::ser::Error::custom(format!("{name}: {reason}")))
            })?;
        }
        Ok(value)
    }

    pub(crate) fn version_strategy(&self) -> Option<&dyn VersionStrategy<T>> {
        match self.version.as_ref()? {
            VersionSource::Tagged(tagged) => Some(tagged),
            VersionSource::Custom(custom) => Some(custom.as_ref()),
        }
    }

    pub(crate) fn timestamp_strategy(&self) -> Option<&dyn TimestampStrategy<T>> {
        self.timestamps.as_deref()
    }

    fn tagged_version(&self) -> Result<&TaggedVersion<T>, Error> {
        match &self.version {
            Some(VersionSource::Tagged(tagged)) => Ok(tagged),
            _ => Err(Error::Request(format!(
                "type \"{}\" has no tag-derived version attribute",
                self.type_name
            ))),
        }
    }
}

fn convert(
    value: &mut AttributeValue,
    from: TimeEncoding,
    to: TimeEncoding,
) -> Result<(), &'static str> {
    if matches!(value, AttributeValue::Null(_)) {
        return Ok(());
    }
    let time = from.decode(value).ok_or("not a valid time")?;
    *value = to.encode(time);
    Ok(())
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("type_name", &self.type_name)
            .field("hash_key", &self.hash_key)
            .field("sort_key", &self.sort_key)
            .field("custom_key", &matches!(self.key, KeySource::Custom(_)))
            .field("version", &self.version_name())
            .field("has_version", &self.has_version())
            .field("created_time", &self.created_time)
            .field("modified_time", &self.modified_time)
            .field("has_timestamps", &self.has_timestamps())
            .finish()
    }
}
