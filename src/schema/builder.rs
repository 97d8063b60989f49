use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::timestamps::{TaggedTimestamps, TimeField, UnixSeconds};
use super::version::TaggedVersion;
use super::{
    Accessor, KeyAttribute, KeyFn, KeySource, Schema, TimestampStrategy, VersionSource,
    VersionStrategy,
};
use crate::attribute::{AttributeKind, FieldValue};
use crate::error::Error;
use crate::timestamp::TimeEncoding;

struct Field<T, F> {
    get: fn(&T) -> &F,
}

impl<T, F: FieldValue> Accessor<T> for Field<T, F> {
    fn value(&self, item: &T) -> Result<AttributeValue, Error> {
        (self.get)(item).to_attribute_value()
    }

    fn is_zero(&self, item: &T) -> bool {
        (self.get)(item).is_zero()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Roles {
    hash_key: bool,
    sort_key: bool,
    version: bool,
    created_time: bool,
    modified_time: bool,
    unix_time: bool,
}

struct FieldSpec<T> {
    name: String,
    kind: AttributeKind,
    time_encoding: Option<TimeEncoding>,
    accessor: Arc<dyn Accessor<T>>,
    roles: Roles,
}

struct CustomKey<T> {
    hash: KeyAttribute,
    sort: Option<KeyAttribute>,
    get: KeyFn<T>,
}

/// Collects a record type's field declarations and capability overrides.
///
/// Handed to [`Record::schema`](super::Record::schema); the collected declaration
/// is classified once into a [`Schema`].
pub struct SchemaBuilder<T> {
    type_name: &'static str,
    fields: Vec<FieldSpec<T>>,
    custom_key: Option<CustomKey<T>>,
    custom_version: Option<Arc<dyn VersionStrategy<T>>>,
    custom_timestamps: Option<Arc<dyn TimestampStrategy<T>>>,
    must_have_version: bool,
    must_have_timestamps: bool,
}

/// Assigns roles to a declared field
pub struct FieldBuilder<'a, T> {
    roles: &'a mut Roles,
    _record: PhantomData<fn(&T)>,
}

impl<T> FieldBuilder<'_, T> {
    /// Partition key; must be S, N or B
    pub fn hash_key(self) -> Self {
        self.roles.hash_key = true;
        self
    }

    /// Sort key; must be S, N or B
    pub fn sort_key(self) -> Self {
        self.roles.sort_key = true;
        self
    }

    /// Optimistic locking counter; must be N
    pub fn version(self) -> Self {
        self.roles.version = true;
        self
    }

    /// Written on Put when the field still holds its zero value
    pub fn created_time(self) -> Self {
        self.roles.created_time = true;
        self
    }

    /// Written on every Put and Update
    pub fn modified_time(self) -> Self {
        self.roles.modified_time = true;
        self
    }

    /// Store this time field as Unix epoch seconds instead of the type's own format.
    ///
    /// Applies to the whole attribute: marshalled items, keys and generated values
    /// are all written as a number and read back into the field's own format.
    pub fn unix_time(self) -> Self {
        self.roles.unix_time = true;
        self
    }
}

impl<T: 'static> SchemaBuilder<T> {
    pub(crate) fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            fields: Vec::new(),
            custom_key: None,
            custom_version: None,
            custom_timestamps: None,
            must_have_version: false,
            must_have_timestamps: false,
        }
    }

    /// Declare a field stored under `name` and read through `get`
    pub fn field<F>(&mut self, name: impl Into<String>, get: fn(&T) -> &F) -> FieldBuilder<'_, T>
    where
        F: FieldValue + 'static,
    {
        self.fields.push(FieldSpec {
            name: name.into(),
            kind: F::kind(),
            time_encoding: F::time_encoding(),
            accessor: Arc::new(Field { get }),
            roles: Roles::default(),
        });
        let index = self.fields.len() - 1;
        FieldBuilder {
            roles: &mut self.fields[index].roles,
            _record: PhantomData,
        }
    }

    /// Build keys with `get` instead of from tagged fields
    pub fn custom_key(
        &mut self,
        hash: KeyAttribute,
        sort: Option<KeyAttribute>,
        get: KeyFn<T>,
    ) -> &mut Self {
        self.custom_key = Some(CustomKey { hash, sort, get });
        self
    }

    /// Replace tag-derived optimistic locking
    pub fn custom_version(&mut self, strategy: impl VersionStrategy<T> + 'static) -> &mut Self {
        self.custom_version = Some(Arc::new(strategy));
        self
    }

    /// Replace tag-derived timestamp generation
    pub fn custom_timestamps(&mut self, strategy: impl TimestampStrategy<T> + 'static) -> &mut Self {
        self.custom_timestamps = Some(Arc::new(strategy));
        self
    }

    /// Fail classification when no version is declared
    pub fn must_have_version(&mut self) -> &mut Self {
        self.must_have_version = true;
        self
    }

    /// Fail classification when no timestamp is declared
    pub fn must_have_timestamps(&mut self) -> &mut Self {
        self.must_have_timestamps = true;
        self
    }

    pub(crate) fn build(mut self) -> Result<Schema<T>, Error> {
        let type_name = self.type_name;
        let fail = |reason: String| Error::schema(type_name, reason);

        let mut seen = HashSet::new();
        for field in &self.fields {
            if field.name.is_empty() {
                return Err(fail("field declared with an empty attribute name".into()));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(fail(format!("attribute \"{}\" is declared twice", field.name)));
            }
        }

        let mut unix_times = Vec::new();
        for field in &mut self.fields {
            if !field.roles.unix_time {
                continue;
            }
            let native = field.time_encoding.ok_or_else(|| {
                fail(format!(
                    "unsupported unix time field \"{}\": not a time type",
                    field.name
                ))
            })?;
            if native != TimeEncoding::EpochSecond {
                field.accessor = Arc::new(UnixSeconds {
                    name: field.name.clone(),
                    native,
                    inner: field.accessor.clone(),
                });
                field.kind = AttributeKind::N;
                field.time_encoding = Some(TimeEncoding::EpochSecond);
                unix_times.push((field.name.clone(), native));
            }
        }

        let with_role = |role: fn(&Roles) -> bool| -> Vec<&FieldSpec<T>> {
            self.fields.iter().filter(|f| role(&f.roles)).collect()
        };

        let (hash_key, sort_key, key) = match &self.custom_key {
            Some(custom) => {
                for attribute in std::iter::once(&custom.hash).chain(custom.sort.as_ref()) {
                    if !attribute.kind.is_key_capable() {
                        return Err(fail(format!(
                            "unsupported key attribute \"{}\" of kind {}",
                            attribute.name,
                            attribute.kind.type_token()
                        )));
                    }
                }
                (
                    custom.hash.clone(),
                    custom.sort.clone(),
                    KeySource::Custom(custom.get),
                )
            }
            None => {
                let hashes = with_role(|r| r.hash_key);
                let sorts = with_role(|r| r.sort_key);
                let hash = match hashes.as_slice() {
                    [] => return Err(fail("no hash key field found".into())),
                    [hash] => *hash,
                    many => {
                        return Err(fail(format!(
                            "found multiple hash key fields ({})",
                            many.len()
                        )));
                    }
                };
                let sort = match sorts.as_slice() {
                    [] => None,
                    [sort] => Some(*sort),
                    many => {
                        return Err(fail(format!(
                            "found multiple sort key fields ({})",
                            many.len()
                        )));
                    }
                };
                for (role, field) in std::iter::once(("hash key", hash))
                    .chain(sort.map(|s| ("sort key", s)))
                {
                    if !field.kind.is_key_capable() {
                        return Err(fail(format!(
                            "unsupported {role} field \"{}\" of kind {}",
                            field.name,
                            field.kind.type_token()
                        )));
                    }
                }
                (
                    KeyAttribute::new(hash.name.clone(), hash.kind),
                    sort.map(|s| KeyAttribute::new(s.name.clone(), s.kind)),
                    KeySource::Tagged {
                        hash: hash.accessor.clone(),
                        sort: sort.map(|s| s.accessor.clone()),
                    },
                )
            }
        };

        let version = match &self.custom_version {
            Some(custom) => Some(VersionSource::Custom(custom.clone())),
            None => match with_role(|r| r.version).as_slice() {
                [] if self.must_have_version => {
                    return Err(fail("no version field found".into()));
                }
                [] => None,
                [field] => {
                    if field.kind != AttributeKind::N {
                        return Err(fail(format!(
                            "unsupported version field \"{}\" of kind {}: must be a number",
                            field.name,
                            field.kind.type_token()
                        )));
                    }
                    Some(VersionSource::Tagged(TaggedVersion {
                        hash_name: hash_key.name.clone(),
                        name: field.name.clone(),
                        accessor: field.accessor.clone(),
                    }))
                }
                many => {
                    return Err(fail(format!("found multiple version fields ({})", many.len())));
                }
            },
        };

        let (timestamps, created_time, modified_time) = match &self.custom_timestamps {
            Some(custom) => (Some(custom.clone()), None, None),
            None => {
                let created = time_field(&with_role(|r| r.created_time), "created time")
                    .map_err(&fail)?;
                let modified = time_field(&with_role(|r| r.modified_time), "modified time")
                    .map_err(&fail)?;
                let created_time = created.as_ref().map(|f| f.name.clone());
                let modified_time = modified.as_ref().map(|f| f.name.clone());
                let strategy: Option<Arc<dyn TimestampStrategy<T>>> =
                    match (created, modified) {
                        (None, None) if self.must_have_timestamps => {
                            return Err(fail("no timestamp fields found".into()));
                        }
                        (None, None) => None,
                        (created, modified) => {
                            Some(Arc::new(TaggedTimestamps { created, modified }))
                        }
                    };
                (strategy, created_time, modified_time)
            }
        };

        let schema = Schema {
            type_name,
            hash_key,
            sort_key,
            key,
            version,
            timestamps,
            created_time,
            modified_time,
            unix_times,
        };
        debug!(schema = ?schema, "classified record schema");
        Ok(schema)
    }
}

fn time_field<T>(fields: &[&FieldSpec<T>], role: &str) -> Result<Option<TimeField<T>>, String> {
    let field = match fields {
        [] => return Ok(None),
        [field] => *field,
        many => return Err(format!("found multiple {role} fields ({})", many.len())),
    };
    let encoding = field.time_encoding.ok_or_else(|| {
        format!("unsupported {role} field \"{}\": not a time type", field.name)
    })?;
    Ok(Some(TimeField {
        name: field.name.clone(),
        encoding,
        accessor: field.accessor.clone(),
    }))
}

impl<T> fmt::Debug for SchemaBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaBuilder")
            .field("type_name", &self.type_name)
            .field(
                "fields",
                &self.fields.iter().map(|f| (&f.name, f.roles)).collect::<Vec<_>>(),
            )
            .field("custom_key", &self.custom_key.is_some())
            .field("custom_version", &self.custom_version.is_some())
            .field("custom_timestamps", &self.custom_timestamps.is_some())
            .field("must_have_version", &self.must_have_version)
            .field("must_have_timestamps", &self.must_have_timestamps)
            .finish()
    }
}

impl<T> fmt::Debug for FieldBuilder<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldBuilder")
            .field("roles", &self.roles)
            .finish()
    }
}
