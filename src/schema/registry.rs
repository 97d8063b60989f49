use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock};
use tracing::debug;

use super::{Record, Schema};
use crate::error::Error;

type Entry = Arc<dyn Any + Send + Sync>;

static SCHEMAS: LazyLock<RwLock<HashMap<TypeId, Entry>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Classified schema of `T`, built at most once per process.
///
/// Concurrent first uses may both classify; the first insert wins and every
/// caller gets the same `Arc`. Failed classifications are not cached.
pub(super) fn cached<T: Record>() -> Result<Arc<Schema<T>>, Error> {
    let id = TypeId::of::<T>();
    {
        let schemas = SCHEMAS.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = schemas.get(&id) {
            return downcast(entry.clone());
        }
    }

    let schema: Entry = Arc::new(Schema::<T>::build()?);
    debug!(type_name = std::any::type_name::<T>(), "caching record schema");

    let mut schemas = SCHEMAS.write().unwrap_or_else(PoisonError::into_inner);
    let entry = schemas.entry(id).or_insert(schema).clone();
    downcast(entry)
}

fn downcast<T: Record>(entry: Entry) -> Result<Arc<Schema<T>>, Error> {
    entry.downcast::<Schema<T>>().map_err(|_| {
        Error::schema(
            std::any::type_name::<T>(),
            "cached schema has an unexpected type",
        )
    })
}
