//! Typed CRUD requests over a [`Record`] type.
//!
//! Every operation is a request value: configure it, then either [`build`] it into
//! the SDK input (pure, nothing is sent) or [`send`] it. Put, Update and Delete
//! inject optimistic-locking conditions and generated timestamps from the
//! record's [`Schema`] unless disabled per request.
//!
//! ```rust,no_run
//! use dynamo_mapper::mapper::Mapper;
//! use dynamo_mapper::schema::{Record, SchemaBuilder};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct User {
//!     user_id: String,
//!     name: String,
//!     version: i64,
//! }
//!
//! impl Record for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn schema(schema: &mut SchemaBuilder<Self>) {
//!         schema.field("user_id", |u| &u.user_id).hash_key();
//!         schema.field("version", |u| &u.version).version();
//!     }
//! }
//!
//! # async fn example() -> Result<(), dynamo_mapper::Error> {
//! let users = Mapper::<User>::from_global().await?;
//!
//! let user = User { user_id: "123".into(), name: "Ada".into(), version: 0 };
//! users.put(&user).send().await?;
//!
//! let stored = users.get(&user).send().await?.expect("just written");
//! users.update(&stored).set("name", "Ada L.").send().await?;
//! # Ok(())
//! # }
//! ```
//!
//! [`build`]: PutRequest::build
//! [`send`]: PutRequest::send

mod delete;
mod get;
mod put;
mod query;
mod update;

pub use delete::DeleteRequest;
pub use get::GetRequest;
pub use put::PutRequest;
pub use query::{Page, QueryRequest, ScanRequest};
pub use update::UpdateRequest;

use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_dynamo::{from_item, to_item};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{Condition, literal};
use crate::schema::{Record, Schema};
use crate::token::Tokenizer;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Last-chance mutator over a fully composed SDK input
type Finalizer<'a, I> = Box<dyn FnOnce(&mut I) + Send + 'a>;

/// Typed access to the table of `T`
pub struct Mapper<T: Record> {
    client: Client,
    schema: Arc<Schema<T>>,
    table_name: Option<String>,
    clock: Clock,
    tokenizer: Tokenizer,
}

impl<T: Record> Mapper<T> {
    /// Mapper over `client`; classifies `T` on first use
    pub fn new(client: Client) -> Result<Self, Error> {
        Ok(Self {
            client,
            schema: Schema::<T>::of()?,
            table_name: None,
            clock: Arc::new(Utc::now),
            tokenizer: Tokenizer::new(),
        })
    }

    /// Mapper over the global client, see [`dynamodb_client`](crate::dynamodb_client)
    pub async fn from_global() -> Result<Self, Error> {
        Self::new(crate::dynamodb_client().await.clone())
    }

    /// Send every request to `table_name` instead of the record's own table
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Clock used for generated timestamps
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Codec for query and scan continuation tokens
    pub fn with_tokenizer(mut self, tokenizer: Tokenizer) -> Self {
        self.tokenizer = tokenizer;
        self
    }

    /// The record's classified schema
    pub fn schema(&self) -> &Schema<T> {
        &self.schema
    }

    /// The underlying client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The continuation token codec
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Table used for requests that are not tied to one item (query, scan)
    pub fn table_name(&self) -> &str {
        self.table_name.as_deref().unwrap_or(T::TABLE)
    }

    /// Table `item` is written to
    pub(crate) fn table_for<'a>(&'a self, item: &'a T) -> &'a str {
        self.table_name.as_deref().unwrap_or_else(|| item.table_name())
    }

    pub(crate) fn has_table_override(&self) -> bool {
        self.table_name.is_some()
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Marshal `item` into store attributes
    pub fn marshal(&self, item: &T) -> Result<Key, Error> {
        let mut attributes = to_item(item)?;
        self.schema.encode_times(&mut attributes)?;
        Ok(attributes)
    }

    /// Unmarshal store attributes into a record
    pub fn unmarshal(&self, mut attributes: Key) -> Result<T, Error> {
        self.schema.decode_times(&mut attributes)?;
        from_item(attributes).map_err(Error::Unmarshal)
    }

    /// GetItem by the key of `item`
    pub fn get<'a>(&'a self, item: &'a T) -> GetRequest<'a, T> {
        GetRequest::new(self, item)
    }

    /// PutItem of `item`, replacing any stored item with the same key
    pub fn put<'a>(&'a self, item: &'a T) -> PutRequest<'a, T> {
        PutRequest::new(self, item)
    }

    /// UpdateItem on the key of `item`; at least one action is required
    pub fn update<'a>(&'a self, item: &'a T) -> UpdateRequest<'a, T> {
        UpdateRequest::new(self, item)
    }

    /// DeleteItem by the key of `item`
    pub fn delete<'a>(&'a self, item: &'a T) -> DeleteRequest<'a, T> {
        DeleteRequest::new(self, item)
    }

    /// Whether an item with the key of `item` is stored
    pub async fn exists(&self, item: &T) -> Result<bool, Error> {
        let hash = literal(&self.schema.hash_key().name);
        let found = self
            .get(item)
            .projection(hash)
            .consistent_read(true)
            .send_raw()
            .await?;
        Ok(found.is_some())
    }

    /// Query the partition whose hash key equals `hash`
    pub fn query(&self, hash: impl Serialize) -> QueryRequest<'_, T> {
        let condition = serde_dynamo::to_attribute_value(hash)
            .map(|value| {
                Condition::equal(
                    crate::expression::name(literal(&self.schema.hash_key().name)),
                    crate::expression::value(value),
                )
            })
            .map_err(Error::from);
        QueryRequest::new(self, condition)
    }

    /// Query with an explicit key condition, e.g. against a secondary index
    pub fn query_by(&self, key_condition: Condition) -> QueryRequest<'_, T> {
        QueryRequest::new(self, Ok(key_condition))
    }

    /// Scan the whole table or index
    pub fn scan(&self) -> ScanRequest<'_, T> {
        ScanRequest::new(self)
    }
}

/// Log a dispatch and, for contention, the conditional-check failure
pub(crate) fn observe<O>(
    operation: &'static str,
    table: Option<&str>,
    result: Result<O, Error>,
) -> Result<O, Error> {
    match &result {
        Ok(_) => debug!(operation, table, "request succeeded"),
        Err(e) if e.is_conditional_check_failed() => {
            debug!(operation, table, "conditional check failed")
        }
        Err(e) => debug!(operation, table, error = %e, "request failed"),
    }
    result
}

impl<T: Record> Clone for Mapper<T> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            schema: self.schema.clone(),
            table_name: self.table_name.clone(),
            clock: self.clock.clone(),
            tokenizer: self.tokenizer.clone(),
        }
    }
}

impl<T: Record> fmt::Debug for Mapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mapper")
            .field("schema", &self.schema)
            .field("table_name", &self.table_name())
            .field("tokenizer", &self.tokenizer)
            .finish_non_exhaustive()
    }
}
