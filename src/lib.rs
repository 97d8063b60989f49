//! # DynamoDB Object Mapper
//!
//! A typed object mapper over DynamoDB. A record type declares its keys, version
//! and timestamp attributes once; the mapper derives the physical schema from that
//! declaration and composes the condition and update expressions for every
//! request:
//! - Get, Put, Update and Delete with optimistic locking on a version attribute
//! - Created and modified timestamps generated on write
//! - Query and Scan pages with opaque, optionally encrypted, continuation tokens
//! - Batch load, save and delete with a caller-controlled retry policy
//! - Placeholder-allocating expression builder usable on its own
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dynamo_mapper::{Error, Mapper, Record, SchemaBuilder};
//! use dynamo_mapper::timestamp::Timestamp;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct User {
//!     user_id: String,
//!     email: String,
//!     version: u64,
//!     created_at: Timestamp,
//!     updated_at: Timestamp,
//! }
//!
//! impl Record for User {
//!     const TABLE: &'static str = "users";
//!
//!     fn schema(schema: &mut SchemaBuilder<Self>) {
//!         schema.field("user_id", |u| &u.user_id).hash_key();
//!         schema.field("version", |u| &u.version).version();
//!         schema.field("created_at", |u| &u.created_at).created_time();
//!         schema.field("updated_at", |u| &u.updated_at).modified_time();
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let config = aws_config::defaults(aws_config::BehaviorVersion::latest()).load().await;
//!     dynamo_mapper::init(&config).await;
//!
//!     let users = Mapper::<User>::from_global().await?;
//!
//!     // Version 0 means "new": the put only succeeds if no item has this key
//!     let user = User {
//!         user_id: "123".to_string(),
//!         email: "user@example.com".to_string(),
//!         ..Default::default()
//!     };
//!     users.put(&user).send().await?;
//!
//!     // The stored copy carries version 1; updating it requires version 1 in the table
//!     if let Some(stored) = users.get(&user).send().await? {
//!         match users.update(&stored).set("email", "new@example.com").send().await {
//!             Ok(_) => {}
//!             Err(e) if e.is_conditional_check_failed() => println!("lost the race"),
//!             Err(e) => return Err(e),
//!         }
//!     }
//!
//!     let page = users.query("123").limit(10).send().await?;
//!     println!("{} items, more: {}", page.items.len(), page.has_more());
//!
//!     Ok(())
//! }
//! ```
#![warn(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    unused_allocation,
    unused_comparisons,
    unused_parens,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unreachable_pub,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results,
    deprecated,
    unknown_lints,
    unreachable_code,
    unused_mut
)]

pub mod attribute;
pub mod batch;
mod error;
pub mod expression;
pub mod mapper;
pub mod schema;
pub mod setup;
pub mod timestamp;
pub mod token;

pub use error::{Error, Phase};

// Re-export main types for convenience
pub use mapper::{Mapper, Page};
pub use schema::{Record, Schema, SchemaBuilder};
pub use token::Tokenizer;

// Re-export aws-config types for configuration
pub use aws_config::{
    BehaviorVersion, Region, SdkConfig, defaults,
    meta::region::{ProvideRegion, RegionProviderChain},
    retry::{RetryConfig, RetryMode},
    timeout::TimeoutConfig,
};

// Re-export aws-types for advanced configuration
pub use aws_types::sdk_config::Builder as SdkConfigBuilder;

use aws_sdk_dynamodb::Client as DynamoDbClient;
use tokio::sync::OnceCell;

/// Global DynamoDB client instance
static GLOBAL_CLIENT: OnceCell<DynamoDbClient> = OnceCell::const_new();

/// Config used when the global client is first requested without [`init`].
///
/// Adaptive retries (3 attempts, 1 second initial backoff), a 3 second connect,
/// 20 second read and 60 second operation timeout. `AWS_PROFILE=localstack`
/// points the client at a LocalStack endpoint on port 4566.
async fn aws_config_defaults() -> SdkConfig {
    use aws_config::BehaviorVersion;
    use aws_types::sdk_config::{RetryConfig, TimeoutConfig};
    use std::time::Duration;

    let timeout_config = TimeoutConfig::builder()
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(20))
        .operation_timeout(Duration::from_secs(60))
        .build();

    let mut loader = defaults(BehaviorVersion::latest())
        .retry_config(
            RetryConfig::adaptive()
                .with_max_attempts(3)
                .with_initial_backoff(Duration::from_secs(1)),
        )
        .timeout_config(timeout_config);

    if std::env::var("AWS_PROFILE").unwrap_or_default() == "localstack" {
        loader = loader.endpoint_url("http://127.0.0.1:4566");
    }

    loader.load().await
}

/// Build the global client from `config`.
///
/// Must run before the first [`dynamodb_client`] or [`Mapper::from_global`] call;
/// later calls are ignored.
///
/// ```rust,no_run
/// # async fn example() {
/// let config = dynamo_mapper::defaults(dynamo_mapper::BehaviorVersion::latest())
///     .region(dynamo_mapper::Region::new("us-west-2"))
///     .load()
///     .await;
/// dynamo_mapper::init(&config).await;
/// # }
/// ```
pub async fn init(config: &SdkConfig) {
    let _ = GLOBAL_CLIENT
        .get_or_init(|| async { DynamoDbClient::new(config) })
        .await;
}

/// Install `client` as the global client, e.g. one pointed at a test endpoint
pub async fn init_with_client(client: DynamoDbClient) {
    let _ = GLOBAL_CLIENT.get_or_init(|| async { client }).await;
}

/// The global client, built with adaptive retries, timeouts and the LocalStack
/// switch on first use unless [`init`] or [`init_with_client`] ran earlier
pub async fn dynamodb_client() -> &'static DynamoDbClient {
    GLOBAL_CLIENT
        .get_or_init(|| async {
            let config = aws_config_defaults().await;
            DynamoDbClient::new(&config)
        })
        .await
}
