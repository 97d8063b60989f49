/// Common test fixtures and data structures
///
/// Defines reusable records for use across multiple test files.
use dynamo_mapper::SchemaBuilder;
use dynamo_mapper::timestamp::{EpochSecond, Timestamp};
use serde::{Deserialize, Serialize};

use super::Record;

/// Versioned record with generated timestamps
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Account {
    pub account_id: String,
    pub owner: String,
    pub balance: i64,
    pub version: u64,
    pub created_at: Timestamp,
    pub updated_at: EpochSecond,
}

impl Record for Account {
    const TABLE: &'static str = "tests_mapper_accounts";

    fn schema(schema: &mut SchemaBuilder<Self>) {
        schema.field("account_id", |a| &a.account_id).hash_key();
        schema.field("version", |a| &a.version).version();
        schema.field("created_at", |a| &a.created_at).created_time();
        schema.field("updated_at", |a| &a.updated_at).modified_time();
    }
}

impl Account {
    #[allow(dead_code)]
    pub fn new(account_id: &str, owner: &str) -> Self {
        Self {
            account_id: account_id.to_string(),
            owner: owner.to_string(),
            ..Default::default()
        }
    }
}

/// Unversioned record with a numeric sort key
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Default)]
pub struct Event {
    pub stream: String,
    pub seq: u64,
    pub kind: String,
}

impl Record for Event {
    const TABLE: &'static str = "tests_mapper_events";

    fn schema(schema: &mut SchemaBuilder<Self>) {
        schema.field("stream", |e| &e.stream).hash_key();
        schema.field("seq", |e| &e.seq).sort_key();
    }
}

impl Event {
    /// `count` events of one stream, `seq` 0 upward
    #[allow(dead_code)]
    pub fn stream(stream: &str, count: u64) -> Vec<Self> {
        (0..count)
            .map(|seq| Event {
                stream: stream.to_string(),
                seq,
                kind: if seq % 2 == 0 { "even" } else { "odd" }.to_string(),
            })
            .collect()
    }
}
