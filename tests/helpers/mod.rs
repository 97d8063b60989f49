/// Test helpers and fixtures for integration tests
///
/// These tests talk to a real store. Run them against LocalStack with
/// `AWS_PROFILE=localstack cargo test -- --ignored`.
pub mod fixtures;

pub use dynamo_mapper::{Mapper, Record, setup};
pub use rusty_ulid::generate_ulid_string;

// Re-export common fixtures
pub use fixtures::{Account, Event};

use tokio::sync::OnceCell;

/// Ensure DynamoDB client is initialized for tests
static TEST_INIT: OnceCell<()> = OnceCell::const_new();

/// Initialize DynamoDB client for tests (idempotent)
pub async fn init_test_client() {
    TEST_INIT
        .get_or_init(|| async {
            // Trigger auto-initialization
            let _ = dynamo_mapper::dynamodb_client().await;
        })
        .await;
}

/// Mapper over the global client whose table exists
///
/// Creates the table if it doesn't exist. Safe to call multiple times.
pub async fn mapper<T: Record>() -> Mapper<T> {
    init_test_client().await;
    let mapper = Mapper::<T>::from_global()
        .await
        .expect("fixture schema is valid");
    setup::table(&mapper).await.expect("create table");
    mapper
}

/// Unique hash key so tests never see each other's items
pub fn unique(name: &str) -> String {
    format!("{name}_{}", generate_ulid_string())
}
