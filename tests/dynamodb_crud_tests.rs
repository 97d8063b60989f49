/// DynamoDB CRUD Operations Tests
///
/// Tests put, get, update and delete with optimistic locking and generated
/// timestamps against a live table.
use aws_sdk_dynamodb::types::AttributeValue;
use dynamo_mapper::expression::{Condition, name, value};
use dynamo_mapper::{Error, Phase};
use serial_test::serial;

mod helpers;
use helpers::*;

/// A new item is written with version 1 and both timestamps
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_put_and_get_item() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("put"), "ada");

    accounts.put(&account).send().await.unwrap();

    let stored = accounts.get(&account).send().await.unwrap().unwrap();
    assert_eq!(stored.owner, "ada");
    assert_eq!(stored.version, 1);
    assert!(stored.created_at.as_datetime().timestamp() > 0);
    assert!(stored.updated_at.as_datetime().timestamp() > 0);
    assert!(accounts.exists(&account).await.unwrap());
}

/// Missing items are `None`, not an error
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_get_missing_item() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("missing"), "nobody");

    assert!(accounts.get(&account).send().await.unwrap().is_none());
    assert!(!accounts.exists(&account).await.unwrap());
}

/// Writing a stale copy fails the version condition
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_put_conflict_is_conditional_check_failure() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("conflict"), "ada");
    accounts.put(&account).send().await.unwrap();

    // Version 0 again: the key now exists
    let err = accounts.put(&account).send().await.unwrap_err();
    assert!(err.is_conditional_check_failed(), "{err:?}");
    assert_eq!(err.phase(), Phase::Dispatch);

    let stored = accounts.get(&account).send().await.unwrap().unwrap();
    accounts.put(&stored).send().await.unwrap();

    // `stored` still carries version 1, the table has 2
    let err = accounts.put(&stored).send().await.unwrap_err();
    assert!(err.is_conditional_check_failed());
}

/// Put keeps an existing created timestamp
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_put_preserves_created_time() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("created"), "ada");
    accounts.put(&account).send().await.unwrap();

    let first = accounts.get(&account).send().await.unwrap().unwrap();
    accounts.put(&first).send().await.unwrap();

    let second = accounts.get(&account).send().await.unwrap().unwrap();
    assert_eq!(second.created_at, first.created_at);
    assert_eq!(second.version, 2);
}

/// Update touches only the named attributes and bumps the version
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_update_item_fields() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("update"), "ada");
    accounts.put(&account).send().await.unwrap();
    let stored = accounts.get(&account).send().await.unwrap().unwrap();

    accounts
        .update(&stored)
        .add("balance", 25)
        .set("owner", "grace")
        .send()
        .await
        .unwrap();

    let updated = accounts.get(&account).send().await.unwrap().unwrap();
    assert_eq!(updated.owner, "grace");
    assert_eq!(updated.balance, 25);
    assert_eq!(updated.version, 2);
    assert_eq!(updated.created_at, stored.created_at);

    // The in-memory copy is now stale
    let err = accounts
        .update(&stored)
        .set("owner", "alan")
        .send()
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());
}

/// Update with no action is refused before anything is sent
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_update_requires_an_action() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("noop"), "ada");

    let err = accounts.update(&account).send().await.unwrap_err();
    assert_eq!(err.phase(), Phase::Build);
}

/// Delete compares the version; a caller condition is ANDed on
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_delete_item() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("delete"), "ada");
    accounts.put(&account).send().await.unwrap();
    let stored = accounts.get(&account).send().await.unwrap().unwrap();

    let err = accounts.delete(&account).send().await.unwrap_err();
    assert!(err.is_conditional_check_failed());

    let err = accounts
        .delete(&stored)
        .condition(Condition::equal(
            name("owner"),
            value(AttributeValue::S("someone else".into())),
        ))
        .send()
        .await
        .unwrap_err();
    assert!(err.is_conditional_check_failed());

    accounts.delete(&stored).send().await.unwrap();
    assert!(accounts.get(&account).send().await.unwrap().is_none());
}

/// Disabling locking writes unconditionally
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_put_without_locking_overwrites() {
    let accounts = mapper::<Account>().await;
    let account = Account::new(&unique("overwrite"), "ada");
    accounts.put(&account).send().await.unwrap();

    let replacement = Account {
        owner: "grace".into(),
        version: 7,
        ..account.clone()
    };
    accounts
        .put(&replacement)
        .disable_optimistic_locking()
        .send()
        .await
        .unwrap();

    let stored = accounts.get(&account).send().await.unwrap().unwrap();
    assert_eq!(stored.owner, "grace");
    assert_eq!(stored.version, 7);
}

/// Unversioned records reject explicit locking
#[tokio::test]
#[serial]
#[ignore = "needs a DynamoDB endpoint"]
async fn test_unversioned_record() {
    let events = mapper::<Event>().await;
    let event = Event {
        stream: unique("plain"),
        seq: 1,
        kind: "created".into(),
    };

    events.put(&event).send().await.unwrap();
    events.put(&event).send().await.unwrap();

    let err = events
        .put(&event)
        .optimistic_locking(true)
        .send()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Request(_)));
}
