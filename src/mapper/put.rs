use aws_sdk_dynamodb::operation::put_item::{PutItemInput, PutItemOutput};
use aws_sdk_dynamodb::types::{ReturnValue, ReturnValuesOnConditionCheckFailure};
use std::fmt;

use super::{Finalizer, Mapper, observe};
use crate::error::Error;
use crate::expression::{Condition, ExpressionBuilder, compose};
use crate::schema::Record;

/// A PutItem request.
///
/// Optimistic locking and timestamp generation start enabled when the record's
/// schema supports them. Explicitly enabling either on a record without that
/// support fails at build time.
pub struct PutRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    item: &'a T,
    table_name: Option<String>,
    condition: Option<Condition>,
    optimistic_locking: bool,
    auto_generate_timestamps: bool,
    return_values: Option<ReturnValue>,
    return_values_on_condition_check_failure: Option<ReturnValuesOnConditionCheckFailure>,
    finalizer: Option<Finalizer<'a, PutItemInput>>,
}

impl<'a, T: Record> PutRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>, item: &'a T) -> Self {
        let schema = mapper.schema();
        Self {
            mapper,
            item,
            table_name: None,
            condition: None,
            optimistic_locking: schema.has_version(),
            auto_generate_timestamps: schema.has_timestamps(),
            return_values: None,
            return_values_on_condition_check_failure: None,
            finalizer: None,
        }
    }

    /// Write to `table_name` instead
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Replace the caller condition
    pub fn condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// AND `condition` onto the caller condition
    pub fn and_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(compose::and(self.condition.take(), condition));
        self
    }

    /// OR `condition` onto the caller condition
    pub fn or_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(compose::or(self.condition.take(), condition));
        self
    }

    /// Toggle the version condition and increment
    pub fn optimistic_locking(mut self, enabled: bool) -> Self {
        self.optimistic_locking = enabled;
        self
    }

    /// Skip the version condition and increment
    pub fn disable_optimistic_locking(self) -> Self {
        self.optimistic_locking(false)
    }

    /// Toggle created/modified timestamp generation
    pub fn auto_generate_timestamps(mut self, enabled: bool) -> Self {
        self.auto_generate_timestamps = enabled;
        self
    }

    /// Leave timestamp attributes as marshalled
    pub fn disable_auto_generate_timestamps(self) -> Self {
        self.auto_generate_timestamps(false)
    }

    /// Return the replaced item (`ALL_OLD`)
    pub fn return_all_old_values(mut self) -> Self {
        self.return_values = Some(ReturnValue::AllOld);
        self
    }

    /// Return the stored item when the condition fails
    pub fn return_all_old_values_on_condition_check_failure(mut self) -> Self {
        self.return_values_on_condition_check_failure =
            Some(ReturnValuesOnConditionCheckFailure::AllOld);
        self
    }

    /// Mutate the composed input right before it is returned or sent
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut PutItemInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<PutItemInput, Error> {
        let mapper = self.mapper;
        let schema = mapper.schema();
        let mut attributes = mapper.marshal(self.item)?;
        let mut condition = self.condition;

        if self.optimistic_locking {
            let strategy = schema.version_strategy().ok_or_else(|| {
                Error::Request(format!(
                    "optimistic locking must be disabled because type \"{}\" has no version",
                    schema.type_name()
                ))
            })?;
            let version = strategy.put_version(self.item, &mut attributes)?;
            condition = Some(compose::and(condition, version));
        }

        if self.auto_generate_timestamps {
            let strategy = schema.timestamp_strategy().ok_or_else(|| {
                Error::Request(format!(
                    "timestamp generation must be disabled because type \"{}\" has no timestamps",
                    schema.type_name()
                ))
            })?;
            strategy.put_timestamps(self.item, mapper.now(), &mut attributes)?;
        }

        let table = self
            .table_name
            .unwrap_or_else(|| mapper.table_for(self.item).to_string());
        let mut builder = PutItemInput::builder()
            .table_name(table)
            .set_item(Some(attributes))
            .set_return_values(self.return_values)
            .set_return_values_on_condition_check_failure(
                self.return_values_on_condition_check_failure,
            );

        if let Some(condition) = condition {
            let expr = ExpressionBuilder::new().with_condition(condition).build()?;
            builder = builder
                .set_condition_expression(expr.condition.clone())
                .set_expression_attribute_names(expr.attribute_names())
                .set_expression_attribute_values(expr.attribute_values());
        }

        let mut input = builder.build()?;
        if let Some(finalizer) = self.finalizer {
            finalizer(&mut input);
        }
        Ok(input)
    }

    /// Compose and send
    pub async fn send(self) -> Result<PutItemOutput, Error> {
        let client = self.mapper.client();
        let input = self.build()?;
        let table = input.table_name.clone();

        let result = client
            .put_item()
            .set_table_name(input.table_name)
            .set_item(input.item)
            .set_expected(input.expected)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .set_conditional_operator(input.conditional_operator)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values_on_condition_check_failure(
                input.return_values_on_condition_check_failure,
            )
            .send()
            .await
            .map_err(Error::from);
        observe("PutItem", table.as_deref(), result)
    }
}

impl<T: Record> fmt::Debug for PutRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PutRequest")
            .field("table_name", &self.table_name)
            .field("condition", &self.condition)
            .field("optimistic_locking", &self.optimistic_locking)
            .field("auto_generate_timestamps", &self.auto_generate_timestamps)
            .field("return_values", &self.return_values)
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Note, fixed_now, offline_client, order, orders};
    use super::*;
    use crate::attribute::Binary;
    use crate::schema::SchemaBuilder;
    use crate::timestamp::Timestamp;
    use aws_sdk_dynamodb::primitives::Blob;
    use aws_sdk_dynamodb::types::AttributeValue;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Chunk {
        stream: Binary,
        seq: u32,
    }

    impl Record for Chunk {
        const TABLE: &'static str = "chunks";

        fn schema(schema: &mut SchemaBuilder<Self>) {
            schema.field("stream", |c| &c.stream).hash_key();
            schema.field("seq", |c| &c.seq).sort_key();
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Session {
        id: String,
        opened: DateTime<Utc>,
        touched: DateTime<Utc>,
    }

    impl Record for Session {
        const TABLE: &'static str = "sessions";

        fn schema(schema: &mut SchemaBuilder<Self>) {
            schema.field("id", |s| &s.id).hash_key();
            schema.field("opened", |s| &s.opened).created_time().unix_time();
            schema.field("touched", |s| &s.touched).modified_time().unix_time();
        }
    }

    fn session(opened: DateTime<Utc>) -> Session {
        Session {
            id: "s-1".into(),
            opened,
            touched: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    fn n(value: &str) -> AttributeValue {
        AttributeValue::N(value.into())
    }

    #[test]
    fn test_put_new_item() {
        let mapper = orders();
        let item = order(0);
        let input = mapper.put(&item).build().unwrap();

        assert_eq!(input.table_name.as_deref(), Some("orders"));
        assert_eq!(
            input.condition_expression.as_deref(),
            Some("attribute_not_exists(#0)")
        );
        let names = input.expression_attribute_names.unwrap();
        assert_eq!(names.get("#0").map(String::as_str), Some("customer"));
        assert!(input.expression_attribute_values.is_none());

        let attributes = input.item.unwrap();
        assert_eq!(attributes.get("version"), Some(&n("1")));
        assert_eq!(attributes.get("total"), Some(&n("30")));
        assert_eq!(
            attributes.get("created"),
            Some(&AttributeValue::S("2024-03-09T17:45:12.250Z".into()))
        );
        assert_eq!(attributes.get("modified"), Some(&n("1710006312")));
    }

    #[test]
    fn test_put_existing_item_keeps_created_time() {
        let mapper = orders();
        let created = Timestamp::from(fixed_now() - chrono::Duration::days(3));
        let item = super::super::tests::Order {
            created,
            ..order(4)
        };
        let input = mapper.put(&item).build().unwrap();

        assert_eq!(input.condition_expression.as_deref(), Some("#0 = :0"));
        assert_eq!(
            input.expression_attribute_values.unwrap().get(":0"),
            Some(&n("4"))
        );
        let attributes = input.item.unwrap();
        assert_eq!(attributes.get("version"), Some(&n("5")));
        assert_eq!(
            attributes.get("created"),
            Some(&AttributeValue::S("2024-03-06T17:45:12.250Z".into()))
        );
        assert_eq!(attributes.get("modified"), Some(&n("1710006312")));
    }

    #[test]
    fn test_put_caller_condition_comes_first() {
        let mapper = orders();
        let item = order(2);
        let input = mapper
            .put(&item)
            .condition(Condition::attribute_exists("total"))
            .build()
            .unwrap();

        assert_eq!(
            input.condition_expression.as_deref(),
            Some("(attribute_exists(#0)) AND (#1 = :0)")
        );
    }

    #[test]
    fn test_put_with_features_disabled() {
        let mapper = orders();
        let item = order(9);
        let input = mapper
            .put(&item)
            .disable_optimistic_locking()
            .disable_auto_generate_timestamps()
            .build()
            .unwrap();

        assert!(input.condition_expression.is_none());
        let attributes = input.item.unwrap();
        assert_eq!(attributes.get("version"), Some(&n("9")));
        assert_eq!(attributes.get("modified"), Some(&n("0")));
    }

    #[test]
    fn test_put_rejects_unsupported_features() {
        let mapper = Mapper::<Note>::new(offline_client()).unwrap();
        let note = Note {
            id: "n".into(),
            text: "hello".into(),
        };

        let input = mapper.put(&note).build().unwrap();
        assert!(input.condition_expression.is_none());

        let err = mapper.put(&note).optimistic_locking(true).build().unwrap_err();
        assert!(matches!(err, Error::Request(_)));
        assert_eq!(err.phase(), crate::error::Phase::Build);

        let err = mapper
            .put(&note)
            .auto_generate_timestamps(true)
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[test]
    fn test_put_return_values_and_finalizer() {
        let mapper = orders();
        let item = order(1);
        let input = mapper
            .put(&item)
            .return_all_old_values()
            .return_all_old_values_on_condition_check_failure()
            .finalizer(|input| input.condition_expression = None)
            .build()
            .unwrap();

        assert_eq!(input.return_values, Some(ReturnValue::AllOld));
        assert_eq!(
            input.return_values_on_condition_check_failure,
            Some(ReturnValuesOnConditionCheckFailure::AllOld)
        );
        assert!(input.condition_expression.is_none());
    }

    #[test]
    fn test_put_binary_key_matches_schema_key() {
        let mapper = Mapper::<Chunk>::new(offline_client()).unwrap();
        let chunk = Chunk {
            stream: Binary::from(b"ab".as_slice()),
            seq: 3,
        };
        let key = mapper.schema().key(&chunk).unwrap();
        let attributes = mapper.put(&chunk).build().unwrap().item.unwrap();

        assert_eq!(
            attributes.get("stream"),
            Some(&AttributeValue::B(Blob::new(b"ab".to_vec())))
        );
        for (name, value) in &key {
            assert_eq!(attributes.get(name), Some(value), "key attribute {name}");
        }
        assert_eq!(mapper.unmarshal(attributes).unwrap(), chunk);
    }

    #[test]
    fn test_put_unix_time_round_trips() {
        let mapper = Mapper::<Session>::new(offline_client())
            .unwrap()
            .with_clock(fixed_now);
        let attributes = mapper
            .put(&session(DateTime::<Utc>::UNIX_EPOCH))
            .build()
            .unwrap()
            .item
            .unwrap();
        assert_eq!(attributes.get("opened"), Some(&n("1710006312")));
        assert_eq!(attributes.get("touched"), Some(&n("1710006312")));

        let stored = mapper.unmarshal(attributes).unwrap();
        let whole_seconds = DateTime::<Utc>::from_timestamp(1_710_006_312, 0).unwrap();
        assert_eq!(stored.opened, whole_seconds);
        assert_eq!(stored.touched, whole_seconds);
    }

    #[test]
    fn test_put_unix_time_keeps_existing_created_time_numeric() {
        let mapper = Mapper::<Session>::new(offline_client())
            .unwrap()
            .with_clock(fixed_now);
        let opened = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
        let attributes = mapper.put(&session(opened)).build().unwrap().item.unwrap();

        assert_eq!(attributes.get("opened"), Some(&n("1700000000")));
        assert_eq!(mapper.unmarshal(attributes).unwrap().opened, opened);
    }
}
