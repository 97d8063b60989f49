use aws_sdk_dynamodb::operation::delete_item::{DeleteItemInput, DeleteItemOutput};
use aws_sdk_dynamodb::types::{ReturnValue, ReturnValuesOnConditionCheckFailure};
use std::fmt;

use super::{Finalizer, Mapper, observe};
use crate::error::Error;
use crate::expression::{Condition, ExpressionBuilder, compose};
use crate::schema::Record;

/// A DeleteItem request.
///
/// With optimistic locking the stored version must equal the item's, even when
/// the item's version is zero.
pub struct DeleteRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    item: &'a T,
    table_name: Option<String>,
    condition: Option<Condition>,
    optimistic_locking: bool,
    return_values: Option<ReturnValue>,
    return_values_on_condition_check_failure: Option<ReturnValuesOnConditionCheckFailure>,
    finalizer: Option<Finalizer<'a, DeleteItemInput>>,
}

impl<'a, T: Record> DeleteRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>, item: &'a T) -> Self {
        Self {
            mapper,
            item,
            table_name: None,
            condition: None,
            optimistic_locking: mapper.schema().has_version(),
            return_values: None,
            return_values_on_condition_check_failure: None,
            finalizer: None,
        }
    }

    /// Delete from `table_name` instead
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

    /// Toggle the version condition
    pub fn optimistic_locking(mut self, enabled: bool) -> Self {
        self.optimistic_locking = enabled;
        self
    }

    /// Delete regardless of the stored version
    pub fn disable_optimistic_locking(self) -> Self {
        self.optimistic_locking(false)
    }

    /// Return the deleted item (`ALL_OLD`)
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
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut DeleteItemInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<DeleteItemInput, Error> {
        let mapper = self.mapper;
        let schema = mapper.schema();
        let mut condition = self.condition;

        if self.optimistic_locking {
            let strategy = schema.version_strategy().ok_or_else(|| {
                Error::Request(format!(
                    "optimistic locking must be disabled because type \"{}\" has no version",
                    schema.type_name()
                ))
            })?;
            condition = Some(compose::and(condition, strategy.delete_version(self.item)?));
        }

        let table = self
            .table_name
            .unwrap_or_else(|| mapper.table_for(self.item).to_string());
        let mut builder = DeleteItemInput::builder()
            .table_name(table)
            .set_key(Some(schema.key(self.item)?))
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
    pub async fn send(self) -> Result<DeleteItemOutput, Error> {
        let client = self.mapper.client();
        let input = self.build()?;
        let table = input.table_name.clone();

        let result = client
            .delete_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_expected(input.expected)
            .set_conditional_operator(input.conditional_operator)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values_on_condition_check_failure(
                input.return_values_on_condition_check_failure,
            )
            .send()
            .await
            .map_err(Error::from);
        observe("DeleteItem", table.as_deref(), result)
    }
}

impl<T: Record> fmt::Debug for DeleteRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeleteRequest")
            .field("table_name", &self.table_name)
            .field("condition", &self.condition)
            .field("optimistic_locking", &self.optimistic_locking)
            .field("return_values", &self.return_values)
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Note, offline_client, order, orders};
    use super::*;
    use aws_sdk_dynamodb::types::AttributeValue;

    #[test]
    fn test_delete_compares_version_even_when_zero() {
        let mapper = orders();
        for version in [0, 8] {
            let item = order(version);
            let input = mapper.delete(&item).build().unwrap();
            assert_eq!(input.condition_expression.as_deref(), Some("#0 = :0"));
            assert_eq!(
                input.expression_attribute_values.unwrap().get(":0"),
                Some(&AttributeValue::N(version.to_string()))
            );
            assert_eq!(input.key.unwrap().len(), 2);
        }
    }

    #[test]
    fn test_delete_with_caller_condition() {
        let mapper = orders();
        let item = order(8);
        let input = mapper
            .delete(&item)
            .condition(Condition::attribute_exists("total"))
            .or_condition(Condition::attribute_not_exists("coupon"))
            .return_all_old_values()
            .build()
            .unwrap();
        assert_eq!(
            input.condition_expression.as_deref(),
            Some("((attribute_exists(#0)) OR (attribute_not_exists(#1))) AND (#2 = :0)")
        );
        assert_eq!(input.return_values, Some(ReturnValue::AllOld));
    }

    #[test]
    fn test_delete_without_version() {
        let mapper = Mapper::<Note>::new(offline_client()).unwrap();
        let note = Note::default();
        let input = mapper.delete(&note).build().unwrap();
        assert!(input.condition_expression.is_none());
        assert!(input.expression_attribute_names.is_none());

        let err = mapper.delete(&note).optimistic_locking(true).build().unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }
}
