use aws_sdk_dynamodb::operation::update_item::{UpdateItemInput, UpdateItemOutput};
use aws_sdk_dynamodb::types::{AttributeValue, ReturnValue, ReturnValuesOnConditionCheckFailure};
use serde::Serialize;
use std::fmt;

use super::{Finalizer, Mapper, observe};
use crate::error::Error;
use crate::expression::{Condition, ExpressionBuilder, Operand, Update, compose, literal};
use crate::schema::Record;

/// An UpdateItem request.
///
/// The mapper cannot tell which fields of an in-memory record changed, so every
/// update must name at least one action. Attributes not named are left as stored.
pub struct UpdateRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    item: &'a T,
    table_name: Option<String>,
    update: Option<Update>,
    marshal_error: Option<Error>,
    condition: Option<Condition>,
    optimistic_locking: bool,
    auto_generate_timestamps: bool,
    return_values: Option<ReturnValue>,
    return_values_on_condition_check_failure: Option<ReturnValuesOnConditionCheckFailure>,
    finalizer: Option<Finalizer<'a, UpdateItemInput>>,
}

impl<'a, T: Record> UpdateRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>, item: &'a T) -> Self {
        let schema = mapper.schema();
        Self {
            mapper,
            item,
            table_name: None,
            update: None,
            marshal_error: None,
            condition: None,
            optimistic_locking: schema.has_version(),
            auto_generate_timestamps: schema.has_timestamps(),
            return_values: None,
            return_values_on_condition_check_failure: None,
            finalizer: None,
        }
    }

    fn value(&mut self, value: impl Serialize) -> Option<AttributeValue> {
        match serde_dynamo::to_attribute_value(value) {
            Ok(value) => Some(value),
            Err(e) => {
                // the first failure is reported by build
                if self.marshal_error.is_none() {
                    self.marshal_error = Some(Error::from(e));
                }
                None
            }
        }
    }

    /// `SET name = value`
    pub fn set(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let name = name.into();
        let value = self
            .value(value)
            .map(|value| self.mapper.schema().encode_time(&name, value));
        match value {
            Some(Ok(value)) => self.update = Some(compose::set(self.update.take(), name, value)),
            Some(Err(e)) => {
                if self.marshal_error.is_none() {
                    self.marshal_error = Some(e);
                }
            }
            None => {}
        }
        self
    }

    /// `SET name = operand` for computed operands such as `if_not_exists`
    pub fn set_expr(mut self, name: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.update = Some(compose::set(self.update.take(), name, operand));
        self
    }

    /// `REMOVE name`
    pub fn remove(mut self, name: impl Into<String>) -> Self {
        self.update = Some(compose::remove(self.update.take(), name));
        self
    }

    /// `ADD name value`, for numbers and sets
    pub fn add(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Some(value) = self.value(value) {
            self.update = Some(compose::add(self.update.take(), name, value));
        }
        self
    }

    /// `DELETE name value`, removing elements from a set
    pub fn delete(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        if let Some(value) = self.value(value) {
            self.update = Some(compose::delete(self.update.take(), name, value));
        }
        self
    }

    /// `SET` when `set`, else `REMOVE` when `remove`, else nothing.
    ///
    /// A full replacement passes `remove = true` so an empty value clears the
    /// attribute; a partial patch passes `remove = false` so absent values are
    /// left alone.
    pub fn set_or_remove(
        self,
        set: bool,
        remove: bool,
        name: impl Into<String>,
        value: impl Serialize,
    ) -> Self {
        self.set_or_remove_with(set, remove, name, || value)
    }

    /// Like [`set_or_remove`](Self::set_or_remove), producing the value only when it is set
    pub fn set_or_remove_with<V: Serialize>(
        self,
        set: bool,
        remove: bool,
        name: impl Into<String>,
        value: impl FnOnce() -> V,
    ) -> Self {
        match (set, remove) {
            (true, _) => self.set(name, value()),
            (false, true) => self.remove(name),
            (false, false) => self,
        }
    }

    /// Nothing for `None`, `REMOVE` for an empty string, `SET` otherwise
    pub fn set_or_remove_string(self, name: impl Into<String>, value: Option<&str>) -> Self {
        match value {
            None => self,
            Some("") => self.remove(name),
            Some(value) => self.set(name, value),
        }
    }

    /// Update `table_name` instead
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

    /// Toggle modified timestamp generation
    pub fn auto_generate_timestamps(mut self, enabled: bool) -> Self {
        self.auto_generate_timestamps = enabled;
        self
    }

    /// Do not touch the modified timestamp
    pub fn disable_auto_generate_timestamps(self) -> Self {
        self.auto_generate_timestamps(false)
    }

    /// `ALL_OLD`
    pub fn return_all_old_values(mut self) -> Self {
        self.return_values = Some(ReturnValue::AllOld);
        self
    }

    /// `UPDATED_OLD`
    pub fn return_updated_old_values(mut self) -> Self {
        self.return_values = Some(ReturnValue::UpdatedOld);
        self
    }

    /// `ALL_NEW`
    pub fn return_all_new_values(mut self) -> Self {
        self.return_values = Some(ReturnValue::AllNew);
        self
    }

    /// `UPDATED_NEW`
    pub fn return_updated_new_values(mut self) -> Self {
        self.return_values = Some(ReturnValue::UpdatedNew);
        self
    }

    /// Return the stored item when the condition fails
    pub fn return_all_old_values_on_condition_check_failure(mut self) -> Self {
        self.return_values_on_condition_check_failure =
            Some(ReturnValuesOnConditionCheckFailure::AllOld);
        self
    }

    /// Mutate the composed input right before it is returned or sent
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut UpdateItemInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<UpdateItemInput, Error> {
        if let Some(e) = self.marshal_error {
            return Err(e);
        }
        let mut update = self
            .update
            .filter(|update| !update.is_empty())
            .ok_or_else(|| Error::Request("update requires at least one action".into()))?;

        let mapper = self.mapper;
        let schema = mapper.schema();
        let key = schema.key(self.item)?;
        let mut condition = self.condition;

        if self.optimistic_locking {
            let strategy = schema.version_strategy().ok_or_else(|| {
                Error::Request(format!(
                    "optimistic locking must be disabled because type \"{}\" has no version",
                    schema.type_name()
                ))
            })?;
            reject_generated(&update, schema.version_name())?;
            let (versioned, version) = strategy.update_version(self.item, update)?;
            update = versioned;
            condition = Some(compose::and(condition, version));
        }

        if self.auto_generate_timestamps {
            let strategy = schema.timestamp_strategy().ok_or_else(|| {
                Error::Request(format!(
                    "timestamp generation must be disabled because type \"{}\" has no timestamps",
                    schema.type_name()
                ))
            })?;
            reject_generated(&update, schema.modified_time_name())?;
            update = strategy.update_timestamps(self.item, mapper.now(), update)?;
        }

        let mut expr = ExpressionBuilder::new().with_update(update);
        if let Some(condition) = condition {
            expr = expr.with_condition(condition);
        }
        let expr = expr.build()?;

        let table = self
            .table_name
            .unwrap_or_else(|| mapper.table_for(self.item).to_string());
        let mut input = UpdateItemInput::builder()
            .table_name(table)
            .set_key(Some(key))
            .set_update_expression(expr.update.clone())
            .set_condition_expression(expr.condition.clone())
            .set_expression_attribute_names(expr.attribute_names())
            .set_expression_attribute_values(expr.attribute_values())
            .set_return_values(self.return_values)
            .set_return_values_on_condition_check_failure(
                self.return_values_on_condition_check_failure,
            )
            .build()?;

        if let Some(finalizer) = self.finalizer {
            finalizer(&mut input);
        }
        Ok(input)
    }

    /// Compose and send
    pub async fn send(self) -> Result<UpdateItemOutput, Error> {
        let client = self.mapper.client();
        let input = self.build()?;
        let table = input.table_name.clone();

        let result = client
            .update_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_attribute_updates(input.attribute_updates)
            .set_expected(input.expected)
            .set_conditional_operator(input.conditional_operator)
            .set_return_values(input.return_values)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_return_item_collection_metrics(input.return_item_collection_metrics)
            .set_update_expression(input.update_expression)
            .set_condition_expression(input.condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_return_values_on_condition_check_failure(
                input.return_values_on_condition_check_failure,
            )
            .send()
            .await
            .map_err(Error::from);
        observe("UpdateItem", table.as_deref(), result)
    }
}

/// Generated attributes may not also be written by the caller
fn reject_generated(update: &Update, attribute: Option<&str>) -> Result<(), Error> {
    match attribute {
        Some(name) if update.touches(&literal(name)) => Err(Error::Request(format!(
            "attribute \"{name}\" is generated by the mapper and cannot be updated directly"
        ))),
        _ => Ok(()),
    }
}

impl<T: Record> fmt::Debug for UpdateRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpdateRequest")
            .field("table_name", &self.table_name)
            .field("update", &self.update)
            .field("condition", &self.condition)
            .field("optimistic_locking", &self.optimistic_locking)
            .field("auto_generate_timestamps", &self.auto_generate_timestamps)
            .field("return_values", &self.return_values)
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}
