use aws_sdk_dynamodb::operation::get_item::GetItemInput;
use std::fmt;

use super::{Finalizer, Mapper, observe};
use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{ExpressionBuilder, Projection, compose};
use crate::schema::Record;

/// A GetItem request
pub struct GetRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    item: &'a T,
    table_name: Option<String>,
    projection: Option<Projection>,
    consistent_read: Option<bool>,
    finalizer: Option<Finalizer<'a, GetItemInput>>,
}

impl<'a, T: Record> GetRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>, item: &'a T) -> Self {
        Self {
            mapper,
            item,
            table_name: None,
            projection: None,
            consistent_read: None,
            finalizer: None,
        }
    }

    /// Read from `table_name` instead
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Only return the given attribute path; may be called repeatedly
    pub fn projection(mut self, path: impl Into<String>) -> Self {
        self.projection = Some(compose::add_names(
            self.projection.take(),
            path,
            std::iter::empty::<String>(),
        ));
        self
    }

    /// Strongly consistent read
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Mutate the composed input right before it is returned or sent
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut GetItemInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<GetItemInput, Error> {
        let table = self
            .table_name
            .unwrap_or_else(|| self.mapper.table_for(self.item).to_string());

        let mut builder = GetItemInput::builder()
            .table_name(table)
            .set_key(Some(self.mapper.schema().key(self.item)?))
            .set_consistent_read(self.consistent_read);

        if let Some(projection) = self.projection {
            let expr = ExpressionBuilder::new().with_projection(projection).build()?;
            builder = builder
                .set_projection_expression(expr.projection.clone())
                .set_expression_attribute_names(expr.attribute_names());
        }

        let mut input = builder.build()?;
        if let Some(finalizer) = self.finalizer {
            finalizer(&mut input);
        }
        Ok(input)
    }

    /// Fetch the item; `None` when no item is stored under the key
    pub async fn send(self) -> Result<Option<T>, Error> {
        let mapper = self.mapper;
        match self.send_raw().await? {
            Some(attributes) => Ok(Some(mapper.unmarshal(attributes)?)),
            None => Ok(None),
        }
    }

    /// Fetch the stored attributes without unmarshalling them
    pub async fn send_raw(self) -> Result<Option<Key>, Error> {
        let client = self.mapper.client();
        let input = self.build()?;
        let table = input.table_name.clone();

        let result = client
            .get_item()
            .set_table_name(input.table_name)
            .set_key(input.key)
            .set_attributes_to_get(input.attributes_to_get)
            .set_consistent_read(input.consistent_read)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_projection_expression(input.projection_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .send()
            .await
            .map_err(Error::from);
        let output = observe("GetItem", table.as_deref(), result)?;

        Ok(output.item.filter(|item| !item.is_empty()))
    }
}

impl<T: Record> fmt::Debug for GetRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetRequest")
            .field("table_name", &self.table_name)
            .field("projection", &self.projection)
            .field("consistent_read", &self.consistent_read)
            .field("finalizer", &self.finalizer.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{order, orders};
    use aws_sdk_dynamodb::types::{AttributeValue, ReturnConsumedCapacity};

    #[test]
    fn test_get_uses_full_key() {
        let mapper = orders();
        let item = order(7);
        let input = mapper.get(&item).build().unwrap();

        assert_eq!(input.table_name.as_deref(), Some("orders"));
        let key = input.key.unwrap();
        assert_eq!(key.len(), 2);
        assert_eq!(key.get("customer"), Some(&AttributeValue::S("c-1".into())));
        assert_eq!(key.get("id"), Some(&AttributeValue::S("o-1".into())));
        assert!(input.projection_expression.is_none());
        assert!(input.expression_attribute_names.is_none());
    }

    #[test]
    fn test_get_with_projection() {
        let mapper = orders();
        let item = order(0);
        let input = mapper
            .get(&item)
            .projection("total")
            .projection("meta.tags[0]")
            .consistent_read(true)
            .build()
            .unwrap();

        assert_eq!(input.projection_expression.as_deref(), Some("#0, #1.#2[0]"));
        let names = input.expression_attribute_names.unwrap();
        assert_eq!(names.get("#0").map(String::as_str), Some("total"));
        assert_eq!(names.get("#1").map(String::as_str), Some("meta"));
        assert_eq!(names.get("#2").map(String::as_str), Some("tags"));
        assert_eq!(input.consistent_read, Some(true));
    }

    #[test]
    fn test_get_finalizer_runs_last() {
        let mapper = orders();
        let item = order(0);
        let input = mapper
            .get(&item)
            .table_name("first")
            .finalizer(|input| {
                input.table_name = Some("last".into());
                input.return_consumed_capacity = Some(ReturnConsumedCapacity::Total);
            })
            .build()
            .unwrap();
        assert_eq!(input.table_name.as_deref(), Some("last"));
        assert_eq!(input.return_consumed_capacity, Some(ReturnConsumedCapacity::Total));
    }
}
