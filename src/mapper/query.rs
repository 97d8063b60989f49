use aws_sdk_dynamodb::operation::query::QueryInput;
use aws_sdk_dynamodb::operation::scan::ScanInput;
use std::fmt;

use super::{Finalizer, Mapper, observe};
use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{Condition, ExpressionBuilder, Projection, compose};
use crate::schema::Record;

/// One page of query or scan results
#[must_use = "the next token is needed to fetch the following page"]
#[derive(Debug, Clone)]
pub struct Page<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Opaque token for the next page; `None` on the last page
    pub next_token: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_token: None,
        }
    }
}

impl<T> Page<T> {
    /// Whether more pages follow
    pub fn has_more(&self) -> bool {
        self.next_token.is_some()
    }
}

/// Index reads resume from the index key plus the table key
fn page<T: Record>(
    mapper: &Mapper<T>,
    items: Option<Vec<Key>>,
    last_evaluated_key: Option<Key>,
    index: bool,
) -> Result<Page<T>, Error> {
    let items = items
        .unwrap_or_default()
        .into_iter()
        .map(|item| mapper.unmarshal(item))
        .collect::<Result<Vec<_>, _>>()?;
    let next_token = last_evaluated_key
        .filter(|key| !key.is_empty())
        .map(|key| {
            if index {
                mapper.tokenizer().encode_index(&key)
            } else {
                mapper.tokenizer().encode(&key)
            }
        })
        .transpose()?;
    Ok(Page { items, next_token })
}

fn start_key<T: Record>(
    mapper: &Mapper<T>,
    token: Option<&str>,
    index: bool,
) -> Result<Option<Key>, Error> {
    token
        .map(|token| {
            if index {
                mapper.tokenizer().decode_index(token)
            } else {
                mapper.tokenizer().decode(token)
            }
        })
        .transpose()
}

/// A Query request over one partition
pub struct QueryRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    key_condition: Result<Condition, Error>,
    table_name: Option<String>,
    index_name: Option<String>,
    filter: Option<Condition>,
    projection: Option<Projection>,
    limit: Option<i32>,
    scan_forward: Option<bool>,
    consistent_read: Option<bool>,
    start_token: Option<String>,
    finalizer: Option<Finalizer<'a, QueryInput>>,
}

impl<'a, T: Record> QueryRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>, key_condition: Result<Condition, Error>) -> Self {
        Self {
            mapper,
            key_condition,
            table_name: None,
            index_name: None,
            filter: None,
            projection: None,
            limit: None,
            scan_forward: None,
            consistent_read: None,
            start_token: None,
            finalizer: None,
        }
    }

    /// AND a sort-key condition onto the key condition
    pub fn and_key_condition(mut self, condition: Condition) -> Self {
        self.key_condition = self
            .key_condition
            .map(|key_condition| compose::and(Some(key_condition), condition));
        self
    }

    /// Query `table_name` instead
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Query a secondary index
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// AND `filter` onto the filter expression
    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(compose::and(self.filter.take(), filter));
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

    /// Evaluate at most `limit` items
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Ascending (`true`, the default) or descending sort-key order
    pub fn scan_forward(mut self, forward: bool) -> Self {
        self.scan_forward = Some(forward);
        self
    }

    /// Strongly consistent read
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Resume after the page that returned `token`
    pub fn start_token(mut self, token: impl Into<String>) -> Self {
        self.start_token = Some(token.into());
        self
    }

    /// Mutate the composed input right before it is returned or sent
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut QueryInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<QueryInput, Error> {
        let mapper = self.mapper;
        let mut expr = ExpressionBuilder::new().with_key_condition(self.key_condition?);
        if let Some(filter) = self.filter {
            expr = expr.with_filter(filter);
        }
        if let Some(projection) = self.projection {
            expr = expr.with_projection(projection);
        }
        let expr = expr.build()?;

        let index = self.index_name.is_some();
        let table = self
            .table_name
            .unwrap_or_else(|| mapper.table_name().to_string());
        let mut input = QueryInput::builder()
            .table_name(table)
            .set_index_name(self.index_name)
            .set_key_condition_expression(expr.key_condition.clone())
            .set_filter_expression(expr.filter.clone())
            .set_projection_expression(expr.projection.clone())
            .set_expression_attribute_names(expr.attribute_names())
            .set_expression_attribute_values(expr.attribute_values())
            .set_limit(self.limit)
            .set_scan_index_forward(self.scan_forward)
            .set_consistent_read(self.consistent_read)
            .set_exclusive_start_key(start_key(mapper, self.start_token.as_deref(), index)?)
            .build()?;

        if let Some(finalizer) = self.finalizer {
            finalizer(&mut input);
        }
        Ok(input)
    }

    /// Fetch one page
    pub async fn send(self) -> Result<Page<T>, Error> {
        let mapper = self.mapper;
        let input = self.build()?;
        let table = input.table_name.clone();
        let index = input.index_name.is_some();

        let result = mapper
            .client()
            .query()
            .set_table_name(input.table_name)
            .set_index_name(input.index_name)
            .set_select(input.select)
            .set_attributes_to_get(input.attributes_to_get)
            .set_limit(input.limit)
            .set_consistent_read(input.consistent_read)
            .set_key_conditions(input.key_conditions)
            .set_query_filter(input.query_filter)
            .set_conditional_operator(input.conditional_operator)
            .set_scan_index_forward(input.scan_index_forward)
            .set_exclusive_start_key(input.exclusive_start_key)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_projection_expression(input.projection_expression)
            .set_filter_expression(input.filter_expression)
            .set_key_condition_expression(input.key_condition_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .send()
            .await
            .map_err(Error::from);
        let output = observe("Query", table.as_deref(), result)?;

        page(mapper, output.items, output.last_evaluated_key, index)
    }
}

impl<T: Record> fmt::Debug for QueryRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryRequest")
            .field("key_condition", &self.key_condition)
            .field("table_name", &self.table_name)
            .field("index_name", &self.index_name)
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("limit", &self.limit)
            .field("scan_forward", &self.scan_forward)
            .field("has_start_token", &self.start_token.is_some())
            .finish_non_exhaustive()
    }
}

/// A Scan request
pub struct ScanRequest<'a, T: Record> {
    mapper: &'a Mapper<T>,
    table_name: Option<String>,
    index_name: Option<String>,
    filter: Option<Condition>,
    projection: Option<Projection>,
    limit: Option<i32>,
    consistent_read: Option<bool>,
    segment: Option<(i32, i32)>,
    start_token: Option<String>,
    finalizer: Option<Finalizer<'a, ScanInput>>,
}

impl<'a, T: Record> ScanRequest<'a, T> {
    pub(super) fn new(mapper: &'a Mapper<T>) -> Self {
        Self {
            mapper,
            table_name: None,
            index_name: None,
            filter: None,
            projection: None,
            limit: None,
            consistent_read: None,
            segment: None,
            start_token: None,
            finalizer: None,
        }
    }

    /// Scan `table_name` instead
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    /// Scan a secondary index
    pub fn index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    /// AND `filter` onto the filter expression
    pub fn filter(mut self, filter: Condition) -> Self {
        self.filter = Some(compose::and(self.filter.take(), filter));
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

    /// Evaluate at most `limit` items
    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Strongly consistent read
    pub fn consistent_read(mut self, consistent_read: bool) -> Self {
        self.consistent_read = Some(consistent_read);
        self
    }

    /// Scan segment `segment` of `total_segments` in a parallel scan
    pub fn segment(mut self, segment: i32, total_segments: i32) -> Self {
        self.segment = Some((segment, total_segments));
        self
    }

    /// Resume after the page that returned `token`
    pub fn start_token(mut self, token: impl Into<String>) -> Self {
        self.start_token = Some(token.into());
        self
    }

    /// Mutate the composed input right before it is returned or sent
    pub fn finalizer(mut self, finalizer: impl FnOnce(&mut ScanInput) + Send + 'a) -> Self {
        self.finalizer = Some(Box::new(finalizer));
        self
    }

    /// Compose the SDK input without sending it
    pub fn build(self) -> Result<ScanInput, Error> {
        let mapper = self.mapper;
        let mut expr = ExpressionBuilder::new();
        if let Some(filter) = self.filter {
            expr = expr.with_filter(filter);
        }
        if let Some(projection) = self.projection {
            expr = expr.with_projection(projection);
        }
        let expr = expr.build()?;

        let index = self.index_name.is_some();
        let table = self
            .table_name
            .unwrap_or_else(|| mapper.table_name().to_string());
        let mut input = ScanInput::builder()
            .table_name(table)
            .set_index_name(self.index_name)
            .set_filter_expression(expr.filter.clone())
            .set_projection_expression(expr.projection.clone())
            .set_expression_attribute_names(expr.attribute_names())
            .set_expression_attribute_values(expr.attribute_values())
            .set_limit(self.limit)
            .set_consistent_read(self.consistent_read)
            .set_segment(self.segment.map(|(segment, _)| segment))
            .set_total_segments(self.segment.map(|(_, total)| total))
            .set_exclusive_start_key(start_key(mapper, self.start_token.as_deref(), index)?)
            .build()?;

        if let Some(finalizer) = self.finalizer {
            finalizer(&mut input);
        }
        Ok(input)
    }

    /// Fetch one page
    pub async fn send(self) -> Result<Page<T>, Error> {
        let mapper = self.mapper;
        let input = self.build()?;
        let table = input.table_name.clone();
        let index = input.index_name.is_some();

        let result = mapper
            .client()
            .scan()
            .set_table_name(input.table_name)
            .set_index_name(input.index_name)
            .set_attributes_to_get(input.attributes_to_get)
            .set_limit(input.limit)
            .set_select(input.select)
            .set_scan_filter(input.scan_filter)
            .set_conditional_operator(input.conditional_operator)
            .set_exclusive_start_key(input.exclusive_start_key)
            .set_return_consumed_capacity(input.return_consumed_capacity)
            .set_total_segments(input.total_segments)
            .set_segment(input.segment)
            .set_projection_expression(input.projection_expression)
            .set_filter_expression(input.filter_expression)
            .set_expression_attribute_names(input.expression_attribute_names)
            .set_expression_attribute_values(input.expression_attribute_values)
            .set_consistent_read(input.consistent_read)
            .send()
            .await
            .map_err(Error::from);
        let output = observe("Scan", table.as_deref(), result)?;

        page(mapper, output.items, output.last_evaluated_key, index)
    }
}

impl<T: Record> fmt::Debug for ScanRequest<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanRequest")
            .field("table_name", &self.table_name)
            .field("index_name", &self.index_name)
            .field("filter", &self.filter)
            .field("projection", &self.projection)
            .field("limit", &self.limit)
            .field("segment", &self.segment)
            .field("has_start_token", &self.start_token.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Order, offline_client, order, orders};
    use super::*;
    use crate::expression::{name, value};
    use crate::token::Tokenizer;
    use aws_sdk_dynamodb::types::AttributeValue;

    fn s(value: &str) -> AttributeValue {
        AttributeValue::S(value.into())
    }

    #[test]
    fn test_query_by_hash_and_sort_prefix() {
        let mapper = orders();
        let input = mapper
            .query("c-1")
            .and_key_condition(Condition::begins_with("id", "2024-"))
            .filter(Condition::greater_than(name("total"), value(AttributeValue::N("10".into()))))
            .projection("id")
            .limit(25)
            .scan_forward(false)
            .build()
            .unwrap();

        assert_eq!(input.table_name.as_deref(), Some("orders"));
        assert_eq!(input.filter_expression.as_deref(), Some("#0 > :0"));
        assert_eq!(
            input.key_condition_expression.as_deref(),
            Some("(#1 = :1) AND (begins_with(#2, :2))")
        );
        assert_eq!(input.projection_expression.as_deref(), Some("#2"));
        let names = input.expression_attribute_names.unwrap();
        assert_eq!(names.get("#1").map(String::as_str), Some("customer"));
        let values = input.expression_attribute_values.unwrap();
        assert_eq!(values.get(":1"), Some(&s("c-1")));
        assert_eq!(values.get(":2"), Some(&s("2024-")));
        assert_eq!(input.limit, Some(25));
        assert_eq!(input.scan_index_forward, Some(false));
        assert!(input.exclusive_start_key.is_none());
    }

    #[test]
    fn test_query_resumes_from_token() {
        let mapper = orders().with_tokenizer(Tokenizer::new().with_aes(&[3; 32]).unwrap());
        let last = Key::from([("customer".to_string(), s("c-1")), ("id".to_string(), s("o-9"))]);
        let token = mapper.tokenizer().encode(&last).unwrap();

        let input = mapper.query("c-1").start_token(token).build().unwrap();
        assert_eq!(input.exclusive_start_key, Some(last));

        let err = mapper.query("c-1").start_token("garbage").build().unwrap_err();
        assert!(matches!(err, Error::Token(_)));
    }

    #[test]
    fn test_query_by_index() {
        let mapper = Mapper::<Order>::new(offline_client()).unwrap();
        let input = mapper
            .query_by(Condition::equal(name("status"), value(s("open"))))
            .index_name("by-status")
            .build()
            .unwrap();
        assert_eq!(input.index_name.as_deref(), Some("by-status"));
        assert_eq!(input.key_condition_expression.as_deref(), Some("#0 = :0"));
    }

    #[test]
    fn test_page_encodes_last_key() {
        let mapper = orders();
        let item = mapper.marshal(&order(1)).unwrap();
        let last = Key::from([("customer".to_string(), s("c-1"))]);

        let page = page(&mapper, Some(vec![item]), Some(last), false).unwrap();
        assert_eq!(page.items, vec![order(1)]);
        assert_eq!(page.next_token.as_deref(), Some(r#"{"customer":{"S":"c-1"}}"#));
        assert!(page.has_more());

        let page = super::page(&mapper, None, Some(Key::new()), false).unwrap();
        assert!(page.items.is_empty());
        assert!(!page.has_more());
    }

    #[test]
    fn test_index_page_resumes_with_four_attribute_key() {
        let mapper = orders();
        let last = Key::from([
            ("customer".to_string(), s("c-1")),
            ("id".to_string(), s("o-9")),
            ("status".to_string(), s("open")),
            ("placed".to_string(), AttributeValue::N("1710006312".into())),
        ]);

        let page = super::page(&mapper, None, Some(last.clone()), true).unwrap();
        let token = page.next_token.unwrap();

        let input = mapper
            .query_by(Condition::equal(name("status"), value(s("open"))))
            .index_name("by-status")
            .start_token(token.clone())
            .build()
            .unwrap();
        assert_eq!(input.exclusive_start_key, Some(last.clone()));

        let input = mapper
            .scan()
            .index_name("by-status")
            .start_token(token.clone())
            .build()
            .unwrap();
        assert_eq!(input.exclusive_start_key, Some(last.clone()));

        // a table read never accepts an index position
        let err = mapper.query("c-1").start_token(token).build().unwrap_err();
        assert!(matches!(err, Error::Token(_)));
        assert!(super::page(&mapper, None, Some(last), false).is_err());
    }

    #[test]
    fn test_scan_segments() {
        let mapper = orders().with_table_name("orders-archive");
        let input = mapper
            .scan()
            .segment(1, 4)
            .consistent_read(true)
            .build()
            .unwrap();
        assert_eq!(input.table_name.as_deref(), Some("orders-archive"));
        assert_eq!(input.segment, Some(1));
        assert_eq!(input.total_segments, Some(4));
        assert!(input.filter_expression.is_none());
        assert!(input.expression_attribute_names.is_none());
    }
}
