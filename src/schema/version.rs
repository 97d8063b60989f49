use aws_sdk_dynamodb::types::AttributeValue;
use std::sync::Arc;

use super::Accessor;
use crate::attribute::Key;
use crate::error::Error;
use crate::expression::{Condition, Update, literal, name, value};

/// Optimistic locking for a record type.
///
/// Every method returns the condition the store must check before applying the
/// write; the mapper ANDs it after any caller-supplied condition.
pub trait VersionStrategy<T>: Send + Sync {
    /// Write the next version into `attributes` and return the guard condition
    fn put_version(&self, item: &T, attributes: &mut Key) -> Result<Condition, Error>;

    /// Extend `update` with the version bump and return it with the guard condition
    fn update_version(&self, item: &T, update: Update) -> Result<(Update, Condition), Error>;

    /// Guard condition for a delete
    fn delete_version(&self, item: &T) -> Result<Condition, Error>;
}

pub(crate) struct TaggedVersion<T> {
    pub(crate) hash_name: String,
    pub(crate) name: String,
    pub(crate) accessor: Arc<dyn Accessor<T>>,
}

impl<T> TaggedVersion<T> {
    pub(crate) fn expect_version(&self, item: &T) -> Result<Condition, Error> {
        if self.accessor.is_zero(item) {
            return Ok(Condition::attribute_not_exists(literal(&self.hash_name)));
        }
        self.current_equals(item)
    }

    pub(crate) fn next_version(&self) -> Update {
        Update::new().set(literal(&self.name), name(literal(&self.name)).plus(one()))
    }

    fn current_equals(&self, item: &T) -> Result<Condition, Error> {
        let current = self.accessor.value(item)?;
        Ok(Condition::equal(name(literal(&self.name)), value(current)))
    }
}

impl<T> VersionStrategy<T> for TaggedVersion<T> {
    fn put_version(&self, item: &T, attributes: &mut Key) -> Result<Condition, Error> {
        let (next, condition) = if self.accessor.is_zero(item) {
            (one(), Condition::attribute_not_exists(literal(&self.hash_name)))
        } else {
            let current = self.accessor.value(item)?;
            (
                increment(&current)?,
                Condition::equal(name(literal(&self.name)), value(current)),
            )
        };
        let _ = attributes.insert(self.name.clone(), next);
        Ok(condition)
    }

    fn update_version(&self, item: &T, update: Update) -> Result<(Update, Condition), Error> {
        if self.accessor.is_zero(item) {
            let condition = Condition::attribute_not_exists(literal(&self.hash_name));
            return Ok((update.set(literal(&self.name), one()), condition));
        }
        let condition = self.current_equals(item)?;
        let bump = name(literal(&self.name)).plus(one());
        Ok((update.set(literal(&self.name), bump), condition))
    }

    fn delete_version(&self, item: &T) -> Result<Condition, Error> {
        self.current_equals(item)
    }
}

fn one() -> AttributeValue {
    AttributeValue::N("1".into())
}

/// `current + 1`, keeping integer precision where the number allows it
pub(crate) fn increment(current: &AttributeValue) -> Result<AttributeValue, Error> {
    let AttributeValue::N(number) = current else {
        return Err(Error::Request(format!(
            "version attribute is not a number: {current:?}"
        )));
    };
    let number = number.trim();
    if let Some(next) = number.parse::<i64>().ok().and_then(|n| n.checked_add(1)) {
        return Ok(AttributeValue::N(next.to_string()));
    }
    if let Some(next) = number.parse::<u64>().ok().and_then(|n| n.checked_add(1)) {
        return Ok(AttributeValue::N(next.to_string()));
    }
    match number.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(AttributeValue::N((n + 1.0).to_string())),
        _ => Err(Error::Request(format!(
            "version attribute is not a number: {number:?}"
        ))),
    }
}
