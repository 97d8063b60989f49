//! Combinators over optional accumulators.
//!
//! Each function accepts what has been composed so far (possibly nothing) and
//! always returns a non-empty fragment, so callers can fold caller-supplied and
//! mapper-generated pieces without special-casing the first one.

use super::{Condition, Operand, Projection, Update};

/// `acc AND right`, or just `right` when nothing was accumulated
pub fn and(acc: Option<Condition>, right: Condition) -> Condition {
    match acc {
        Some(left) => left.and(right),
        None => right,
    }
}

/// `acc OR right`, or just `right` when nothing was accumulated
pub fn or(acc: Option<Condition>, right: Condition) -> Condition {
    match acc {
        Some(left) => left.or(right),
        None => right,
    }
}

/// Append `SET path = operand`
pub fn set(acc: Option<Update>, path: impl Into<String>, operand: impl Into<Operand>) -> Update {
    acc.unwrap_or_default().set(path, operand)
}

/// Append `ADD path operand`
pub fn add(acc: Option<Update>, path: impl Into<String>, operand: impl Into<Operand>) -> Update {
    acc.unwrap_or_default().add(path, operand)
}

/// Append `REMOVE path`
pub fn remove(acc: Option<Update>, path: impl Into<String>) -> Update {
    acc.unwrap_or_default().remove(path)
}

/// Append `DELETE path operand`
pub fn delete(acc: Option<Update>, path: impl Into<String>, operand: impl Into<Operand>) -> Update {
    acc.unwrap_or_default().delete(path, operand)
}

/// Append one or more paths to a projection
pub fn add_names<I, S>(acc: Option<Projection>, first: impl Into<String>, rest: I) -> Projection
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let projection = match acc {
        Some(projection) => projection.add(first),
        None => Projection::new(first),
    };
    rest.into_iter().fold(projection, |projection, name| projection.add(name))
}
