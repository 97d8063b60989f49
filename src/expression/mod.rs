//! Condition, update and projection expressions.
//!
//! Fragments are plain values; nothing is rendered until an [`ExpressionBuilder`]
//! assigns `#n` name and `:n` value placeholders and produces the strings and
//! placeholder maps the store expects.
//!
//! ```
//! use aws_sdk_dynamodb::types::AttributeValue;
//! use dynamo_mapper::expression::{Condition, ExpressionBuilder, Update, name, value};
//!
//! let expr = ExpressionBuilder::new()
//!     .with_condition(Condition::equal(name("version"), value(AttributeValue::N("3".into()))))
//!     .with_update(Update::new().set("version", name("version").plus(value(AttributeValue::N("1".into())))))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(expr.condition.as_deref(), Some("#0 = :0"));
//! assert_eq!(expr.update.as_deref(), Some("SET #0 = #0 + :1"));
//! ```

mod builder;
pub mod compose;

pub use builder::{Expression, ExpressionBuilder};

use aws_sdk_dynamodb::types::AttributeValue;

use crate::attribute::AttributeKind;

/// An operand inside a condition or a SET action
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Attribute path such as `a.b[2]`
    Name(String),
    /// Literal value
    Value(AttributeValue),
    /// `size(path)`
    Size(String),
    /// `left + right`
    Plus(Box<Operand>, Box<Operand>),
    /// `left - right`
    Minus(Box<Operand>, Box<Operand>),
    /// `list_append(left, right)`
    ListAppend(Box<Operand>, Box<Operand>),
    /// `if_not_exists(path, default)`
    IfNotExists(String, Box<Operand>),
}

/// Path naming exactly one top-level attribute.
///
/// Paths are otherwise parsed as documents, so `a.b` is attribute `b` inside map
/// `a`. An attribute whose name contains `.` or `[` is addressed through this
/// function, which wraps it in backticks when needed: `` `a.b` ``.
///
/// ```
/// use dynamo_mapper::expression::{ExpressionBuilder, Projection, literal};
///
/// let expr = ExpressionBuilder::new()
///     .with_projection(Projection::new(literal("v1.2")))
///     .build()
///     .unwrap();
/// assert_eq!(expr.projection.as_deref(), Some("#0"));
/// assert_eq!(expr.names["#0"], "v1.2");
/// ```
pub fn literal(name: &str) -> String {
    if name.contains(['.', '[', '`']) {
        format!("`{name}`")
    } else {
        name.to_string()
    }
}

/// Attribute path operand
pub fn name(path: impl Into<String>) -> Operand {
    Operand::Name(path.into())
}

/// Literal value operand
pub fn value(value: AttributeValue) -> Operand {
    Operand::Value(value)
}

/// `size(path)` operand
pub fn size(path: impl Into<String>) -> Operand {
    Operand::Size(path.into())
}

/// `if_not_exists(path, default)` operand
pub fn if_not_exists(path: impl Into<String>, default: impl Into<Operand>) -> Operand {
    Operand::IfNotExists(path.into(), Box::new(default.into()))
}

/// `list_append(left, right)` operand
pub fn list_append(left: impl Into<Operand>, right: impl Into<Operand>) -> Operand {
    Operand::ListAppend(Box::new(left.into()), Box::new(right.into()))
}

impl Operand {
    /// `self + rhs`
    pub fn plus(self, rhs: impl Into<Operand>) -> Operand {
        Operand::Plus(Box::new(self), Box::new(rhs.into()))
    }

    /// `self - rhs`
    pub fn minus(self, rhs: impl Into<Operand>) -> Operand {
        Operand::Minus(Box::new(self), Box::new(rhs.into()))
    }
}

impl From<AttributeValue> for Operand {
    fn from(value: AttributeValue) -> Self {
        Operand::Value(value)
    }
}

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    /// `=`
    Equal,
    /// `<>`
    NotEqual,
    /// `<`
    LessThan,
    /// `<=`
    LessThanEqual,
    /// `>`
    GreaterThan,
    /// `>=`
    GreaterThanEqual,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Comparator::Equal => "=",
            Comparator::NotEqual => "<>",
            Comparator::LessThan => "<",
            Comparator::LessThanEqual => "<=",
            Comparator::GreaterThan => ">",
            Comparator::GreaterThanEqual => ">=",
        }
    }
}

/// A condition, filter or key-condition expression
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `left <op> right`
    Compare(Operand, Comparator, Operand),
    /// `operand BETWEEN low AND high`
    Between(Operand, Operand, Operand),
    /// `operand IN (a, b, ...)`
    In(Operand, Vec<Operand>),
    /// `attribute_exists(path)`
    AttributeExists(String),
    /// `attribute_not_exists(path)`
    AttributeNotExists(String),
    /// `attribute_type(path, :type)`
    AttributeType(String, AttributeKind),
    /// `begins_with(path, :prefix)`
    BeginsWith(String, Operand),
    /// `contains(path, operand)`
    Contains(String, Operand),
    /// `(a) AND (b) ...`
    And(Vec<Condition>),
    /// `(a) OR (b) ...`
    Or(Vec<Condition>),
    /// `NOT (a)`
    Not(Box<Condition>),
}

impl Condition {
    /// `left = right`
    pub fn equal(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::Equal, right.into())
    }

    /// `left <> right`
    pub fn not_equal(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::NotEqual, right.into())
    }

    /// `left < right`
    pub fn less_than(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::LessThan, right.into())
    }

    /// `left <= right`
    pub fn less_than_equal(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::LessThanEqual, right.into())
    }

    /// `left > right`
    pub fn greater_than(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::GreaterThan, right.into())
    }

    /// `left >= right`
    pub fn greater_than_equal(left: impl Into<Operand>, right: impl Into<Operand>) -> Self {
        Condition::Compare(left.into(), Comparator::GreaterThanEqual, right.into())
    }

    /// `operand BETWEEN low AND high`
    pub fn between(
        operand: impl Into<Operand>,
        low: impl Into<Operand>,
        high: impl Into<Operand>,
    ) -> Self {
        Condition::Between(operand.into(), low.into(), high.into())
    }

    /// `operand IN (candidates...)`
    pub fn is_in(operand: impl Into<Operand>, candidates: Vec<Operand>) -> Self {
        Condition::In(operand.into(), candidates)
    }

    /// `attribute_exists(path)`
    pub fn attribute_exists(path: impl Into<String>) -> Self {
        Condition::AttributeExists(path.into())
    }

    /// `attribute_not_exists(path)`
    pub fn attribute_not_exists(path: impl Into<String>) -> Self {
        Condition::AttributeNotExists(path.into())
    }

    /// `attribute_type(path, kind)`
    pub fn attribute_type(path: impl Into<String>, kind: AttributeKind) -> Self {
        Condition::AttributeType(path.into(), kind)
    }

    /// `begins_with(path, prefix)`
    pub fn begins_with(path: impl Into<String>, prefix: impl Into<String>) -> Self {
        Condition::BeginsWith(path.into(), Operand::Value(AttributeValue::S(prefix.into())))
    }

    /// `contains(path, operand)`
    pub fn contains(path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        Condition::Contains(path.into(), operand.into())
    }

    /// Conjunction; nested `And`s on the left are flattened
    pub fn and(self, other: Condition) -> Self {
        match self {
            Condition::And(mut operands) => {
                operands.push(other);
                Condition::And(operands)
            }
            left => Condition::And(vec![left, other]),
        }
    }

    /// Disjunction; nested `Or`s on the left are flattened
    pub fn or(self, other: Condition) -> Self {
        match self {
            Condition::Or(mut operands) => {
                operands.push(other);
                Condition::Or(operands)
            }
            left => Condition::Or(vec![left, other]),
        }
    }

    /// Negation
    pub fn not(self) -> Self {
        Condition::Not(Box::new(self))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum ActionKind {
    Add,
    Delete,
    Remove,
    Set,
}

impl ActionKind {
    fn keyword(self) -> &'static str {
        match self {
            ActionKind::Add => "ADD",
            ActionKind::Delete => "DELETE",
            ActionKind::Remove => "REMOVE",
            ActionKind::Set => "SET",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Action {
    kind: ActionKind,
    path: String,
    operand: Option<Operand>,
}

/// An update expression made of SET, REMOVE, ADD and DELETE actions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    actions: Vec<Action>,
}

impl Update {
    /// Empty update; it must receive at least one action before it can be built
    pub fn new() -> Self {
        Self::default()
    }

    /// `SET path = operand`
    pub fn set(self, path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.push(ActionKind::Set, path.into(), Some(operand.into()))
    }

    /// `REMOVE path`
    pub fn remove(self, path: impl Into<String>) -> Self {
        self.push(ActionKind::Remove, path.into(), None)
    }

    /// `ADD path operand`
    pub fn add(self, path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.push(ActionKind::Add, path.into(), Some(operand.into()))
    }

    /// `DELETE path operand`
    pub fn delete(self, path: impl Into<String>, operand: impl Into<Operand>) -> Self {
        self.push(ActionKind::Delete, path.into(), Some(operand.into()))
    }

    /// Number of actions
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Whether no action has been added
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Whether any action targets `path`
    pub fn touches(&self, path: &str) -> bool {
        self.actions.iter().any(|action| action.path == path)
    }

    fn push(mut self, kind: ActionKind, path: String, operand: Option<Operand>) -> Self {
        self.actions.push(Action {
            kind,
            path,
            operand,
        });
        self
    }
}

/// A projection: the attribute paths a read should return
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    names: Vec<String>,
}

impl Projection {
    /// Projection of a single path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            names: vec![path.into()],
        }
    }

    /// Add another path
    pub fn add(mut self, path: impl Into<String>) -> Self {
        self.names.push(path.into());
        self
    }

    /// The projected paths in order
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

impl<S: Into<String>> FromIterator<S> for Projection {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().map(Into::into).collect(),
        }
    }
}
