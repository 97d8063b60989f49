use aws_sdk_dynamodb::types::AttributeValue;
use std::collections::HashMap;
use tracing::trace;

use super::{Action, ActionKind, Condition, Operand, Projection, Update};
use crate::error::Error;

/// Rendered expressions plus their placeholder maps
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Expression {
    /// Condition expression
    pub condition: Option<String>,
    /// Filter expression
    pub filter: Option<String>,
    /// Key condition expression
    pub key_condition: Option<String>,
    /// Projection expression
    pub projection: Option<String>,
    /// Update expression
    pub update: Option<String>,
    /// `#n` placeholder to attribute name
    pub names: HashMap<String, String>,
    /// `:n` placeholder to value
    pub values: HashMap<String, AttributeValue>,
}

impl Expression {
    /// Name placeholders, or `None` when there are none (the store rejects empty maps)
    pub fn attribute_names(&self) -> Option<HashMap<String, String>> {
        (!self.names.is_empty()).then(|| self.names.clone())
    }

    /// Value placeholders, or `None` when there are none
    pub fn attribute_values(&self) -> Option<HashMap<String, AttributeValue>> {
        (!self.values.is_empty()).then(|| self.values.clone())
    }
}

/// Collects expression fragments and renders them with shared placeholders.
///
/// Placeholders are assigned in a fixed order: condition, filter, key condition,
/// projection, then update. Attribute names are deduplicated (`#0`, `#1`, ...)
/// while every value gets its own placeholder (`:0`, `:1`, ...).
#[derive(Debug, Clone, Default)]
pub struct ExpressionBuilder {
    condition: Option<Condition>,
    filter: Option<Condition>,
    key_condition: Option<Condition>,
    projection: Option<Projection>,
    update: Option<Update>,
}

impl ExpressionBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the condition expression
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Set the filter expression
    pub fn with_filter(mut self, filter: Condition) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Set the key condition expression
    pub fn with_key_condition(mut self, key_condition: Condition) -> Self {
        self.key_condition = Some(key_condition);
        self
    }

    /// Set the projection expression
    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Set the update expression
    pub fn with_update(mut self, update: Update) -> Self {
        self.update = Some(update);
        self
    }

    /// Render every fragment that was set
    pub fn build(self) -> Result<Expression, Error> {
        let mut aliases = Aliases::default();

        let condition = self
            .condition
            .map(|c| render_condition(&c, &mut aliases))
            .transpose()?;
        let filter = self
            .filter
            .map(|c| render_condition(&c, &mut aliases))
            .transpose()?;
        let key_condition = self
            .key_condition
            .map(|c| render_condition(&c, &mut aliases))
            .transpose()?;
        let projection = self
            .projection
            .map(|p| render_projection(&p, &mut aliases))
            .transpose()?;
        let update = self
            .update
            .map(|u| render_update(&u, &mut aliases))
            .transpose()?;

        trace!(?condition, ?filter, ?key_condition, ?projection, ?update, "built expression");

        Ok(Expression {
            condition,
            filter,
            key_condition,
            projection,
            update,
            names: aliases.names,
            values: aliases.values,
        })
    }
}

#[derive(Debug, Default)]
struct Aliases {
    by_name: HashMap<String, String>,
    names: HashMap<String, String>,
    values: HashMap<String, AttributeValue>,
}

impl Aliases {
    /// Alias every segment of a document path: `a.b[2]` becomes `#0.#1[2]`.
    /// A backtick-quoted path is one attribute name, see [`literal`](super::literal).
    fn path(&mut self, path: &str) -> Result<String, Error> {
        if let Some(name) = path
            .strip_prefix('`')
            .and_then(|rest| rest.strip_suffix('`'))
        {
            if name.is_empty() {
                return Err(Error::Expression(format!("invalid attribute path \"{path}\"")));
            }
            return Ok(self.name(name));
        }
        let mut rendered = Vec::new();
        for segment in path.split('.') {
            let (base, indexes) = match segment.find('[') {
                Some(i) => segment.split_at(i),
                None => (segment, ""),
            };
            if base.is_empty() {
                return Err(Error::Expression(format!("invalid attribute path \"{path}\"")));
            }
            validate_indexes(path, indexes)?;
            rendered.push(format!("{}{}", self.name(base), indexes));
        }
        Ok(rendered.join("."))
    }

    fn name(&mut self, name: &str) -> String {
        if let Some(alias) = self.by_name.get(name) {
            return alias.clone();
        }
        let alias = format!("#{}", self.by_name.len());
        let _ = self.by_name.insert(name.to_string(), alias.clone());
        let _ = self.names.insert(alias.clone(), name.to_string());
        alias
    }

    fn value(&mut self, value: &AttributeValue) -> String {
        let alias = format!(":{}", self.values.len());
        let _ = self.values.insert(alias.clone(), value.clone());
        alias
    }
}

fn validate_indexes(path: &str, mut indexes: &str) -> Result<(), Error> {
    while !indexes.is_empty() {
        let close = indexes.find(']');
        let valid = indexes.starts_with('[')
            && close.is_some_and(|end| {
                end > 1 && indexes[1..end].chars().all(|c| c.is_ascii_digit())
            });
        match (valid, close) {
            (true, Some(end)) => indexes = &indexes[end + 1..],
            _ => {
                return Err(Error::Expression(format!(
                    "invalid list index in attribute path \"{path}\""
                )));
            }
        }
    }
    Ok(())
}

fn render_operand(operand: &Operand, aliases: &mut Aliases) -> Result<String, Error> {
    Ok(match operand {
        Operand::Name(path) => aliases.path(path)?,
        Operand::Value(value) => aliases.value(value),
        Operand::Size(path) => format!("size({})", aliases.path(path)?),
        Operand::Plus(left, right) => format!(
            "{} + {}",
            render_operand(left, aliases)?,
            render_operand(right, aliases)?
        ),
        Operand::Minus(left, right) => format!(
            "{} - {}",
            render_operand(left, aliases)?,
            render_operand(right, aliases)?
        ),
        Operand::ListAppend(left, right) => format!(
            "list_append({}, {})",
            render_operand(left, aliases)?,
            render_operand(right, aliases)?
        ),
        Operand::IfNotExists(path, default) => format!(
            "if_not_exists({}, {})",
            aliases.path(path)?,
            render_operand(default, aliases)?
        ),
    })
}

fn render_condition(condition: &Condition, aliases: &mut Aliases) -> Result<String, Error> {
    Ok(match condition {
        Condition::Compare(left, comparator, right) => format!(
            "{} {} {}",
            render_operand(left, aliases)?,
            comparator.symbol(),
            render_operand(right, aliases)?
        ),
        Condition::Between(operand, low, high) => format!(
            "{} BETWEEN {} AND {}",
            render_operand(operand, aliases)?,
            render_operand(low, aliases)?,
            render_operand(high, aliases)?
        ),
        Condition::In(operand, candidates) => {
            if candidates.is_empty() {
                return Err(Error::Expression("IN requires at least one candidate".into()));
            }
            let operand = render_operand(operand, aliases)?;
            let candidates = candidates
                .iter()
                .map(|c| render_operand(c, aliases))
                .collect::<Result<Vec<_>, _>>()?;
            format!("{} IN ({})", operand, candidates.join(", "))
        }
        Condition::AttributeExists(path) => format!("attribute_exists({})", aliases.path(path)?),
        Condition::AttributeNotExists(path) => {
            format!("attribute_not_exists({})", aliases.path(path)?)
        }
        Condition::AttributeType(path, kind) => {
            let path = aliases.path(path)?;
            let token = aliases.value(&AttributeValue::S(kind.type_token().to_string()));
            format!("attribute_type({path}, {token})")
        }
        Condition::BeginsWith(path, prefix) => format!(
            "begins_with({}, {})",
            aliases.path(path)?,
            render_operand(prefix, aliases)?
        ),
        Condition::Contains(path, operand) => format!(
            "contains({}, {})",
            aliases.path(path)?,
            render_operand(operand, aliases)?
        ),
        Condition::And(operands) => join_conditions(operands, "AND", aliases)?,
        Condition::Or(operands) => join_conditions(operands, "OR", aliases)?,
        Condition::Not(inner) => format!("NOT ({})", render_condition(inner, aliases)?),
    })
}

fn join_conditions(
    operands: &[Condition],
    keyword: &str,
    aliases: &mut Aliases,
) -> Result<String, Error> {
    if operands.is_empty() {
        return Err(Error::Expression(format!("{keyword} requires at least one operand")));
    }
    let rendered = operands
        .iter()
        .map(|c| render_condition(c, aliases).map(|s| format!("({s})")))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rendered.join(&format!(" {keyword} ")))
}

fn render_projection(projection: &Projection, aliases: &mut Aliases) -> Result<String, Error> {
    if projection.names.is_empty() {
        return Err(Error::Expression("projection has no attributes".into()));
    }
    let names = projection
        .names
        .iter()
        .map(|n| aliases.path(n))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.join(", "))
}

fn render_update(update: &Update, aliases: &mut Aliases) -> Result<String, Error> {
    if update.actions.is_empty() {
        return Err(Error::Expression("update expression has no actions".into()));
    }

    let mut actions: Vec<&Action> = update.actions.iter().collect();
    // Stable sort keeps insertion order inside each clause.
    actions.sort_by_key(|action| action.kind);

    let mut clauses: Vec<(ActionKind, Vec<String>)> = Vec::new();
    for action in actions {
        let path = aliases.path(&action.path)?;
        let rendered = match (action.kind, &action.operand) {
            (ActionKind::Set, Some(operand)) => {
                format!("{} = {}", path, render_operand(operand, aliases)?)
            }
            (ActionKind::Add | ActionKind::Delete, Some(operand)) => {
                format!("{} {}", path, render_operand(operand, aliases)?)
            }
            _ => path,
        };
        let same_clause = clauses.last().is_some_and(|(kind, _)| *kind == action.kind);
        if !same_clause {
            clauses.push((action.kind, Vec::new()));
        }
        if let Some((_, rendered_actions)) = clauses.last_mut() {
            rendered_actions.push(rendered);
        }
    }

    Ok(clauses
        .into_iter()
        .map(|(kind, rendered)| format!("{} {}", kind.keyword(), rendered.join(", ")))
        .collect::<Vec<_>>()
        .join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeKind;
    use crate::expression::{if_not_exists, list_append, literal, name, size, value};

    fn n(v: &str) -> AttributeValue {
        AttributeValue::N(v.to_string())
    }

    fn s(v: &str) -> AttributeValue {
        AttributeValue::S(v.to_string())
    }

    #[test]
    fn test_attribute_not_exists() {
        let expr = ExpressionBuilder::new()
            .with_condition(Condition::attribute_not_exists("id"))
            .build()
            .unwrap();
        assert_eq!(expr.condition.as_deref(), Some("attribute_not_exists(#0)"));
        assert_eq!(expr.names.get("#0").map(String::as_str), Some("id"));
        assert!(expr.values.is_empty());
        assert!(expr.attribute_values().is_none());
    }

    #[test]
    fn test_names_are_shared_and_values_are_not() {
        let expr = ExpressionBuilder::new()
            .with_condition(Condition::equal(name("version"), value(n("123"))))
            .with_update(Update::new().set("version", name("version").plus(value(n("1")))))
            .build()
            .unwrap();
        assert_eq!(expr.condition.as_deref(), Some("#0 = :0"));
        assert_eq!(expr.update.as_deref(), Some("SET #0 = #0 + :1"));
        assert_eq!(expr.names.len(), 1);
        assert_eq!(expr.values.get(":0"), Some(&n("123")));
        assert_eq!(expr.values.get(":1"), Some(&n("1")));
    }

    #[test]
    fn test_and_or_not() {
        let condition = Condition::attribute_exists("a")
            .and(Condition::greater_than(size("b"), value(n("3"))))
            .or(Condition::begins_with("c", "pre").not());
        let expr = ExpressionBuilder::new()
            .with_condition(condition)
            .build()
            .unwrap();
        assert_eq!(
            expr.condition.as_deref(),
            Some("((attribute_exists(#0)) AND (size(#1) > :0)) OR (NOT (begins_with(#2, :1)))")
        );
        assert_eq!(expr.values.get(":1"), Some(&s("pre")));
    }

    #[test]
    fn test_and_flattens() {
        let condition = Condition::attribute_exists("a")
            .and(Condition::attribute_exists("b"))
            .and(Condition::attribute_exists("c"));
        let expr = ExpressionBuilder::new()
            .with_condition(condition)
            .build()
            .unwrap();
        assert_eq!(
            expr.condition.as_deref(),
            Some("(attribute_exists(#0)) AND (attribute_exists(#1)) AND (attribute_exists(#2))")
        );
    }

    #[test]
    fn test_between_in_and_type() {
        let condition = Condition::between(name("age"), value(n("1")), value(n("9")))
            .and(Condition::is_in(name("state"), vec![value(s("a")), value(s("b"))]))
            .and(Condition::attribute_type("tags", AttributeKind::Ss))
            .and(Condition::not_equal(name("age"), value(n("5"))));
        let expr = ExpressionBuilder::new()
            .with_condition(condition)
            .build()
            .unwrap();
        assert_eq!(
            expr.condition.as_deref(),
            Some(
                "(#0 BETWEEN :0 AND :1) AND (#1 IN (:2, :3)) AND (attribute_type(#2, :4)) AND (#0 <> :5)"
            )
        );
        assert_eq!(expr.values.get(":4"), Some(&s("SS")));
    }

    #[test]
    fn test_document_paths() {
        let expr = ExpressionBuilder::new()
            .with_projection(Projection::new("a.b[2]").add("a").add("c[0][1]"))
            .build()
            .unwrap();
        assert_eq!(expr.projection.as_deref(), Some("#0.#1[2], #0, #2[0][1]"));
        assert_eq!(expr.names.get("#1").map(String::as_str), Some("b"));
    }

    #[test]
    fn test_literal_names_are_not_split() {
        assert_eq!(literal("plain"), "plain");
        assert_eq!(literal("a.b"), "`a.b`");
        let expr = ExpressionBuilder::new()
            .with_condition(Condition::attribute_exists(literal("a.b[1]")))
            .with_projection(Projection::new("a.b").add(literal("a.b")))
            .build()
            .unwrap();
        assert_eq!(expr.condition.as_deref(), Some("attribute_exists(#0)"));
        assert_eq!(expr.projection.as_deref(), Some("#1.#2, #3"));
        assert_eq!(expr.names.get("#0").map(String::as_str), Some("a.b[1]"));
        assert_eq!(expr.names.get("#3").map(String::as_str), Some("a.b"));
    }

    #[test]
    fn test_invalid_paths() {
        for path in ["", "a..b", "a[x]", "a[1", "[1]", "a[]", "``"] {
            let result = ExpressionBuilder::new()
                .with_projection(Projection::new(path))
                .build();
            assert!(
                matches!(result, Err(Error::Expression(_))),
                "{path} should be rejected"
            );
        }
    }

    #[test]
    fn test_update_clause_order() {
        let update = Update::new()
            .set("name", value(s("x")))
            .remove("legacy")
            .add("count", value(n("1")))
            .delete("tags", value(AttributeValue::Ss(vec!["old".into()])))
            .set("items", list_append(name("items"), value(AttributeValue::L(vec![]))))
            .set("seen", if_not_exists("seen", value(n("0"))))
            .set("left", name("left").minus(value(n("2"))));
        let expr = ExpressionBuilder::new().with_update(update).build().unwrap();
        assert_eq!(
            expr.update.as_deref(),
            Some(
                "ADD #0 :0\nDELETE #1 :1\nREMOVE #2\nSET #3 = :2, #4 = list_append(#4, :3), #5 = if_not_exists(#5, :4), #6 = #6 - :5"
            )
        );
    }

    #[test]
    fn test_placeholder_order_across_fragments() {
        let expr = ExpressionBuilder::new()
            .with_update(Update::new().set("u", value(n("4"))))
            .with_projection(Projection::new("p"))
            .with_key_condition(Condition::equal(name("k"), value(n("3"))))
            .with_filter(Condition::equal(name("f"), value(n("2"))))
            .with_condition(Condition::equal(name("c"), value(n("1"))))
            .build()
            .unwrap();
        assert_eq!(expr.condition.as_deref(), Some("#0 = :0"));
        assert_eq!(expr.filter.as_deref(), Some("#1 = :1"));
        assert_eq!(expr.key_condition.as_deref(), Some("#2 = :2"));
        assert_eq!(expr.projection.as_deref(), Some("#3"));
        assert_eq!(expr.update.as_deref(), Some("SET #4 = :3"));
    }

    #[test]
    fn test_empty_fragments_are_rejected() {
        assert!(matches!(
            ExpressionBuilder::new().with_update(Update::new()).build(),
            Err(Error::Expression(_))
        ));
        assert!(matches!(
            ExpressionBuilder::new()
                .with_condition(Condition::And(vec![]))
                .build(),
            Err(Error::Expression(_))
        ));
        assert!(matches!(
            ExpressionBuilder::new()
                .with_condition(Condition::is_in(name("a"), vec![]))
                .build(),
            Err(Error::Expression(_))
        ));
    }

    #[test]
    fn test_nothing_set() {
        let expr = ExpressionBuilder::new().build().unwrap();
        assert_eq!(expr, Expression::default());
    }
}
