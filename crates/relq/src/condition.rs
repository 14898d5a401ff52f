//! Conditions for WHERE and HAVING clauses.
//!
//! A [`Condition`] is either a mapping of lookup keys to values, a boolean combination of
//! other conditions, or a trusted raw SQL fragment. Conditions are rendered against a
//! [`Resolver`], which turns lookup keys into column references and registers joins.
//!
//! # Example
//! ```ignore
//! use relq::{lookup, Condition};
//!
//! let adults = lookup! { "age__gte" => 18 };
//! let named = Condition::any([("name__startswith", "A"), ("name__startswith", "B")]);
//! let cond = adults & !named;
//! ```

use crate::encode::{encode_literal, encode_token};
use crate::error::{BuildError, BuildResult};
use crate::lookup::{Operator, escape_like};
use crate::resolve::{Resolved, Resolver};
use crate::value::Value;
use std::ops::{BitAnd, BitOr, Not};

/// How the members of a group are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Logic {
    And,
    Or,
}

impl Logic {
    fn keyword(self) -> &'static str {
        match self {
            Self::And => " AND ",
            Self::Or => " OR ",
        }
    }
}

/// A WHERE/HAVING condition.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Lookup key/value pairs combined with one connective.
    Lookups {
        pairs: Vec<(String, Value)>,
        logic: Logic,
    },
    /// Two conditions combined with a connective.
    Binary {
        logic: Logic,
        lhs: Box<Condition>,
        rhs: Box<Condition>,
    },
    /// Negation.
    Not(Box<Condition>),
    /// Trusted SQL fragment, inserted as-is.
    Raw(String),
}

impl Condition {
    /// All pairs must hold.
    pub fn all<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Lookups {
            pairs: collect_pairs(pairs),
            logic: Logic::And,
        }
    }

    /// Any pair may hold.
    pub fn any<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Lookups {
            pairs: collect_pairs(pairs),
            logic: Logic::Or,
        }
    }

    /// A single lookup.
    pub fn lookup(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lookups {
            pairs: vec![(key.into(), value.into())],
            logic: Logic::And,
        }
    }

    /// Trusted raw SQL. Never pass user input here.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self::Raw(sql.into())
    }

    pub fn and(self, other: Condition) -> Self {
        Self::Binary {
            logic: Logic::And,
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    pub fn or(self, other: Condition) -> Self {
        Self::Binary {
            logic: Logic::Or,
            lhs: Box::new(self),
            rhs: Box::new(other),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Render to SQL, resolving lookup keys through `resolver`.
    pub fn render(&self, resolver: &mut Resolver<'_>) -> BuildResult<String> {
        match self {
            Self::Lookups { pairs, logic } => {
                if pairs.is_empty() {
                    return Ok(match logic {
                        Logic::And => "TRUE".to_string(),
                        Logic::Or => "FALSE".to_string(),
                    });
                }
                let mut parts = Vec::with_capacity(pairs.len());
                for (key, value) in pairs {
                    let resolved = resolver.resolve(key)?;
                    parts.push(render_lookup(&resolved, value, key)?);
                }
                if parts.len() == 1 {
                    return Ok(parts.remove(0));
                }
                Ok(parts
                    .iter()
                    .map(|p| format!("({p})"))
                    .collect::<Vec<_>>()
                    .join(logic.keyword()))
            }
            Self::Binary { logic, lhs, rhs } => {
                let l = lhs.render(resolver)?;
                let r = rhs.render(resolver)?;
                Ok(format!("({l}){}({r})", logic.keyword()))
            }
            Self::Not(inner) => Ok(format!("NOT ({})", inner.render(resolver)?)),
            Self::Raw(sql) => Ok(sql.clone()),
        }
    }
}

fn collect_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Vec<(String, Value)>
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        self.and(rhs)
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        self.or(rhs)
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

/// Build an AND [`Condition`] from `key => value` pairs.
///
/// ```ignore
/// let cond = lookup! { "age__gt" => 18, "name__contains" => "o'" };
/// ```
#[macro_export]
macro_rules! lookup {
    () => {
        $crate::Condition::all(::std::iter::empty::<(String, $crate::Value)>())
    };
    ($($key:expr => $value:expr),+ $(,)?) => {
        $crate::Condition::Lookups {
            pairs: vec![$((::std::string::String::from($key), $crate::Value::from($value))),+],
            logic: $crate::Logic::And,
        }
    };
}

/// Cast applied to extracted JSON text so it compares with a typed value.
fn json_cast(value: &Value) -> &'static str {
    match value {
        Value::Bool(_) => "::boolean",
        Value::List(items) => items.first().map_or("", json_cast),
        v if v.is_numeric() => "::numeric",
        _ => "",
    }
}

/// Operators whose right-hand value is compared as-typed; the rest match on text.
fn casts_json_text(op: Operator) -> bool {
    matches!(
        op,
        Operator::Eq
            | Operator::Ne
            | Operator::Lt
            | Operator::Lte
            | Operator::Gt
            | Operator::Gte
            | Operator::In
            | Operator::NotIn
            | Operator::Range
    )
}

/// Left-hand side for a resolved lookup compared against `value`.
fn target(resolved: &Resolved, value: &Value) -> String {
    match &resolved.json_keys {
        Some(keys) if !keys.is_empty() => {
            if resolved.op.is_json_native() || matches!(value, Value::Json(_)) {
                resolved.json_value()
            } else if !casts_json_text(resolved.op) {
                resolved.json_text()
            } else {
                match json_cast(value) {
                    "" => resolved.json_text(),
                    cast => format!("({}){cast}", resolved.json_text()),
                }
            }
        }
        _ => resolved.column.clone(),
    }
}

fn render_lookup(resolved: &Resolved, value: &Value, key: &str) -> BuildResult<String> {
    let value = value.materialize();
    let is_json = resolved.json_keys.is_some();
    let col = target(resolved, &value);

    let sql = match resolved.op {
        Operator::Eq if value.is_null() => format!("{col} IS NULL"),
        Operator::Ne if value.is_null() => format!("{col} IS NOT NULL"),
        Operator::Eq if is_json && matches!(value, Value::Json(_)) => {
            format!("{col} = {}::jsonb", encode_literal(&value)?)
        }
        Operator::Eq => format!("{col} = {}", encode_literal(&value)?),
        Operator::Ne => format!("{col} <> {}", encode_literal(&value)?),
        Operator::Lt => format!("{col} < {}", encode_literal(&value)?),
        Operator::Lte => format!("{col} <= {}", encode_literal(&value)?),
        Operator::Gt => format!("{col} > {}", encode_literal(&value)?),
        Operator::Gte => format!("{col} >= {}", encode_literal(&value)?),
        Operator::In => format!("{col} IN {}", in_list(&value, key)?),
        Operator::NotIn => format!("{col} NOT IN {}", in_list(&value, key)?),
        Operator::Contains if is_json => format!("{col} @> {}::jsonb", json_literal(&value)?),
        Operator::ContainedBy => format!("{col} <@ {}::jsonb", json_literal(&value)?),
        Operator::Contains
        | Operator::IContains
        | Operator::StartsWith
        | Operator::IStartsWith
        | Operator::EndsWith
        | Operator::IEndsWith => like(&col, resolved.op, &value)?,
        Operator::Range => match &value {
            Value::List(bounds) if bounds.len() == 2 => format!(
                "{col} BETWEEN {} AND {}",
                encode_literal(&bounds[0])?,
                encode_literal(&bounds[1])?
            ),
            _ => {
                return Err(BuildError::invalid(format!(
                    "'{key}' requires exactly two values"
                )));
            }
        },
        // Date parts are folded into the column by the resolver.
        Operator::Year | Operator::Month | Operator::Day => {
            format!("{col} = {}", encode_literal(&value)?)
        }
        Operator::IsNull => match value {
            Value::Bool(true) => format!("{col} IS NULL"),
            Value::Bool(false) => format!("{col} IS NOT NULL"),
            _ => {
                return Err(BuildError::invalid(format!("'{key}' requires a boolean")));
            }
        },
        Operator::Regex => format!("{col} ~ {}", encode_literal(&value)?),
        Operator::IRegex => format!("{col} ~* {}", encode_literal(&value)?),
        Operator::HasKey => format!("{col} ? {}", encode_literal(&key_text(&value)?)?),
        Operator::HasKeys => format!("{col} ?& {}", key_array(&value, key)?),
        Operator::HasAnyKeys => format!("{col} ?| {}", key_array(&value, key)?),
    };
    Ok(sql)
}

/// `(a, b)` or `(SELECT ...)`; a scalar becomes a one-element list.
fn in_list(value: &Value, key: &str) -> BuildResult<String> {
    match value {
        Value::List(items) if items.is_empty() => Err(BuildError::EmptyList(key.to_string())),
        Value::List(_) | Value::Query(_) => encode_literal(value),
        scalar => Ok(format!("({})", encode_literal(scalar)?)),
    }
}

fn like(col: &str, op: Operator, value: &Value) -> BuildResult<String> {
    let Some((insensitive, leading, trailing)) = op.like_shape() else {
        return Err(BuildError::invalid(format!("{op} is not a pattern operator")));
    };
    let mut pattern = String::new();
    if leading {
        pattern.push('%');
    }
    pattern.push_str(&escape_like(&encode_token(value)?));
    if trailing {
        pattern.push('%');
    }
    let keyword = if insensitive { "ILIKE" } else { "LIKE" };
    Ok(format!("{col} {keyword} {}", encode_literal(&Value::Text(pattern))?))
}

/// Containment operands are JSON; plain strings are taken as JSON text.
fn json_literal(value: &Value) -> BuildResult<String> {
    match value {
        Value::Text(_) | Value::Json(_) => encode_literal(value),
        other => encode_literal(&Value::Json(serde_json::to_value(other).map_err(|e| {
            BuildError::invalid(format!("cannot convert value to JSON: {e}"))
        })?)),
    }
}

fn key_text(value: &Value) -> BuildResult<Value> {
    Ok(Value::Text(encode_token(value)?))
}

fn key_array(value: &Value, key: &str) -> BuildResult<String> {
    let items = match value {
        Value::List(items) if items.is_empty() => {
            return Err(BuildError::EmptyList(key.to_string()));
        }
        Value::List(items) => items.clone(),
        scalar => vec![scalar.clone()],
    };
    let mut out = Vec::with_capacity(items.len());
    for item in &items {
        out.push(encode_literal(&key_text(&item.materialize())?)?);
    }
    Ok(format!("ARRAY[{}]", out.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join::JoinRegistry;
    use crate::test_support::library;

    fn render_on(table: &str, cond: &Condition) -> BuildResult<String> {
        let schema = library();
        let model = schema.model(table).unwrap().clone();
        let mut joins = JoinRegistry::new();
        let mut resolver = Resolver::new(&schema, &model, table, &mut joins, &[]);
        cond.render(&mut resolver)
    }

    #[test]
    fn single_pair_is_bare() {
        let sql = render_on("author", &lookup! { "age__gt" => 18 }).unwrap();
        assert_eq!(sql, "author.age > 18");
    }

    #[test]
    fn multiple_pairs_are_parenthesized() {
        let cond = lookup! { "age__gt" => 18, "name__contains" => "o'" };
        assert_eq!(
            render_on("author", &cond).unwrap(),
            "(author.age > 18) AND (author.name LIKE '%o''%')"
        );
    }

    #[test]
    fn like_escapes_wildcards() {
        let cond = lookup! { "name__istartswith" => "50%_" };
        assert_eq!(
            render_on("author", &cond).unwrap(),
            r"author.name ILIKE '50\%\_%'"
        );
    }

    #[test]
    fn null_comparisons() {
        assert_eq!(
            render_on("author", &lookup! { "bio" => Value::Null }).unwrap(),
            "author.bio IS NULL"
        );
        assert_eq!(
            render_on("author", &lookup! { "bio__ne" => Value::Null }).unwrap(),
            "author.bio IS NOT NULL"
        );
        assert_eq!(
            render_on("author", &lookup! { "bio__isnull" => false }).unwrap(),
            "author.bio IS NOT NULL"
        );
        assert!(render_on("author", &lookup! { "bio__isnull" => 1 }).is_err());
    }

    #[test]
    fn in_and_range() {
        assert_eq!(
            render_on("author", &lookup! { "id__in" => vec![1, 2, 3] }).unwrap(),
            "author.id IN (1, 2, 3)"
        );
        assert_eq!(
            render_on("author", &lookup! { "id__notin" => 7 }).unwrap(),
            "author.id NOT IN (7)"
        );
        assert_eq!(
            render_on("author", &lookup! { "age__range" => [18, 65] }).unwrap(),
            "author.age BETWEEN 18 AND 65"
        );
        assert!(render_on("author", &lookup! { "age__range" => [1] }).is_err());
        assert!(matches!(
            render_on("author", &lookup! { "id__in" => Vec::<i32>::new() }),
            Err(BuildError::EmptyList(_))
        ));
    }

    #[test]
    fn empty_groups() {
        let any: Condition = Condition::any(std::iter::empty::<(String, Value)>());
        assert_eq!(render_on("author", &lookup! {}).unwrap(), "TRUE");
        assert_eq!(render_on("author", &any).unwrap(), "FALSE");
    }

    #[test]
    fn trees() {
        let cond = lookup! { "age__gte" => 18 } & !Condition::any([("name", "a"), ("name", "b")]);
        assert_eq!(
            render_on("author", &cond).unwrap(),
            "(author.age >= 18) AND (NOT ((author.name = 'a') OR (author.name = 'b')))"
        );
    }

    #[test]
    fn date_part_comparison() {
        let cond = lookup! { "published__year__gte" => 2000 };
        assert_eq!(
            render_on("book", &cond).unwrap(),
            "EXTRACT(YEAR FROM book.published) >= 2000"
        );
    }

    #[test]
    fn regex_operators() {
        assert_eq!(
            render_on("author", &lookup! { "name__iregex" => "^a.*" }).unwrap(),
            "author.name ~* '^a.*'"
        );
    }

    #[test]
    fn json_operators() {
        assert_eq!(
            render_on("author", &lookup! { "profile__has_key" => "twitter" }).unwrap(),
            "author.profile ? 'twitter'"
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__has_keys" => ["a", "b"] }).unwrap(),
            "author.profile ?& ARRAY['a', 'b']"
        );
        assert_eq!(
            render_on(
                "author",
                &lookup! { "profile__contains" => serde_json::json!({"lang": "en"}) }
            )
            .unwrap(),
            r#"author.profile @> '{"lang":"en"}'::jsonb"#
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__address__zip__gt" => 1000 }).unwrap(),
            "(author.profile -> 'address' ->> 'zip')::numeric > 1000"
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__address__city" => "Oslo" }).unwrap(),
            "author.profile -> 'address' ->> 'city' = 'Oslo'"
        );
    }

    #[test]
    fn json_text_is_uncast_for_null_and_pattern_checks() {
        assert_eq!(
            render_on("author", &lookup! { "profile__address__city__isnull" => true }).unwrap(),
            "author.profile -> 'address' ->> 'city' IS NULL"
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__code__startswith" => 12 }).unwrap(),
            "author.profile ->> 'code' LIKE '12%'"
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__code__regex" => "^[0-9]+$" }).unwrap(),
            "author.profile ->> 'code' ~ '^[0-9]+$'"
        );
        assert_eq!(
            render_on("author", &lookup! { "profile__score__in" => [1, 2] }).unwrap(),
            "(author.profile ->> 'score')::numeric IN (1, 2)"
        );
    }

    #[test]
    fn sub_query_values() {
        let cond = lookup! { "id__in" => Value::query(crate::builder::RawStatement::new("SELECT 1")) };
        assert_eq!(render_on("author", &cond).unwrap(), "author.id IN (SELECT 1)");
    }

    #[test]
    fn raw_is_verbatim() {
        assert_eq!(
            render_on("author", &Condition::raw("age % 2 = 0")).unwrap(),
            "age % 2 = 0"
        );
    }
}
