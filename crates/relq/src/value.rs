//! Values accepted by the builder and rows returned by executors.
//!
//! Every datum a caller hands to relq is first converted into a [`Value`]. The only way a
//! `Value` reaches SQL text is through [`crate::encode`], so this closed set of variants is
//! exactly the set of things relq knows how to escape.

use crate::builder::Statement;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// A value computed when the statement is rendered.
#[derive(Clone)]
pub struct Deferred(Arc<dyn Fn() -> Value + Send + Sync>);

impl Deferred {
    pub fn new(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the thunk.
    pub fn get(&self) -> Value {
        (self.0)()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Deferred(..)")
    }
}

/// A SQL value.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    BigInt(i128),
    Float(f64),
    #[cfg(feature = "rust_decimal")]
    Decimal(rust_decimal::Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    DateTimeTz(DateTime<Utc>),
    Time(NaiveTime),
    Uuid(Uuid),
    Json(serde_json::Value),
    List(Vec<Value>),
    /// Thunk invoked at render time; its result is encoded in its place.
    Deferred(Deferred),
    /// A nested statement, rendered as a parenthesized sub-query.
    Query(Arc<dyn Statement>),
}

impl Value {
    /// Build a deferred value from a closure.
    pub fn deferred(f: impl Fn() -> Value + Send + Sync + 'static) -> Self {
        Self::Deferred(Deferred::new(f))
    }

    /// Wrap a statement as a sub-query value.
    pub fn query(statement: impl Statement + 'static) -> Self {
        Self::Query(Arc::new(statement))
    }

    /// Build a list value.
    pub fn list<T: Into<Value>>(items: impl IntoIterator<Item = T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric scalar (used to decide casts on extracted JSON text).
    pub fn is_numeric(&self) -> bool {
        match self {
            Self::Int(_) | Self::BigInt(_) | Self::Float(_) => true,
            #[cfg(feature = "rust_decimal")]
            Self::Decimal(_) => true,
            _ => false,
        }
    }

    /// Resolve deferred thunks until a concrete value is reached.
    pub fn materialize(&self) -> Value {
        match self {
            Self::Deferred(d) => d.get().materialize(),
            other => other.clone(),
        }
    }

    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Float(_) => "float",
            #[cfg(feature = "rust_decimal")]
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::DateTimeTz(_) => "datetimetz",
            Self::Time(_) => "time",
            Self::Uuid(_) => "uuid",
            Self::Json(_) => "json",
            Self::List(_) => "list",
            Self::Deferred(_) => "deferred",
            Self::Query(_) => "query",
        }
    }

    /// Borrow the text payload, if this is a text value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(v) => write!(f, "Bool({v})"),
            Self::Int(v) => write!(f, "Int({v})"),
            Self::BigInt(v) => write!(f, "BigInt({v})"),
            Self::Float(v) => write!(f, "Float({v})"),
            #[cfg(feature = "rust_decimal")]
            Self::Decimal(v) => write!(f, "Decimal({v})"),
            Self::Text(v) => write!(f, "Text({v:?})"),
            Self::Bytes(v) => write!(f, "Bytes({} bytes)", v.len()),
            Self::Date(v) => write!(f, "Date({v})"),
            Self::DateTime(v) => write!(f, "DateTime({v})"),
            Self::DateTimeTz(v) => write!(f, "DateTimeTz({v})"),
            Self::Time(v) => write!(f, "Time({v})"),
            Self::Uuid(v) => write!(f, "Uuid({v})"),
            Self::Json(v) => write!(f, "Json({v})"),
            Self::List(v) => f.debug_tuple("List").field(v).finish(),
            Self::Deferred(d) => d.fmt(f),
            Self::Query(q) => match q.statement() {
                Ok(sql) => write!(f, "Query({sql})"),
                Err(e) => write!(f, "Query(<{e}>)"),
            },
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(Value::BigInt(i128::from(v)), Value::Int)
    }
}

impl From<i128> for Value {
    fn from(v: i128) -> Self {
        Value::BigInt(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::DateTimeTz(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Value::Time(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

#[cfg(feature = "rust_decimal")]
impl From<rust_decimal::Decimal> for Value {
    fn from(v: rust_decimal::Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::list(v)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::list(v)
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Bool(v) => serializer.serialize_bool(*v),
            Self::Int(v) => serializer.serialize_i64(*v),
            Self::BigInt(v) => serializer.serialize_i128(*v),
            Self::Float(v) => serializer.serialize_f64(*v),
            #[cfg(feature = "rust_decimal")]
            Self::Decimal(v) => serializer.collect_str(v),
            Self::Text(v) => serializer.serialize_str(v),
            Self::Bytes(v) => serializer.serialize_bytes(v),
            Self::Date(v) => serializer.collect_str(v),
            Self::DateTime(v) => serializer.collect_str(v),
            Self::DateTimeTz(v) => serializer.serialize_str(&v.to_rfc3339()),
            Self::Time(v) => serializer.collect_str(v),
            Self::Uuid(v) => serializer.collect_str(v),
            Self::Json(v) => v.serialize(serializer),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Deferred(d) => d.get().serialize(serializer),
            Self::Query(_) => Err(serde::ser::Error::custom("cannot serialize a sub-query")),
        }
    }
}

/// An ordered row of named values.
///
/// Used both as input (rows for inserts and bulk writes) and as output (rows returned by
/// the executor, where every non-null cell is [`Value::Text`]).
#[derive(Debug, Clone, Default)]
pub struct Record {
    entries: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set `name`, replacing an existing entry in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Text cell, `None` for a missing column or SQL NULL.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(Value::as_str)
    }

    /// Parse a text cell with [`FromStr`].
    ///
    /// Returns `Ok(None)` for a missing column or SQL NULL.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, T::Err> {
        self.text(name).map(str::parse).transpose()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Build a [`Record`] from `name => value` pairs.
///
/// ```ignore
/// let row = record! { "id" => 1, "title" => "Dune" };
/// ```
#[macro_export]
macro_rules! record {
    () => { $crate::Record::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut record = $crate::Record::new();
        $(record.insert($name, $crate::Value::from($value));)+
        record
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_insert_replaces_in_place() {
        let mut r = Record::new().with("a", 1).with("b", 2);
        r.insert("a", 3);
        let keys: Vec<_> = r.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(matches!(r.get("a"), Some(Value::Int(3))));
    }

    #[test]
    fn record_parse_text_cells() {
        let r = crate::record! { "n" => "42", "missing" => Value::Null };
        assert_eq!(r.parse::<i32>("n").unwrap(), Some(42));
        assert_eq!(r.parse::<i32>("missing").unwrap(), None);
        assert!(r.parse::<i32>("nope").unwrap().is_none());
    }

    #[test]
    fn deferred_materializes_nested() {
        let v = Value::deferred(|| Value::deferred(|| Value::Int(7)));
        assert!(matches!(v.materialize(), Value::Int(7)));
    }

    #[test]
    fn u64_overflowing_i64_becomes_bigint() {
        assert!(matches!(Value::from(u64::MAX), Value::BigInt(_)));
        assert!(matches!(Value::from(5u64), Value::Int(5)));
    }

    #[test]
    fn record_serializes_as_json_object() {
        let r = crate::record! { "id" => 1, "name" => "x", "bio" => Option::<String>::None };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json, serde_json::json!({"id": 1, "name": "x", "bio": null}));
    }
}
