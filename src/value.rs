//! Bind values, entities and the parameter container handed to the binder.
//!
//! A [`Value`] is anything that can stand behind a named placeholder. Two
//! shapes are special: [`Value::List`] (expanded into one placeholder per
//! element by the template renderer) and [`Value::Entity`] (an ordered column
//! map produced from a type implementing [`Entity`]).

// used to bind values through the bundled executor
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

// used for date and time conversions
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

// ordered column and parameter maps
use indexmap::IndexMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use std::fmt;

use crate::error::{Result, TwinsqlaError};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"\A[a-zA-Z_][a-zA-Z0-9_]*\z").unwrap();
}

/// Checks that `name` is usable as a bare table identifier.
pub fn validate_table_name(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(TwinsqlaError::InvalidTableName {
            name: name.to_string(),
            pattern: IDENTIFIER.as_str().to_string(),
        })
    }
}

/// Checks that `name` is usable as a bare column identifier.
pub fn validate_column_name(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(TwinsqlaError::InvalidColumnName {
            name: name.to_string(),
            pattern: IDENTIFIER.as_str().to_string(),
        })
    }
}

// ------------- Value -------------
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    List(Vec<Value>),
    Entity(EntityValue),
}

impl Value {
    pub fn entity<E: Entity + ?Sized>(entity: &E) -> Self {
        Value::Entity(EntityValue::from_entity(entity))
    }
    pub fn entities<'e, E: Entity + 'e>(entities: impl IntoIterator<Item = &'e E>) -> Self {
        Value::List(entities.into_iter().map(|e| Value::entity(e)).collect())
    }
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
    /// Truthiness used by `/*%if */` directives.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::Blob(b) => !b.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Entity(_) => true,
        }
    }
    pub fn as_entity(&self) -> Option<&EntityValue> {
        match self {
            Value::Entity(e) => Some(e),
            _ => None,
        }
    }
    /// The entities carried by this value: one for an entity, all of them for
    /// a non-empty list made only of entities.
    pub fn as_entities(&self) -> Option<Vec<&EntityValue>> {
        match self {
            Value::Entity(e) => Some(vec![e]),
            Value::List(items) if !items.is_empty() => items.iter().map(Value::as_entity).collect(),
            _ => None,
        }
    }
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::List(_) => "list",
            Value::Entity(_) => "entity",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(items) => {
                let items: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "[{}]", items.join(", "))
            }
            Value::Entity(e) => write!(f, "{}", e),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self { Value::Bool(b) }
}
impl From<i32> for Value {
    fn from(i: i32) -> Self { Value::Integer(i64::from(i)) }
}
impl From<u32> for Value {
    fn from(i: u32) -> Self { Value::Integer(i64::from(i)) }
}
impl From<i64> for Value {
    fn from(i: i64) -> Self { Value::Integer(i) }
}
impl From<f64> for Value {
    fn from(r: f64) -> Self { Value::Real(r) }
}
impl From<&str> for Value {
    fn from(s: &str) -> Self { Value::Text(s.to_string()) }
}
impl From<String> for Value {
    fn from(s: String) -> Self { Value::Text(s) }
}
impl From<NaiveDate> for Value {
    fn from(d: NaiveDate) -> Self { Value::Text(d.format("%F").to_string()) }
}
impl From<NaiveDateTime> for Value {
    fn from(t: NaiveDateTime) -> Self { Value::Text(t.format("%F %T%.f").to_string()) }
}
impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self { Value::Text(t.to_rfc3339()) }
}
impl From<EntityValue> for Value {
    fn from(e: EntityValue) -> Self { Value::Entity(e) }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map_or(Value::Null, Into::into)
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Integer(i),
                None => n.as_f64().map_or(Value::Null, Value::Real),
            },
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(map) => Value::Entity(EntityValue::new(
                None,
                map.into_iter().map(|(k, v)| (k, Value::from(v))),
            )),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Integer(i) => serializer.serialize_i64(*i),
            Value::Real(r) => serializer.serialize_f64(*r),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Blob(b) => serializer.serialize_bytes(b),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Entity(e) => e.serialize(serializer),
        }
    }
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Integer(i) => ToSqlOutput::from(*i),
            Value::Real(r) => ToSqlOutput::from(*r),
            Value::Text(s) => ToSqlOutput::from(s.as_str()),
            Value::Blob(b) => ToSqlOutput::from(b.as_slice()),
            Value::List(_) | Value::Entity(_) => {
                return Err(rusqlite::Error::ToSqlConversionFailure(
                    format!("a {} value cannot be bound to a single placeholder", self.type_name()).into(),
                ));
            }
        })
    }
}

impl From<ValueRef<'_>> for Value {
    fn from(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::Integer(i),
            ValueRef::Real(r) => Value::Real(r),
            ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Value::Blob(b.to_vec()),
        }
    }
}

// ------------- Entity -------------

/// A value object whose fields map onto table columns.
///
/// `columns` lists every field in declaration order; fields holding
/// [`Value::Null`] are skipped when INSERT/UPDATE/DELETE statements are
/// synthesized. `table_name` is the fallback used when an operation does not
/// name its table explicitly.
pub trait Entity {
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn columns(&self) -> Vec<(&'static str, Value)>;
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityValue {
    table_name: Option<String>,
    columns: IndexMap<String, Value>,
}

impl EntityValue {
    pub fn new<K: Into<String>>(table_name: Option<String>, columns: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self {
            table_name,
            columns: columns.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
    pub fn from_entity<E: Entity + ?Sized>(entity: &E) -> Self {
        Self::new(entity.table_name().map(str::to_string), entity.columns())
    }
    pub fn table_name(&self) -> Option<&str> {
        self.table_name.as_deref()
    }
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(c, v)| (c.as_str(), v))
    }
    /// Columns holding a non-null value, in declaration order.
    pub fn present_columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns().filter(|(_, v)| !v.is_null())
    }
}

impl fmt::Display for EntityValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let columns: Vec<String> = self.columns().map(|(c, v)| format!("{}: {}", c, v)).collect();
        write!(f, "{}{{{}}}", self.table_name().unwrap_or(""), columns.join(", "))
    }
}

impl Serialize for EntityValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in &self.columns {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// ------------- Params -------------

/// Named bind parameters in call order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Params {
    entries: IndexMap<String, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self { entries: IndexMap::new() }
    }
    /// Inserts or replaces `name`, keeping its original position on replace.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(name.into(), value.into())
    }
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
    pub fn first(&self) -> Option<(&str, &Value)> {
        self.entries.first().map(|(n, v)| (n.as_str(), v))
    }
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }
    pub fn len(&self) -> usize {
        self.entries.len()
    }
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl TryFrom<serde_json::Value> for Params {
    type Error = TwinsqlaError;
    fn try_from(json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect()),
            other => Err(TwinsqlaError::Decode(format!("parameters must be a JSON object, got {}", other))),
        }
    }
}

impl Serialize for Params {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Builds a [`Params`] from `name => value` pairs.
///
/// ```
/// let params = twinsqla::bind_params! { "id" => 1, "name" => "alpha" };
/// assert_eq!(params.names().collect::<Vec<_>>(), vec!["id", "name"]);
/// ```
#[macro_export]
macro_rules! bind_params {
    () => { $crate::value::Params::new() };
    ($($name:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::value::Params::new();
        $( params.insert($name, $value); )+
        params
    }};
}
