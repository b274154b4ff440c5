//! Rows handed back by an executor and their decoding into declared types.
//!
//! The declared type decides the shape of a result:
//! * `Option<T>` is scalar: the first row decoded into `T`, `None` without rows.
//! * `Vec<T>` is a sequence: every row decoded into `T`, in row order.
//! * `()` discards whatever came back.
//!
//! `T` implements [`FromRow`]; [`Row`] itself does, so `Vec<Row>` always works.
//! A [`ResultType`] descriptor is computed once per declared type and kept by
//! the [`ResultTypeBuilder`], whose `decode` trims the rows to that shape
//! before handing them to the declared type.

use chrono::{NaiveDate, NaiveDateTime};
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{trace, warn};

use std::any::{TypeId, type_name};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::cache::SharedKeeper;
use crate::error::{Result, TwinsqlaError};
use crate::value::{EntityValue, Value};

// ------------- Row -------------

/// One result row: values in column order, sharing the column names with the
/// other rows of the same result.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn values(&self) -> &[Value] {
        &self.values
    }
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.iter().position(|c| c == column).and_then(|i| self.values.get(i))
    }
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
    /// Converts the value of `column`; a missing column is a decode error.
    pub fn get_as<T: FromValue>(&self, column: &str) -> Result<T> {
        let value = self
            .get(column)
            .ok_or_else(|| TwinsqlaError::Decode(format!("no column '{}' in row", column)))?;
        T::from_value(value).map_err(|e| match e {
            TwinsqlaError::Decode(message) => TwinsqlaError::Decode(format!("column '{}': {}", column, message)),
            other => other,
        })
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(String::as_str).zip(self.values.iter())
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for Row {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cells: Vec<String> = self.iter().map(|(c, v)| format!("{}: {}", c, v)).collect();
        write!(f, "{{{}}}", cells.join(", "))
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.iter() {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

// ------------- RowSet -------------

/// What an executor reports for one statement.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSet {
    returns_rows: bool,
    columns: Arc<[String]>,
    rows: Vec<Row>,
    rows_affected: usize,
}

impl RowSet {
    /// Result of a row-returning statement.
    pub fn with_rows(columns: Arc<[String]>, rows: Vec<Row>) -> Self {
        Self {
            returns_rows: true,
            columns,
            rows,
            rows_affected: 0,
        }
    }
    /// Result of a statement without a result set.
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            returns_rows: false,
            columns: Arc::from(Vec::<String>::new()),
            rows: Vec::new(),
            rows_affected,
        }
    }
    pub fn returns_rows(&self) -> bool {
        self.returns_rows
    }
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
    pub fn len(&self) -> usize {
        self.rows.len()
    }
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ------------- FromValue -------------
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(TwinsqlaError::Decode(format!(
        "expected {}, found {} value {}",
        expected,
        value.type_name(),
        value
    )))
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(value.clone())
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Bool(b) => Ok(i64::from(*b)),
            other => mismatch("integer", other),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let wide = i64::from_value(value)?;
        i32::try_from(wide).map_err(|_| TwinsqlaError::Decode(format!("integer {} out of range for i32", wide)))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Real(r) => Ok(*r),
            Value::Integer(i) => Ok(*i as f64),
            other => mismatch("real", other),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            Value::Integer(i) => Ok(*i != 0),
            other => mismatch("bool", other),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => mismatch("text", other),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.as_bytes().to_vec()),
            other => mismatch("blob", other),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => NaiveDate::parse_from_str(s, "%F")
                .map_err(|e| TwinsqlaError::Decode(format!("invalid date '{}': {}", s, e))),
            other => mismatch("date text", other),
        }
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => NaiveDateTime::parse_from_str(s, "%F %T%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%FT%T%.f"))
                .map_err(|e| TwinsqlaError::Decode(format!("invalid timestamp '{}': {}", s, e))),
            other => mismatch("timestamp text", other),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ------------- FromRow -------------

/// Construction of a declared element type from a row's column mapping.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(row.clone())
    }
}

impl FromRow for EntityValue {
    fn from_row(row: &Row) -> Result<Self> {
        Ok(EntityValue::new(None, row.iter().map(|(c, v)| (c, v.clone()))))
    }
}

impl FromRow for serde_json::Value {
    fn from_row(row: &Row) -> Result<Self> {
        serde_json::to_value(row).map_err(|e| TwinsqlaError::Decode(e.to_string()))
    }
}

// ------------- Decode -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    Scalar,
    Sequence,
    Discard,
}

/// A declared return type.
pub trait Decode: Sized + 'static {
    fn shape() -> Shape;
    /// Name of the element type rows are decoded into.
    fn element() -> &'static str;
    fn from_rows(rows: Vec<Row>) -> Result<Self>;
}

impl<T: FromRow + 'static> Decode for Option<T> {
    fn shape() -> Shape {
        Shape::Scalar
    }
    fn element() -> &'static str {
        type_name::<T>()
    }
    fn from_rows(rows: Vec<Row>) -> Result<Self> {
        rows.first().map(T::from_row).transpose()
    }
}

impl<T: FromRow + 'static> Decode for Vec<T> {
    fn shape() -> Shape {
        Shape::Sequence
    }
    fn element() -> &'static str {
        type_name::<T>()
    }
    fn from_rows(rows: Vec<Row>) -> Result<Self> {
        rows.iter().map(T::from_row).collect()
    }
}

impl Decode for () {
    fn shape() -> Shape {
        Shape::Discard
    }
    fn element() -> &'static str {
        "()"
    }
    fn from_rows(_: Vec<Row>) -> Result<Self> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultType {
    pub element: &'static str,
    pub shape: Shape,
}

impl ResultType {
    pub fn of<D: Decode>() -> Self {
        Self {
            element: D::element(),
            shape: D::shape(),
        }
    }
    pub fn is_sequence(&self) -> bool {
        self.shape == Shape::Sequence
    }
}

// ------------- ResultTypeBuilder -------------
#[derive(Debug)]
pub struct ResultTypeBuilder {
    types: SharedKeeper<TypeId, ResultType>,
}

impl ResultTypeBuilder {
    pub fn new(cache_size: Option<usize>) -> Self {
        Self {
            types: SharedKeeper::new(cache_size),
        }
    }
    pub fn result_type<D: Decode>(&self) -> Result<Arc<ResultType>> {
        let (result_type, cached) = self.types.get_or_try_keep(&TypeId::of::<D>(), || Ok(ResultType::of::<D>()))?;
        trace!(element = result_type.element, shape = ?result_type.shape, cached, "result type resolved");
        Ok(result_type)
    }
    /// Decodes `rows` as `D`, trimmed to what the cached shape admits: at
    /// most one row for a scalar and none when the result is discarded.
    pub fn decode<D: Decode>(&self, rows: RowSet) -> Result<D> {
        let result_type = self.result_type::<D>()?;
        let mut rows = rows.into_rows();
        match result_type.shape {
            Shape::Discard => rows.clear(),
            Shape::Scalar if rows.len() > 1 => {
                warn!(element = result_type.element, rows = rows.len(), "scalar result type got several rows, keeping the first");
                rows.truncate(1);
            }
            Shape::Scalar | Shape::Sequence => {}
        }
        D::from_rows(rows)
    }
    pub fn cached_types(&self) -> Result<usize> {
        self.types.len()
    }
}

// ------------- ResultIter -------------

/// Rows decoded one at a time, as they are pulled.
///
/// The rows themselves are already in memory (see [`crate::executor`]);
/// only decoding is deferred, so a decode error surfaces at the row that
/// caused it.
#[derive(Debug)]
pub struct ResultIter<T> {
    rows: std::vec::IntoIter<Row>,
    element: PhantomData<T>,
}

impl<T: FromRow> ResultIter<T> {
    pub fn new(rows: RowSet) -> Self {
        Self {
            rows: rows.into_rows().into_iter(),
            element: PhantomData,
        }
    }
}

impl<T: FromRow> Iterator for ResultIter<T> {
    type Item = Result<T>;
    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next().map(|row| T::from_row(&row))
    }
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.rows.size_hint()
    }
}
