//! Declarative projection from result rows to JSON objects.
//!
//! A [`RowMap`] lists `(column name, target type)` descriptors in result
//! order. Applying it to a row produces a JSON object whose keys are the
//! declared names and whose values are the column texts parsed to the
//! declared types. `NULL` is only legal in a column declared nullable.

use crate::error::ServiceError;
use anyhow::anyhow;
use serde_json::{Map, Value};

/// One result row, viewed as positional text columns.
///
/// The simple-query protocol returns every column in text form; `None`
/// is an SQL `NULL`.
pub trait SqlRow {
    fn column_text(&self, idx: usize) -> Result<Option<&str>, ServiceError>;
    fn width(&self) -> usize;
}

impl SqlRow for postgres::SimpleQueryRow {
    fn column_text(&self, idx: usize) -> Result<Option<&str>, ServiceError> {
        Ok(self.try_get(idx)?)
    }

    fn width(&self) -> usize {
        self.len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    BigInt,
    Float,
    Bool,
    Text,
}

/// A named, typed column descriptor.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    ty: ColumnType,
    nullable: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
            nullable: false,
        }
    }

    /// A column where SQL `NULL` maps to JSON null.
    pub fn nullable(name: impl Into<String>, ty: ColumnType) -> Self {
        Column {
            name: name.into(),
            ty,
            nullable: true,
        }
    }
}

/// Ordered column descriptors mapping one relation to JSON objects.
pub struct RowMap {
    columns: Vec<Column>,
}

impl RowMap {
    pub fn new(columns: Vec<Column>) -> Self {
        RowMap { columns }
    }

    /// Project a single row.
    pub fn convert_row<R: SqlRow>(&self, row: &R) -> Result<Map<String, Value>, ServiceError> {
        let mut obj = Map::new();
        for (idx, column) in self.columns.iter().enumerate() {
            let text = row.column_text(idx)?;
            let value = match text {
                None if column.nullable => Value::Null,
                None => {
                    return Err(ServiceError::Internal(anyhow!(
                        "unexpected null in column `{}`",
                        column.name
                    )))
                }
                Some(text) => parse_column(&column.name, column.ty, text)?,
            };
            obj.insert(column.name.clone(), value);
        }
        Ok(obj)
    }

    /// Project every row.
    pub fn convert_to_vector<R: SqlRow>(
        &self,
        rows: &[R],
    ) -> Result<Vec<Map<String, Value>>, ServiceError> {
        rows.iter().map(|row| self.convert_row(row)).collect()
    }

    /// Project zero rows to `None`, one row to `Some`, and fail beyond one.
    pub fn convert_to_optional<R: SqlRow>(
        &self,
        rows: &[R],
    ) -> Result<Option<Map<String, Value>>, ServiceError> {
        match rows {
            [] => Ok(None),
            [row] => Ok(Some(self.convert_row(row)?)),
            _ => Err(ServiceError::TooManyRows),
        }
    }
}

fn parse_column(name: &str, ty: ColumnType, text: &str) -> Result<Value, ServiceError> {
    let bad = |what: &str| ServiceError::Internal(anyhow!("column `{name}`: invalid {what}: {text}"));
    match ty {
        ColumnType::Int => text
            .parse::<i32>()
            .map(Value::from)
            .map_err(|_| bad("integer")),
        ColumnType::BigInt => text
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| bad("bigint")),
        ColumnType::Float => text
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| bad("float")),
        ColumnType::Bool => match text {
            "t" | "true" => Ok(Value::Bool(true)),
            "f" | "false" => Ok(Value::Bool(false)),
            _ => Err(bad("boolean")),
        },
        ColumnType::Text => Ok(Value::from(text)),
    }
}
