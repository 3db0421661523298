//! Positional SQL templating.
//!
//! A template is scanned once: every unescaped `?` consumes one parameter
//! and substitutes its quoted rendering, `??` emits a single literal `?`,
//! and everything else passes through verbatim. Renderings are inserted
//! after scanning decisions are made, so a `?` inside a quoted value is
//! never treated as a placeholder.

use crate::error::ServiceError;
use serde_json::Value;

/// A typed SQL parameter with a quoting rule.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// Quoted as an SQL identifier (`"name"`).
    Name(String),
    /// Quoted as an SQL string literal (`'text'`).
    Text(String),
    Bool(bool),
    Int(i64),
    Float(f64),
    Null,
    /// Rendered as `ARRAY[elem, elem, ...]`.
    List(Vec<SqlValue>),
    /// Dispatched on the JSON tag; objects and arrays are unsupported.
    Json(Value),
}

/// Shorthand for an identifier parameter.
pub fn name(s: impl Into<String>) -> SqlValue {
    SqlValue::Name(s.into())
}

impl From<&str> for SqlValue {
    fn from(s: &str) -> Self {
        SqlValue::Text(s.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(s: String) -> Self {
        SqlValue::Text(s)
    }
}

impl From<bool> for SqlValue {
    fn from(b: bool) -> Self {
        SqlValue::Bool(b)
    }
}

impl From<i32> for SqlValue {
    fn from(n: i32) -> Self {
        SqlValue::Int(n as i64)
    }
}

impl From<i64> for SqlValue {
    fn from(n: i64) -> Self {
        SqlValue::Int(n)
    }
}

impl From<f64> for SqlValue {
    fn from(f: f64) -> Self {
        SqlValue::Float(f)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => SqlValue::Null,
        }
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for SqlValue {
    fn from(items: Vec<T>) -> Self {
        SqlValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        SqlValue::Json(v)
    }
}

/// Quote an SQL identifier, doubling embedded double quotes.
pub fn quote_ident(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Quote an SQL string literal, doubling embedded single quotes.
pub fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl SqlValue {
    fn render(&self) -> Result<String, ServiceError> {
        match self {
            SqlValue::Name(s) => Ok(quote_ident(s)),
            SqlValue::Text(s) => Ok(quote_literal(s)),
            SqlValue::Bool(b) => Ok(if *b { "true" } else { "false" }.to_string()),
            SqlValue::Int(n) => Ok(n.to_string()),
            SqlValue::Float(f) => Ok(f.to_string()),
            SqlValue::Null => Ok("null".to_string()),
            SqlValue::List(items) => {
                let mut parts = Vec::with_capacity(items.len());
                for item in items {
                    parts.push(item.render()?);
                }
                Ok(format!("ARRAY[{}]", parts.join(", ")))
            }
            SqlValue::Json(v) => match v {
                Value::Null => SqlValue::Null.render(),
                Value::Bool(b) => SqlValue::Bool(*b).render(),
                Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        SqlValue::Int(i).render()
                    } else if let Some(u) = n.as_u64() {
                        Ok(u.to_string())
                    } else if let Some(f) = n.as_f64() {
                        SqlValue::Float(f).render()
                    } else {
                        Err(ServiceError::UnsupportedValue)
                    }
                }
                Value::String(s) => Ok(quote_literal(s)),
                Value::Array(_) | Value::Object(_) => Err(ServiceError::UnsupportedValue),
            },
        }
    }
}

/// Materialize a template against its positional parameters.
pub fn render_template(template: &str, params: &[SqlValue]) -> Result<String, ServiceError> {
    let mut query = String::with_capacity(template.len());
    let mut next = 0usize;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '?' {
            if chars.peek() == Some(&'?') {
                chars.next();
                query.push('?');
            } else {
                let param = params.get(next).ok_or(ServiceError::TooFewParams)?;
                query.push_str(&param.render()?);
                next += 1;
            }
        } else {
            query.push(c);
        }
    }
    if next != params.len() {
        return Err(ServiceError::TooManyParams);
    }
    Ok(query)
}
