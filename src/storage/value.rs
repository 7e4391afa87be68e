//! Dialect-neutral statement parameters and result rows.
//!
//! Application code binds [`Value`]s and reads [`Row`]s; each driver converts
//! them to and from its backend's native representation.

use crate::error::{Error, Result};
use bytes::BytesMut;
use rusqlite::types::{ToSqlOutput, ValueRef};
use tokio_postgres::types::{IsNull, ToSql as PgToSql, Type, to_sql_checked};

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Short type name used in conversion errors.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Text(_) => "text",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::Text(v.clone())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Build a `Vec<Value>` from heterogeneous expressions.
#[macro_export]
macro_rules! args {
    () => { ::std::vec::Vec::<$crate::storage::Value>::new() };
    ($($v:expr),+ $(,)?) => {
        vec![$($crate::storage::Value::from($v)),+]
    };
}

// ── SQLite conversion ─────────────────────────────────────────

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Self::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Self::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl TryFrom<ValueRef<'_>> for Value {
    type Error = Error;

    fn try_from(v: ValueRef<'_>) -> Result<Self> {
        Ok(match v {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(bytes) => Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(_) => return Err(Error::UnsupportedType("blob".to_string())),
        })
    }
}

// ── Postgres conversion ───────────────────────────────────────

// Parameter types are inferred by the server, so integers and text are
// narrowed or rendered to whatever the target column expects.
impl PgToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Integer(i) => {
                if *ty == Type::INT2 {
                    i16::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    i32::try_from(*i)?.to_sql(ty, out)
                } else if *ty == Type::BOOL {
                    (*i != 0).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    #[allow(clippy::cast_precision_loss)]
                    let f = *i as f64;
                    f.to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    i.to_string().to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Self::Real(f) => {
                if *ty == Type::FLOAT4 {
                    #[allow(clippy::cast_possible_truncation)]
                    let narrow = *f as f32;
                    narrow.to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Self::Text(s) => s.as_str().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

impl TryFrom<(&tokio_postgres::Row, usize)> for Value {
    type Error = Error;

    fn try_from((row, idx): (&tokio_postgres::Row, usize)) -> Result<Self> {
        let ty = row.columns()[idx].type_().clone();
        let value = if ty == Type::INT8 {
            row.try_get::<_, Option<i64>>(idx)?.map(Value::Integer)
        } else if ty == Type::INT4 {
            row.try_get::<_, Option<i32>>(idx)?.map(Value::from)
        } else if ty == Type::INT2 {
            row.try_get::<_, Option<i16>>(idx)?
                .map(|v| Value::Integer(i64::from(v)))
        } else if ty == Type::BOOL {
            row.try_get::<_, Option<bool>>(idx)?.map(Value::from)
        } else if ty == Type::FLOAT8 {
            row.try_get::<_, Option<f64>>(idx)?.map(Value::Real)
        } else if ty == Type::FLOAT4 {
            row.try_get::<_, Option<f32>>(idx)?
                .map(|v| Value::Real(f64::from(v)))
        } else if ty == Type::TEXT
            || ty == Type::VARCHAR
            || ty == Type::BPCHAR
            || ty == Type::NAME
        {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        } else {
            return Err(Error::UnsupportedType(ty.name().to_string()));
        };
        Ok(value.unwrap_or(Value::Null))
    }
}

// ── Rows ──────────────────────────────────────────────────────

/// Conversion from a [`Value`] into a Rust type.
pub trait FromValue: Sized {
    /// Convert, failing on a type mismatch.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedType` if the value has an incompatible type.
    fn from_value(value: &Value) -> Result<Self>;
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::UnsupportedType(format!("expected {expected}, found {}", value.type_name()))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            other => Err(mismatch("integer", other)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        i32::try_from(v).map_err(|_| Error::UnsupportedType(format!("{v} out of range for i32")))
    }
}

impl FromValue for u32 {
    fn from_value(value: &Value) -> Result<Self> {
        let v = i64::from_value(value)?;
        u32::try_from(v).map_err(|_| Error::UnsupportedType(format!("{v} out of range for u32")))
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        Ok(i64::from_value(value)? != 0)
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Real(f) => Ok(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Integer(i) => Ok(*i as f64),
            other => Err(mismatch("real", other)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            other => Err(mismatch("text", other)),
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

/// One result row, columns in select order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    values: Vec<Value>,
}

impl Row {
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Typed column access by zero-based index.
    ///
    /// # Errors
    ///
    /// Returns an error if the index is out of range or the type is incompatible.
    pub fn get<T: FromValue>(&self, idx: usize) -> Result<T> {
        let value = self
            .values
            .get(idx)
            .ok_or_else(|| Error::Other(format!("column index {idx} out of range")))?;
        T::from_value(value)
    }

    /// Text column that may be NULL, with NULL read as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the column is neither text nor NULL.
    pub fn get_string_or_default(&self, idx: usize) -> Result<String> {
        Ok(self.get::<Option<String>>(idx)?.unwrap_or_default())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
