//! Cell values read from a result row and the typed primitives built from them.
//!
//! `SqlValue` is what a cursor hands out for a single column; it is engine
//! agnostic and cheap to clone. `PrimitiveValue` pairs a non-null cell with
//! the schema primitive type it was decoded as.

use std::fmt;

use anyhow::{anyhow, bail, Error};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Coarse classification of values.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Bytes,
    Temporal,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            ValueKind::Null => "null",
            ValueKind::Bool => "bool",
            ValueKind::Number => "number",
            ValueKind::String => "string",
            ValueKind::Bytes => "bytes",
            ValueKind::Temporal => "temporal",
        })
    }
}

/// A single column value of a result row.
#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Time(NaiveTime),
}

impl SqlValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            SqlValue::Null => ValueKind::Null,
            SqlValue::Bool(_) => ValueKind::Bool,
            SqlValue::Int(_) | SqlValue::UInt(_) | SqlValue::Float(_) => ValueKind::Number,
            SqlValue::Text(_) => ValueKind::String,
            SqlValue::Bytes(_) => ValueKind::Bytes,
            SqlValue::Date(_) | SqlValue::DateTime(_) | SqlValue::Time(_) => ValueKind::Temporal,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            SqlValue::Bytes(b) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SqlValue::Text(s) => Some(s.as_bytes()),
            SqlValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SqlValue::Bool(b) => Some(*b),
            SqlValue::Int(n) => Some(*n != 0),
            SqlValue::UInt(n) => Some(*n != 0),
            SqlValue::Text(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Int(n) => Some(*n),
            SqlValue::UInt(n) => (*n <= i64::MAX as u64).then_some(*n as i64),
            SqlValue::Float(f) => (f.is_finite() && f.fract() == 0.0).then_some(*f as i64),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Float(f) => Some(*f),
            SqlValue::Int(n) => Some(*n as f64),
            SqlValue::UInt(n) => Some(*n as f64),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => v.fmt(f),
            SqlValue::Int(v) => v.fmt(f),
            SqlValue::UInt(v) => v.fmt(f),
            SqlValue::Float(v) => v.fmt(f),
            SqlValue::Text(s) => f.write_str(s),
            SqlValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            SqlValue::Date(d) => d.fmt(f),
            SqlValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%dT%H:%M:%S%.f")),
            SqlValue::Time(t) => t.fmt(f),
        }
    }
}

/* ----------------------- Equality across kinds ----------------------- */

impl PartialEq for SqlValue {
    fn eq(&self, other: &Self) -> bool {
        use SqlValue::*;
        match (self, other) {
            (Null, Null) => true,
            (Bool(a), Bool(b)) => a == b,
            (Text(a), Text(b)) => a == b,
            (Bytes(a), Bytes(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Float(_), _) | (_, Float(_)) => match (self.as_f64(), other.as_f64()) {
                (Some(a), Some(b)) if self.kind() == ValueKind::Number && other.kind() == ValueKind::Number => a == b,
                _ => false,
            },
            (Int(a), UInt(b)) | (UInt(b), Int(a)) => *a >= 0 && *a as u64 == *b,
            (Int(a), Int(b)) => a == b,
            (UInt(a), UInt(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(v as i64)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::UInt(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::UInt(v as u64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
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

impl From<Vec<u8>> for SqlValue {
    fn from(b: Vec<u8>) -> Self {
        SqlValue::Bytes(b)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(d: NaiveDate) -> Self {
        SqlValue::Date(d)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(dt: NaiveDateTime) -> Self {
        SqlValue::DateTime(dt)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Schema primitive types a column can be decoded as.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    #[default]
    String,
    Boolean,
    Integer,
    Decimal,
    Double,
    Date,
    DateTime,
    Time,
}

impl fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PrimitiveType::String => "string",
            PrimitiveType::Boolean => "boolean",
            PrimitiveType::Integer => "integer",
            PrimitiveType::Decimal => "decimal",
            PrimitiveType::Double => "double",
            PrimitiveType::Date => "date",
            PrimitiveType::DateTime => "dateTime",
            PrimitiveType::Time => "time",
        })
    }
}

/// A non-null value tagged with its primitive type.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimitiveValue {
    value: SqlValue,
    #[serde(rename = "type")]
    primitive_type: PrimitiveType,
}

impl PrimitiveValue {
    /// Coerce a cell into `ty`. `Null` is rejected: absent values never become primitives.
    pub fn coerce(value: SqlValue, ty: PrimitiveType) -> Result<Self, Error> {
        if value.is_null() {
            bail!("cannot build a {ty} primitive from NULL");
        }
        let value = match ty {
            PrimitiveType::String => match value {
                SqlValue::Text(_) => value,
                other => SqlValue::Text(other.to_string()),
            },
            PrimitiveType::Boolean => SqlValue::Bool(
                value
                    .as_bool()
                    .ok_or_else(|| anyhow!("cannot convert `{value}` to boolean"))?,
            ),
            PrimitiveType::Integer => match value {
                SqlValue::UInt(_) => value,
                other => SqlValue::Int(
                    other
                        .as_i64()
                        .ok_or_else(|| anyhow!("cannot convert `{other}` to integer"))?,
                ),
            },
            PrimitiveType::Decimal | PrimitiveType::Double => match value {
                // decimals arrive as text from most drivers; keep their exact digits
                SqlValue::Text(ref s) if ty == PrimitiveType::Decimal => {
                    s.trim()
                        .parse::<f64>()
                        .map_err(|_| anyhow!("cannot convert `{s}` to decimal"))?;
                    value
                }
                other => SqlValue::Float(
                    other
                        .as_f64()
                        .ok_or_else(|| anyhow!("cannot convert `{other}` to {ty}"))?,
                ),
            },
            PrimitiveType::Date => match value {
                SqlValue::Date(_) => value,
                SqlValue::DateTime(dt) => SqlValue::Date(dt.date()),
                other => SqlValue::Date(parse_text(&other, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok(), ty)?),
            },
            PrimitiveType::DateTime => match value {
                SqlValue::DateTime(_) => value,
                SqlValue::Date(d) => SqlValue::DateTime(d.and_time(NaiveTime::MIN)),
                other => SqlValue::DateTime(parse_text(
                    &other,
                    |s| {
                        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
                            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
                            .ok()
                    },
                    ty,
                )?),
            },
            PrimitiveType::Time => match value {
                SqlValue::Time(_) => value,
                SqlValue::DateTime(dt) => SqlValue::Time(dt.time()),
                other => SqlValue::Time(parse_text(&other, |s| NaiveTime::parse_from_str(s, "%H:%M:%S%.f").ok(), ty)?),
            },
        };
        Ok(Self {
            value,
            primitive_type: ty,
        })
    }

    pub fn string(s: impl Into<String>) -> Self {
        Self {
            value: SqlValue::Text(s.into()),
            primitive_type: PrimitiveType::String,
        }
    }

    pub fn boolean(b: bool) -> Self {
        Self {
            value: SqlValue::Bool(b),
            primitive_type: PrimitiveType::Boolean,
        }
    }

    pub fn integer(n: i64) -> Self {
        Self {
            value: SqlValue::Int(n),
            primitive_type: PrimitiveType::Integer,
        }
    }

    pub fn value(&self) -> &SqlValue {
        &self.value
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    /// `true` for boolean true and its textual/numeric spellings.
    pub fn is_true(&self) -> bool {
        self.value.as_bool() == Some(true)
    }
}

impl fmt::Display for PrimitiveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value.fmt(f)
    }
}

fn parse_text<T>(value: &SqlValue, parse: impl Fn(&str) -> Option<T>, ty: PrimitiveType) -> Result<T, Error> {
    value
        .as_str()
        .map(str::trim)
        .and_then(parse)
        .ok_or_else(|| anyhow!("cannot convert `{value}` to {ty}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_compare_across_representations() {
        assert_eq!(SqlValue::Int(7), SqlValue::UInt(7));
        assert_eq!(SqlValue::Float(7.0), SqlValue::Int(7));
        assert_ne!(SqlValue::Int(-1), SqlValue::UInt(u64::MAX));
        assert_ne!(SqlValue::Text("7".into()), SqlValue::Int(7));
    }

    #[test]
    fn coerce_integer_from_text() -> anyhow::Result<()> {
        let v = PrimitiveValue::coerce(SqlValue::from(" 42 "), PrimitiveType::Integer)?;
        assert_eq!(v.value(), &SqlValue::Int(42));
        assert_eq!(v.to_string(), "42");
        Ok(())
    }

    #[test]
    fn coerce_rejects_null_and_garbage() {
        assert!(PrimitiveValue::coerce(SqlValue::Null, PrimitiveType::String).is_err());
        assert!(PrimitiveValue::coerce(SqlValue::from("abc"), PrimitiveType::Integer).is_err());
        assert!(PrimitiveValue::coerce(SqlValue::from("maybe"), PrimitiveType::Boolean).is_err());
    }

    #[test]
    fn coerce_string_stringifies_numbers() -> anyhow::Result<()> {
        let v = PrimitiveValue::coerce(SqlValue::Int(12), PrimitiveType::String)?;
        assert_eq!(v.value(), &SqlValue::Text("12".into()));
        Ok(())
    }

    #[test]
    fn coerce_temporal_from_text() -> anyhow::Result<()> {
        let d = PrimitiveValue::coerce(SqlValue::from("2024-02-29"), PrimitiveType::Date)?;
        assert_eq!(d.to_string(), "2024-02-29");
        let dt = PrimitiveValue::coerce(SqlValue::from("2024-02-29 10:11:12"), PrimitiveType::DateTime)?;
        assert_eq!(dt.to_string(), "2024-02-29T10:11:12");
        Ok(())
    }

    #[test]
    fn nil_marker_spellings() {
        assert!(PrimitiveValue::boolean(true).is_true());
        assert!(PrimitiveValue::string("true").is_true());
        assert!(!PrimitiveValue::string("false").is_true());
        assert!(!PrimitiveValue::integer(0).is_true());
    }
}
