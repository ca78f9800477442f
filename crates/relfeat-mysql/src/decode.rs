//! MySQL cell decoding into engine values

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use relfeat_core::SqlValue;
use sqlx::{
    decode::Decode,
    mysql::{MySql, MySqlRow, MySqlValueRef},
    Row, TypeInfo, ValueRef,
};

/// Decodes one cell by its reported column type.
pub fn decode_value(vr: MySqlValueRef<'_>) -> Result<SqlValue> {
    if vr.is_null() {
        return Ok(SqlValue::Null);
    }

    let owned = sqlx::ValueRef::to_owned(&vr);
    let tn = sqlx::Value::type_info(&owned).name().to_string();

    macro_rules! dec {
        ($t:ty) => {{
            <$t as Decode<'_, MySql>>::decode(sqlx::Value::as_ref(&owned)).map_err(|e| {
                anyhow!(
                    "decode {} as {} failed: {}",
                    tn,
                    std::any::type_name::<$t>(),
                    e
                )
            })
        }};
    }

    match tn.as_str() {
        "BOOLEAN" => Ok(SqlValue::Bool(dec!(bool)?)),
        "TINYINT" => Ok(SqlValue::Int(dec!(i8)? as i64)),
        "SMALLINT" => Ok(SqlValue::Int(dec!(i16)? as i64)),
        "INT" | "MEDIUMINT" => Ok(SqlValue::Int(dec!(i32)? as i64)),
        "BIGINT" => Ok(SqlValue::Int(dec!(i64)?)),
        "TINYINT UNSIGNED" => Ok(SqlValue::UInt(dec!(u8)? as u64)),
        "SMALLINT UNSIGNED" => Ok(SqlValue::UInt(dec!(u16)? as u64)),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => Ok(SqlValue::UInt(dec!(u32)? as u64)),
        "BIGINT UNSIGNED" => Ok(SqlValue::UInt(dec!(u64)?)),
        "YEAR" => Ok(SqlValue::Int(dec!(u16)? as i64)),
        "DOUBLE" => Ok(SqlValue::Float(dec!(f64)?)),
        "FLOAT" => Ok(SqlValue::Float(dec!(f32)? as f64)),

        // exact decimals stay textual; the primitive coercion parses them
        "DECIMAL" | "NUMERIC" => Ok(SqlValue::Text(dec!(String)?)),

        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" | "JSON" => {
            Ok(SqlValue::Text(dec!(String)?))
        }

        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "GEOMETRY" | "BIT" => {
            Ok(SqlValue::Bytes(dec!(Vec<u8>)?))
        }

        "DATE" => Ok(SqlValue::Date(dec!(NaiveDate)?)),
        "DATETIME" => Ok(SqlValue::DateTime(dec!(NaiveDateTime)?)),
        "TIMESTAMP" => Ok(SqlValue::DateTime(dec!(DateTime<Utc>)?.naive_utc())),
        "TIME" => Ok(SqlValue::Time(dec!(NaiveTime)?)),

        other => bail!("Unsupported MySQL type: {other}"),
    }
}

/// All cells of `row`, in select-list order.
pub fn decode_row(row: &MySqlRow) -> Result<Vec<SqlValue>> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            decode_value(raw).map_err(|e| anyhow!("column {}: {e}", i + 1))
        })
        .collect()
}
