//! Conversions between query values and SQLite values

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::Connection;
use serde_json::{json, Number, Value};
use std::collections::HashSet;
use std::sync::Arc;

use hierarchy_core::features::query::QueryBinding;

use crate::error::{Result, StorageError};

/// Name of the id-set membership function used by filtering restrictions
pub const IN_VIRTUAL_SET: &str = "InVirtualSet";

/// SQLite parameter for a positional binding
///
/// Numeric ids bind as integers so they compare equal to `INTEGER` columns;
/// id sets and points bind as JSON text.
pub fn to_sql_value(binding: &QueryBinding) -> Result<SqlValue> {
    Ok(match binding {
        QueryBinding::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        QueryBinding::Integer(i) => SqlValue::Integer(*i),
        QueryBinding::Double(d) if d.is_finite() => SqlValue::Real(*d),
        QueryBinding::Double(d) => {
            return Err(StorageError::binding(format!("{} can't be bound", d)));
        }
        QueryBinding::Id(id) => match id.parse::<i64>() {
            Ok(numeric) => SqlValue::Integer(numeric),
            Err(_) => SqlValue::Text(id.clone()),
        },
        QueryBinding::IdSet(ids) => SqlValue::Text(serde_json::to_string(ids)?),
        QueryBinding::String(s) => SqlValue::Text(s.clone()),
        QueryBinding::Point2d { x, y } => SqlValue::Text(json!({ "x": x, "y": y }).to_string()),
        QueryBinding::Point3d { x, y, z } => {
            SqlValue::Text(json!({ "x": x, "y": y, "z": z }).to_string())
        }
    })
}

/// JSON view of a column value
pub fn to_json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Number(i.into()),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    }
}

fn id_text(value: ValueRef<'_>) -> Option<String> {
    match value {
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    }
}

fn in_virtual_set(ctx: &Context<'_>) -> rusqlite::Result<bool> {
    // parsed once per statement
    let set: Arc<HashSet<String>> = ctx.get_or_create_aux(0, |raw| -> Result<HashSet<String>> {
        let text = raw.as_str().map_err(|e| StorageError::binding(e.to_string()))?;
        Ok(serde_json::from_str(text)?)
    })?;
    Ok(id_text(ctx.get_raw(1)).is_some_and(|id| set.contains(&id)))
}

/// Register `InVirtualSet(json_id_array, id)` on a connection
pub fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        IN_VIRTUAL_SET,
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        in_virtual_set,
    )?;
    Ok(())
}
