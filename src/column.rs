//! Column type descriptors: SQL definition fragments, typed extraction from rows, write-side coercion.
//!
//! The set of types is open. `ColumnTypeRegistry` maps logical type names used in schema
//! declarations to descriptors; register additional `ColumnType` impls to extend it.

use crate::sql::{quoted, Value, DATE_FORMAT};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// `"name" TYPE` fragment shared by all descriptors.
pub fn column_def(column: &str, sql_type: &str) -> String {
    format!("{} {}", quoted(column), sql_type)
}

pub trait ColumnType: Send + Sync + fmt::Debug {
    /// Logical name used in schema declarations (e.g. "text").
    fn type_name(&self) -> &str;

    /// Storage type emitted in DDL.
    fn sql_type(&self) -> &str;

    fn to_create_column(&self, column: &str) -> String {
        column_def(column, self.sql_type())
    }

    /// Read the cell at a zero-based index. NULL yields `Value::Null`.
    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error>;

    /// Check a value for writing, normalizing lossless conversions. `None` means the type does not fit.
    fn coerce(&self, value: Value) -> Option<Value>;

    /// Parse textual input (query strings).
    fn parse(&self, text: &str) -> Option<Value> {
        self.coerce(Value::Text(text.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct BlobColumn;

impl ColumnType for BlobColumn {
    fn type_name(&self) -> &str {
        "blob"
    }

    fn sql_type(&self) -> &str {
        "BLOB"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        Ok(row.try_get::<Option<Vec<u8>>, _>(index)?.into())
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Blob(_) => Some(value),
            _ => None,
        }
    }

    fn parse(&self, _text: &str) -> Option<Value> {
        None
    }
}

#[derive(Debug, Default)]
pub struct DoubleColumn;

impl ColumnType for DoubleColumn {
    fn type_name(&self) -> &str {
        "double"
    }

    fn sql_type(&self) -> &str {
        "DOUBLE"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        Ok(row.try_get::<Option<f64>, _>(index)?.into())
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Real(_) => Some(value),
            Value::Integer(n) => Some(Value::Real(n as f64)),
            _ => None,
        }
    }

    fn parse(&self, text: &str) -> Option<Value> {
        text.parse::<f64>().ok().map(Value::Real)
    }
}

#[derive(Debug, Default)]
pub struct IntegerColumn;

impl ColumnType for IntegerColumn {
    fn type_name(&self) -> &str {
        "integer"
    }

    fn sql_type(&self) -> &str {
        "INTEGER"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        Ok(row.try_get::<Option<i64>, _>(index)?.into())
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Integer(_) => Some(value),
            _ => None,
        }
    }

    fn parse(&self, text: &str) -> Option<Value> {
        text.parse::<i64>().ok().map(Value::Integer)
    }
}

#[derive(Debug, Default)]
pub struct TextColumn;

impl ColumnType for TextColumn {
    fn type_name(&self) -> &str {
        "text"
    }

    fn sql_type(&self) -> &str {
        "TEXT"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        Ok(row.try_get::<Option<String>, _>(index)?.into())
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Text(_) => Some(value),
            _ => None,
        }
    }
}

/// Stored as 0/1.
#[derive(Debug, Default)]
pub struct BooleanColumn;

impl ColumnType for BooleanColumn {
    fn type_name(&self) -> &str {
        "boolean"
    }

    fn sql_type(&self) -> &str {
        "BOOLEAN"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        Ok(row.try_get::<Option<i64>, _>(index)?.map(|n| n != 0).into())
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Bool(_) => Some(value),
            Value::Integer(0) => Some(Value::Bool(false)),
            Value::Integer(1) => Some(Value::Bool(true)),
            _ => None,
        }
    }

    fn parse(&self, text: &str) -> Option<Value> {
        match text {
            t if t.eq_ignore_ascii_case("true") || t == "1" => Some(Value::Bool(true)),
            t if t.eq_ignore_ascii_case("false") || t == "0" => Some(Value::Bool(false)),
            _ => None,
        }
    }
}

/// Calendar date, stored as `YYYY-MM-DD` text.
#[derive(Debug, Default)]
pub struct DateColumn;

impl ColumnType for DateColumn {
    fn type_name(&self) -> &str {
        "date"
    }

    fn sql_type(&self) -> &str {
        "DATE"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        let Some(s) = row.try_get::<Option<String>, _>(index)? else {
            return Ok(Value::Null);
        };
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map(Value::Date)
            .map_err(|e| sqlx::Error::ColumnDecode {
                index: index.to_string(),
                source: Box::new(e),
            })
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Date(_) => Some(value),
            Value::Text(s) => NaiveDate::parse_from_str(&s, DATE_FORMAT).ok().map(Value::Date),
            _ => None,
        }
    }
}

/// Instant in UTC, stored as integer milliseconds since the epoch.
#[derive(Debug, Default)]
pub struct TimestampColumn;

impl ColumnType for TimestampColumn {
    fn type_name(&self) -> &str {
        "timestamp"
    }

    fn sql_type(&self) -> &str {
        "INTEGER"
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        let Some(ms) = row.try_get::<Option<i64>, _>(index)? else {
            return Ok(Value::Null);
        };
        DateTime::<Utc>::from_timestamp_millis(ms)
            .map(Value::Timestamp)
            .ok_or_else(|| sqlx::Error::ColumnDecode {
                index: index.to_string(),
                source: format!("timestamp out of range: {}", ms).into(),
            })
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        match value {
            Value::Null | Value::Timestamp(_) => Some(value),
            Value::Integer(ms) => DateTime::<Utc>::from_timestamp_millis(ms).map(Value::Timestamp),
            Value::Text(s) => DateTime::parse_from_rfc3339(&s)
                .ok()
                .map(|t| Value::Timestamp(t.with_timezone(&Utc))),
            _ => None,
        }
    }
}

/// Integer column pointing at another table's `_id`.
#[derive(Debug)]
pub struct ReferenceColumn {
    table: String,
    on_delete: Option<String>,
}

impl ReferenceColumn {
    pub fn new(table: impl Into<String>, on_delete: Option<String>) -> Self {
        Self {
            table: table.into(),
            on_delete,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

impl ColumnType for ReferenceColumn {
    fn type_name(&self) -> &str {
        "reference"
    }

    fn sql_type(&self) -> &str {
        "INTEGER"
    }

    fn to_create_column(&self, column: &str) -> String {
        let mut def = format!(
            "{} REFERENCES {} ({})",
            column_def(column, self.sql_type()),
            quoted(&self.table),
            quoted(crate::config::ID_COLUMN)
        );
        if let Some(action) = &self.on_delete {
            def.push_str(" ON DELETE ");
            def.push_str(action);
        }
        def
    }

    fn get(&self, row: &SqliteRow, index: usize) -> Result<Value, sqlx::Error> {
        IntegerColumn.get(row, index)
    }

    fn coerce(&self, value: Value) -> Option<Value> {
        IntegerColumn.coerce(value)
    }

    fn parse(&self, text: &str) -> Option<Value> {
        IntegerColumn.parse(text)
    }
}

/// Logical type name -> descriptor. Built once before resolving a schema.
#[derive(Clone, Debug)]
pub struct ColumnTypeRegistry {
    by_name: HashMap<String, Arc<dyn ColumnType>>,
}

impl ColumnTypeRegistry {
    pub fn empty() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut r = Self::empty();
        let text: Arc<dyn ColumnType> = Arc::new(TextColumn);
        let double: Arc<dyn ColumnType> = Arc::new(DoubleColumn);
        r.register("blob", Arc::new(BlobColumn));
        r.register("double", double.clone());
        r.register("real", double);
        r.register("integer", Arc::new(IntegerColumn));
        r.register("text", text.clone());
        r.register("string", text);
        r.register("boolean", Arc::new(BooleanColumn));
        r.register("date", Arc::new(DateColumn));
        r.register("timestamp", Arc::new(TimestampColumn));
        r
    }

    /// Names are case-insensitive.
    pub fn register(&mut self, name: &str, column_type: Arc<dyn ColumnType>) {
        self.by_name.insert(name.to_lowercase(), column_type);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ColumnType>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }
}

impl Default for ColumnTypeRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
