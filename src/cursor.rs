//! Forward-only cursor over buffered result rows.

use crate::config::ResolvedColumn;
use crate::error::AppError;
use crate::sql::Value;
use sqlx::sqlite::SqliteRow;
use std::collections::BTreeMap;

/// One row keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// Rows decoded through the projection's column descriptors.
///
/// Starts before the first row; `move_to_next` advances. Rows are released on `close` or drop.
#[derive(Debug, Default)]
pub struct Cursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    position: Option<usize>,
    closed: bool,
}

impl Cursor {
    pub(crate) fn from_rows(columns: &[&ResolvedColumn], rows: &[SqliteRow]) -> Result<Self, AppError> {
        let mut decoded = Vec::with_capacity(rows.len());
        for row in rows {
            let mut cells = Vec::with_capacity(columns.len());
            for (i, c) in columns.iter().enumerate() {
                cells.push(c.column_type.get(row, i)?);
            }
            decoded.push(cells);
        }
        Ok(Cursor {
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            rows: decoded,
            position: None,
            closed: false,
        })
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Advance to the next row. Returns false once past the last row or after `close`.
    pub fn move_to_next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let next = self.position.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.position = Some(next);
            true
        } else {
            self.position = Some(self.rows.len());
            false
        }
    }

    /// Cell at a zero-based column index in the current row.
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.current().and_then(|row| row.get(index))
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.column_index(name).and_then(|i| self.get(i))
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Release the buffered rows.
    pub fn close(&mut self) {
        self.rows = Vec::new();
        self.position = None;
        self.closed = true;
    }

    /// Consume into name-keyed rows (all of them, regardless of position).
    pub fn into_records(self) -> Vec<Record> {
        let Cursor { columns, rows, .. } = self;
        rows.into_iter()
            .map(|cells| columns.iter().cloned().zip(cells).collect())
            .collect()
    }

    fn current(&self) -> Option<&Vec<Value>> {
        self.position.and_then(|p| self.rows.get(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cursor() -> Cursor {
        Cursor {
            columns: vec!["_id".into(), "subject".into()],
            rows: vec![
                vec![Value::Integer(1), Value::Text("a".into())],
                vec![Value::Integer(2), Value::Null],
            ],
            position: None,
            closed: false,
        }
    }

    #[test]
    fn iterates_forward_only() {
        let mut c = cursor();
        assert!(c.get(0).is_none());
        assert!(c.move_to_next());
        assert_eq!(c.get(0), Some(&Value::Integer(1)));
        assert!(c.move_to_next());
        assert_eq!(c.get_by_name("subject"), Some(&Value::Null));
        assert!(!c.move_to_next());
        assert!(c.get(0).is_none());
        assert!(!c.move_to_next());
    }

    #[test]
    fn close_releases_rows() {
        let mut c = cursor();
        c.close();
        assert!(c.is_closed());
        assert_eq!(c.count(), 0);
        assert!(!c.move_to_next());
    }

    #[test]
    fn records_are_keyed_by_column() {
        let records = cursor().into_records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["subject"], Value::Text("a".into()));
        assert_eq!(records[1]["_id"], Value::Integer(2));
    }
}
