//! Builds DDL and parameterized SELECT, INSERT, UPDATE, DELETE from a resolved entity.

use crate::config::{ResolvedColumn, ResolvedEntity, ID_COLUMN};
use crate::sql::{ContentValues, Value};

/// Quote identifier for SQLite (safe: only from config or validated against it).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }
}

/// A filter clause with `?` placeholders and its positional arguments.
///
/// Clauses only ever grow by conjunction: `and_where` wraps what is there and appends the new
/// clause, and appends its arguments after the existing ones so placeholders and arguments
/// stay aligned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Selection {
    pub clause: Option<String>,
    pub args: Vec<Value>,
}

impl Selection {
    /// No filter: every row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<I, V>(clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::all().and_where(clause, args)
    }

    /// `"column" = ?`
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::all().and_eq(column, value)
    }

    pub fn and_where<I, V>(mut self, clause: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let extra = clause.into();
        if extra.trim().is_empty() {
            return self;
        }
        self.clause = Some(match self.clause.take() {
            Some(existing) if !existing.trim().is_empty() => format!("({}) AND ({})", existing, extra),
            _ => extra,
        });
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn and_eq(self, column: &str, value: impl Into<Value>) -> Self {
        self.and_where(format!("{} = ?", quoted(column)), [value.into()])
    }

    /// Conjoin another selection, its arguments following ours.
    pub fn and(self, other: Selection) -> Self {
        match other.clause {
            Some(clause) => self.and_where(clause, other.args),
            None => self,
        }
    }

    /// Conjoin the identity clause used by item-scoped operations.
    pub fn and_id(self, id: i64) -> Self {
        self.and_eq(ID_COLUMN, id)
    }

    pub fn is_all(&self) -> bool {
        self.clause.as_deref().map(|c| c.trim().is_empty()).unwrap_or(true)
    }

    fn where_clause(&self) -> String {
        match &self.clause {
            Some(c) if !c.trim().is_empty() => format!(" WHERE {}", c),
            _ => String::new(),
        }
    }
}

/// CREATE TABLE IF NOT EXISTS with `_id` first, declared columns, then table constraints.
pub fn create_table(entity: &ResolvedEntity) -> String {
    let mut defs: Vec<String> = entity.columns.iter().map(ResolvedColumn::to_create_column).collect();
    for u in &entity.unique {
        let cols: Vec<String> = u.iter().map(|s| quoted(s)).collect();
        defs.push(format!("UNIQUE ({})", cols.join(", ")));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
        quoted(&entity.table_name),
        defs.join(",\n  ")
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quoted(table))
}

pub fn add_column(entity: &ResolvedEntity, column: &ResolvedColumn) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {}",
        quoted(&entity.table_name),
        column.to_create_column()
    )
}

/// Join table for a many-to-many relationship.
pub fn create_join_table(join_table: &str, from_table: &str, to_table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {t} (\n  {id} INTEGER PRIMARY KEY AUTOINCREMENT,\n  {from} INTEGER NOT NULL REFERENCES {ft} ({id}) ON DELETE CASCADE,\n  {to} INTEGER NOT NULL REFERENCES {tt} ({id}) ON DELETE CASCADE,\n  UNIQUE ({from}, {to})\n)",
        t = quoted(join_table),
        id = quoted(ID_COLUMN),
        from = quoted(JOIN_FROM_COLUMN),
        to = quoted(JOIN_TO_COLUMN),
        ft = quoted(from_table),
        tt = quoted(to_table),
    )
}

pub const JOIN_FROM_COLUMN: &str = "from_id";
pub const JOIN_TO_COLUMN: &str = "to_id";

/// `"_id" IN (SELECT "to_id" FROM join WHERE "from_id" = ?)`, or any linked row when `from_id` is None.
pub fn linked_selection(join_table: &str, from_id: Option<i64>) -> Selection {
    match from_id {
        Some(id) => Selection::new(
            format!(
                "{} IN (SELECT {} FROM {} WHERE {} = ?)",
                quoted(ID_COLUMN),
                quoted(JOIN_TO_COLUMN),
                quoted(join_table),
                quoted(JOIN_FROM_COLUMN)
            ),
            [id],
        ),
        None => Selection::new(
            format!(
                "{} IN (SELECT {} FROM {})",
                quoted(ID_COLUMN),
                quoted(JOIN_TO_COLUMN),
                quoted(join_table)
            ),
            Vec::<Value>::new(),
        ),
    }
}

/// INSERT OR IGNORE one link row; an existing link is left untouched.
pub fn insert_link(join_table: &str, from_id: i64, to_id: i64) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!(
        "INSERT OR IGNORE INTO {} ({}, {}) VALUES (?, ?)",
        quoted(join_table),
        quoted(JOIN_FROM_COLUMN),
        quoted(JOIN_TO_COLUMN)
    );
    q.params = vec![Value::Integer(from_id), Value::Integer(to_id)];
    q
}

/// DELETE link rows for the parent (any parent when None) whose target matches `targets`.
pub fn delete_links(join_table: &str, from_id: Option<i64>, target_table: &str, targets: &Selection) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut selection = Selection::new(
        format!(
            "{} IN (SELECT {} FROM {}{})",
            quoted(JOIN_TO_COLUMN),
            quoted(ID_COLUMN),
            quoted(target_table),
            targets.where_clause()
        ),
        targets.args.clone(),
    );
    if let Some(id) = from_id {
        selection = selection.and_eq(JOIN_FROM_COLUMN, id);
    }
    q.sql = format!("DELETE FROM {}{}", quoted(join_table), selection.where_clause());
    q.params = selection.args;
    q
}

/// SELECT the given columns. Falls back to the entity's declared sort order.
pub fn select(
    entity: &ResolvedEntity,
    columns: &[&ResolvedColumn],
    selection: &Selection,
    sort_order: Option<&str>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let cols = columns
        .iter()
        .map(|c| quoted(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let order_clause = sort_order
        .or(entity.sort_order.as_deref())
        .filter(|s| !s.trim().is_empty())
        .map(|s| format!(" ORDER BY {}", s))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}",
        cols,
        quoted(&entity.table_name),
        selection.where_clause(),
        order_clause
    );
    q.params = selection.args.clone();
    q
}

/// INSERT one row from already-checked values. Column order follows the map's key order.
pub fn insert(entity: &ResolvedEntity, values: &ContentValues) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = quoted(&entity.table_name);
    if values.is_empty() {
        q.sql = format!("INSERT INTO {} DEFAULT VALUES", table);
        return q;
    }
    let mut cols = Vec::with_capacity(values.len());
    for (name, value) in values {
        cols.push(quoted(name));
        q.params.push(value.clone());
    }
    let placeholders = vec!["?"; cols.len()].join(", ");
    q.sql = format!("INSERT INTO {} ({}) VALUES ({})", table, cols.join(", "), placeholders);
    q
}

/// UPDATE: SET params come first, then the selection's arguments.
pub fn update(entity: &ResolvedEntity, values: &ContentValues, selection: &Selection) -> QueryBuf {
    let mut q = QueryBuf::new();
    let mut sets = Vec::with_capacity(values.len());
    for (name, value) in values {
        sets.push(format!("{} = ?", quoted(name)));
        q.params.push(value.clone());
    }
    q.params.extend(selection.args.iter().cloned());
    q.sql = format!(
        "UPDATE {} SET {}{}",
        quoted(&entity.table_name),
        sets.join(", "),
        selection.where_clause()
    );
    q
}

pub fn delete(entity: &ResolvedEntity, selection: &Selection) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.sql = format!("DELETE FROM {}{}", quoted(&entity.table_name), selection.where_clause());
    q.params = selection.args.clone();
    q
}
