//! Relation helpers: path-addressed CRUD over entity tables.
//!
//! `GenericDbHelper` serves one table. `ForeignKeyDbHelper` wraps one for a child entity and
//! constrains it by the parent id taken from the path. `M2MDbHelper` serves a target entity
//! through a join table, and `M2MManager` builds joined paths for callers.

mod foreign_key;
mod generic;
mod m2m;
mod validation;

pub use foreign_key::ForeignKeyDbHelper;
pub use generic::GenericDbHelper;
pub use m2m::{M2MDbHelper, M2MManager};
pub use validation::RequestValidator;

use crate::config::ResolvedEntity;
use crate::cursor::Cursor;
use crate::error::AppError;
use crate::path::ResourcePath;
use crate::sql::{ContentValues, QueryBuf, Selection};
use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteQueryResult, SqliteRow};
use sqlx::{Executor, SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Read request: projection (all columns when None), filter, and sort (entity default when None).
#[derive(Clone, Debug, Default)]
pub struct QueryArgs {
    pub projection: Option<Vec<String>>,
    pub selection: Selection,
    pub sort_order: Option<String>,
}

impl QueryArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn projection<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    pub fn selection(mut self, selection: Selection) -> Self {
        self.selection = selection;
        self
    }

    pub fn sort_order(mut self, sort_order: impl Into<String>) -> Self {
        self.sort_order = Some(sort_order.into());
        self
    }

    /// Same request with the filter narrowed.
    pub(crate) fn and(&self, extra: Selection) -> Self {
        QueryArgs {
            projection: self.projection.clone(),
            selection: self.selection.clone().and(extra),
            sort_order: self.sort_order.clone(),
        }
    }
}

/// Operations a route dispatches to. `_dir` variants act on a collection path, `_item`
/// variants on a path ending in an item id.
#[async_trait]
pub trait DbHelper: Send + Sync {
    /// Entity whose rows this helper returns.
    fn entity(&self) -> &Arc<ResolvedEntity>;

    /// Table that `create_tables` and `upgrade_tables` manage.
    fn table(&self) -> &str {
        &self.entity().table_name
    }

    /// Schema work runs on the caller's connection, usually inside its transaction.
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), AppError>;

    async fn upgrade_tables(&self, conn: &mut SqliteConnection, old: i64, new: i64) -> Result<(), AppError>;

    /// Insert one row; returns the new item's path.
    async fn insert_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
    ) -> Result<ResourcePath, AppError>;

    async fn query_dir(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError>;

    async fn query_item(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError>;

    async fn update_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError>;

    async fn update_item(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError>;

    async fn delete_dir(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError>;

    async fn delete_item(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection)
        -> Result<u64, AppError>;
}

pub(crate) async fn execute<'c, E>(executor: E, q: &QueryBuf) -> Result<SqliteQueryResult, AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "execute");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.execute(executor).await?)
}

pub(crate) async fn fetch_all<'c, E>(executor: E, q: &QueryBuf) -> Result<Vec<SqliteRow>, AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    tracing::debug!(sql = %q.sql, params = ?q.params, "query");
    let mut query = sqlx::query(&q.sql);
    for p in &q.params {
        query = query.bind(p.clone());
    }
    Ok(query.fetch_all(executor).await?)
}
