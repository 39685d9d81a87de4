//! CRUD over a single entity table.

use super::{execute, fetch_all, DbHelper, QueryArgs, RequestValidator};
use crate::config::{ResolvedColumn, ResolvedEntity, ID_COLUMN};
use crate::cursor::Cursor;
use crate::error::AppError;
use crate::migration::{create_entity_table, upgrade_entity_table};
use crate::path::ResourcePath;
use crate::sql::{delete, insert, select, update, ContentValues, Selection};
use async_trait::async_trait;
use sqlx::sqlite::Sqlite;
use sqlx::{Executor, SqliteConnection, SqlitePool};
use std::sync::Arc;

pub struct GenericDbHelper {
    entity: Arc<ResolvedEntity>,
}

impl GenericDbHelper {
    pub fn new(entity: Arc<ResolvedEntity>) -> Self {
        Self { entity }
    }

    /// Projection columns in request order; every column when None. Unknown names are rejected.
    pub fn columns(&self, projection: Option<&[String]>) -> Result<Vec<&ResolvedColumn>, AppError> {
        match projection {
            None => Ok(self.entity.columns.iter().collect()),
            Some([]) => Ok(self.entity.columns.iter().collect()),
            Some(names) => names
                .iter()
                .map(|n| {
                    self.entity.column(n).ok_or_else(|| {
                        AppError::BadRequest(format!("unknown column {} for {}", n, self.entity.id))
                    })
                })
                .collect(),
        }
    }

    /// Type-check an insert payload and enforce required columns and rules.
    pub(crate) fn check_insert(&self, values: ContentValues) -> Result<ContentValues, AppError> {
        let values = self.coerce_values(values)?;
        for c in self.entity.columns.iter().filter(|c| c.is_required()) {
            if !values.contains_key(&c.name) {
                return Err(AppError::Validation(format!("{} is required", c.name)));
            }
        }
        RequestValidator::validate(&values, &self.entity.validation)?;
        Ok(values)
    }

    /// Type-check an update payload. `_id` is not writable.
    pub(crate) fn check_update(&self, values: ContentValues) -> Result<ContentValues, AppError> {
        if values.is_empty() {
            return Err(AppError::BadRequest("no values to update".into()));
        }
        if values.contains_key(ID_COLUMN) {
            return Err(AppError::BadRequest(format!("{} cannot be updated", ID_COLUMN)));
        }
        let values = self.coerce_values(values)?;
        RequestValidator::validate_partial(&values, &self.entity.validation)?;
        Ok(values)
    }

    fn coerce_values(&self, values: ContentValues) -> Result<ContentValues, AppError> {
        let mut out = ContentValues::new();
        for (name, value) in values {
            let column = self.entity.column(&name).ok_or_else(|| {
                AppError::BadRequest(format!("unknown column {} for {}", name, self.entity.id))
            })?;
            if value.is_null() && !column.nullable {
                return Err(AppError::Validation(format!("{} may not be null", name)));
            }
            let shown = value.to_string();
            let value = column.column_type.coerce(value).ok_or_else(|| {
                AppError::BadRequest(format!(
                    "{} expects {}, got {}",
                    name,
                    column.column_type.type_name(),
                    shown
                ))
            })?;
            out.insert(name, value);
        }
        Ok(out)
    }

    /// Insert and return the new row id.
    pub(crate) async fn insert_row<'c, E>(&self, executor: E, values: ContentValues) -> Result<i64, AppError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let values = self.check_insert(values)?;
        let q = insert(&self.entity, &values);
        let result = execute(executor, &q).await?;
        Ok(result.last_insert_rowid())
    }

    pub(crate) async fn query_rows<'c, E>(&self, executor: E, args: &QueryArgs) -> Result<Cursor, AppError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let columns = self.columns(args.projection.as_deref())?;
        let q = select(&self.entity, &columns, &args.selection, args.sort_order.as_deref());
        let rows = fetch_all(executor, &q).await?;
        Cursor::from_rows(&columns, &rows)
    }

    pub(crate) async fn update_rows<'c, E>(
        &self,
        executor: E,
        values: ContentValues,
        selection: &Selection,
    ) -> Result<u64, AppError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let values = self.check_update(values)?;
        let q = update(&self.entity, &values, selection);
        Ok(execute(executor, &q).await?.rows_affected())
    }

    pub(crate) async fn delete_rows<'c, E>(&self, executor: E, selection: &Selection) -> Result<u64, AppError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let q = delete(&self.entity, selection);
        Ok(execute(executor, &q).await?.rows_affected())
    }

    /// Whether a row with this id exists.
    pub(crate) async fn exists<'c, E>(&self, executor: E, id: i64) -> Result<bool, AppError>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let id_column = [&self.entity.columns[0]];
        let q = select(&self.entity, &id_column, &Selection::all().and_id(id), Some(""));
        Ok(!fetch_all(executor, &q).await?.is_empty())
    }
}

#[async_trait]
impl DbHelper for GenericDbHelper {
    fn entity(&self) -> &Arc<ResolvedEntity> {
        &self.entity
    }

    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), AppError> {
        create_entity_table(conn, &self.entity).await
    }

    async fn upgrade_tables(&self, conn: &mut SqliteConnection, old: i64, new: i64) -> Result<(), AppError> {
        upgrade_entity_table(conn, &self.entity, old, new).await
    }

    async fn insert_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
    ) -> Result<ResourcePath, AppError> {
        let id = self.insert_row(pool, values).await?;
        tracing::debug!(entity = %self.entity.id, id, "inserted");
        Ok(path.with_id(id))
    }

    async fn query_dir(&self, pool: &SqlitePool, _path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        self.query_rows(pool, args).await
    }

    async fn query_item(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let id = path.last_id()?;
        self.query_rows(pool, &args.and(Selection::all().and_id(id))).await
    }

    async fn update_dir(
        &self,
        pool: &SqlitePool,
        _path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        self.update_rows(pool, values, &selection).await
    }

    async fn update_item(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let id = path.last_id()?;
        self.update_rows(pool, values, &selection.and_id(id)).await
    }

    async fn delete_dir(&self, pool: &SqlitePool, _path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        self.delete_rows(pool, &selection).await
    }

    async fn delete_item(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let id = path.last_id()?;
        self.delete_rows(pool, &selection.and_id(id)).await
    }
}
