//! Child collections addressed under a parent item: `/{parent}/{id|_all}/{child}[/{id}]`.

use super::{DbHelper, GenericDbHelper, QueryArgs};
use crate::config::{ForeignKeyRelation, ResolvedEntity};
use crate::cursor::Cursor;
use crate::error::AppError;
use crate::path::{ParentId, ResourcePath, DIR_PARENT_OFFSET, ITEM_PARENT_OFFSET};
use crate::sql::{ContentValues, Selection, Value};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

/// Wraps the child's generic helper and scopes every call by the parent id in the path.
///
/// Queries accept the wildcard parent and then skip the parent filter. Inserts, updates and
/// deletes need a concrete parent id.
pub struct ForeignKeyDbHelper {
    parent: Arc<ResolvedEntity>,
    column: String,
    child: GenericDbHelper,
}

impl ForeignKeyDbHelper {
    pub fn new(relation: &ForeignKeyRelation) -> Self {
        Self {
            parent: relation.parent.clone(),
            column: relation.column.clone(),
            child: GenericDbHelper::new(relation.child.clone()),
        }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    pub fn is_self_join(&self) -> bool {
        self.parent.id == self.child.entity().id
    }

    /// `fk = ?` for a concrete parent; nothing for the wildcard.
    fn parent_filter(&self, parent: ParentId) -> Selection {
        match parent {
            ParentId::Any => Selection::all(),
            ParentId::Id(id) => Selection::eq(&self.column, id),
        }
    }
}

#[async_trait]
impl DbHelper for ForeignKeyDbHelper {
    fn entity(&self) -> &Arc<ResolvedEntity> {
        self.child.entity()
    }

    /// The child's table; nothing on a self-join, where that table is the parent's.
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), AppError> {
        if self.is_self_join() {
            return Ok(());
        }
        self.child.create_tables(conn).await
    }

    async fn upgrade_tables(&self, conn: &mut SqliteConnection, old: i64, new: i64) -> Result<(), AppError> {
        if self.is_self_join() {
            return Ok(());
        }
        self.child.upgrade_tables(conn, old, new).await
    }

    async fn insert_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        mut values: ContentValues,
    ) -> Result<ResourcePath, AppError> {
        let parent = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        values.insert(self.column.clone(), Value::Integer(parent));
        self.child.insert_dir(pool, path, values).await
    }

    async fn query_dir(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let parent = path.parent_id(DIR_PARENT_OFFSET)?;
        self.child.query_rows(pool, &args.and(self.parent_filter(parent))).await
    }

    async fn query_item(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let parent = path.parent_id(ITEM_PARENT_OFFSET)?;
        let id = path.last_id()?;
        let extra = self.parent_filter(parent).and_id(id);
        self.child.query_rows(pool, &args.and(extra)).await
    }

    async fn update_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let parent = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        let selection = selection.and_eq(&self.column, parent);
        self.child.update_rows(pool, values, &selection).await
    }

    async fn update_item(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let parent = path.concrete_parent_id(ITEM_PARENT_OFFSET)?;
        let id = path.last_id()?;
        let selection = selection.and_eq(&self.column, parent).and_id(id);
        self.child.update_rows(pool, values, &selection).await
    }

    async fn delete_dir(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let parent = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        let selection = selection.and_eq(&self.column, parent);
        self.child.delete_rows(pool, &selection).await
    }

    async fn delete_item(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let parent = path.concrete_parent_id(ITEM_PARENT_OFFSET)?;
        let id = path.last_id()?;
        let selection = selection.and_eq(&self.column, parent).and_id(id);
        self.child.delete_rows(pool, &selection).await
    }
}
