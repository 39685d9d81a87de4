//! Many-to-many: targets reached through a join table, `/{from}/{id|_all}/{to}[/{to_id}]`.

use super::{execute, DbHelper, GenericDbHelper, QueryArgs};
use crate::config::{ManyToManyRelation, ResolvedEntity, ID_COLUMN};
use crate::cursor::Cursor;
use crate::error::{AppError, ConfigError};
use crate::path::{ResourcePath, DIR_PARENT_OFFSET, ITEM_PARENT_OFFSET};
use crate::resolver::ContentResolver;
use crate::sql::{create_join_table, delete_links, insert_link, linked_selection, ContentValues, Selection};
use async_trait::async_trait;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;

pub struct M2MDbHelper {
    from: Arc<ResolvedEntity>,
    join_table: String,
    target: GenericDbHelper,
}

impl M2MDbHelper {
    pub fn new(relation: &ManyToManyRelation) -> Self {
        Self {
            from: relation.from.clone(),
            join_table: relation.join_table.clone(),
            target: GenericDbHelper::new(relation.to.clone()),
        }
    }

    async fn ensure_join_table(&self, conn: &mut SqliteConnection) -> Result<(), AppError> {
        let sql = create_join_table(&self.join_table, &self.from.table_name, &self.target.entity().table_name);
        tracing::debug!(sql = %sql, "ddl");
        sqlx::query(&sql).execute(conn).await?;
        tracing::info!(table = %self.join_table, "join table ensured");
        Ok(())
    }
}

#[async_trait]
impl DbHelper for M2MDbHelper {
    fn entity(&self) -> &Arc<ResolvedEntity> {
        self.target.entity()
    }

    fn table(&self) -> &str {
        &self.join_table
    }

    /// The join table only; both ends are created by their own helpers.
    async fn create_tables(&self, conn: &mut SqliteConnection) -> Result<(), AppError> {
        self.ensure_join_table(conn).await
    }

    async fn upgrade_tables(&self, conn: &mut SqliteConnection, _old: i64, _new: i64) -> Result<(), AppError> {
        self.ensure_join_table(conn).await
    }

    /// Insert the target (or reuse an existing one named by `_id`) and link it, in one transaction.
    async fn insert_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
    ) -> Result<ResourcePath, AppError> {
        let from_id = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        let mut tx = pool.begin().await?;
        let existing = match values.get(ID_COLUMN).and_then(|v| v.as_i64()) {
            Some(id) => self.target.exists(&mut *tx, id).await?.then_some(id),
            None => None,
        };
        let to_id = match existing {
            Some(id) if values.len() == 1 => id,
            Some(id) => {
                return Err(AppError::BadRequest(format!(
                    "linking existing {} {} takes only {}",
                    self.target.entity().id,
                    id,
                    ID_COLUMN
                )))
            }
            None => self.target.insert_row(&mut *tx, values).await?,
        };
        execute(&mut *tx, &insert_link(&self.join_table, from_id, to_id)).await?;
        tx.commit().await?;
        tracing::debug!(join = %self.join_table, from_id, to_id, "linked");
        Ok(path.with_id(to_id))
    }

    async fn query_dir(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let from_id = path.parent_id(DIR_PARENT_OFFSET)?.id();
        let linked = linked_selection(&self.join_table, from_id);
        self.target.query_rows(pool, &args.and(linked)).await
    }

    async fn query_item(&self, pool: &SqlitePool, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let from_id = path.parent_id(ITEM_PARENT_OFFSET)?.id();
        let id = path.last_id()?;
        let linked = linked_selection(&self.join_table, from_id).and_id(id);
        self.target.query_rows(pool, &args.and(linked)).await
    }

    async fn update_dir(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let from_id = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        let selection = selection.and(linked_selection(&self.join_table, Some(from_id)));
        self.target.update_rows(pool, values, &selection).await
    }

    async fn update_item(
        &self,
        pool: &SqlitePool,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let from_id = path.concrete_parent_id(ITEM_PARENT_OFFSET)?;
        let id = path.last_id()?;
        let selection = selection
            .and(linked_selection(&self.join_table, Some(from_id)))
            .and_id(id);
        self.target.update_rows(pool, values, &selection).await
    }

    /// Unlinks; the target rows stay.
    async fn delete_dir(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let from_id = path.concrete_parent_id(DIR_PARENT_OFFSET)?;
        let q = delete_links(&self.join_table, Some(from_id), &self.target.entity().table_name, &selection);
        Ok(execute(pool, &q).await?.rows_affected())
    }

    async fn delete_item(&self, pool: &SqlitePool, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let from_id = path.concrete_parent_id(ITEM_PARENT_OFFSET)?;
        let id = path.last_id()?;
        let q = delete_links(
            &self.join_table,
            Some(from_id),
            &self.target.entity().table_name,
            &selection.and_id(id),
        );
        Ok(execute(pool, &q).await?.rows_affected())
    }
}

/// Builds paths to a joined entity below a parent and runs requests there through the resolver.
#[derive(Clone, Debug)]
pub struct M2MManager {
    target: Arc<ResolvedEntity>,
}

impl M2MManager {
    pub fn new(target: Arc<ResolvedEntity>) -> Self {
        Self { target }
    }

    /// Path segment of the joined entity.
    pub fn path(&self) -> Result<&str, ConfigError> {
        self.target.require_path()
    }

    pub fn sort_order(&self) -> Option<&str> {
        self.target.sort_order.as_deref()
    }

    /// `parent` + the joined entity's segment.
    pub fn uri(&self, parent: &ResourcePath) -> Result<ResourcePath, ConfigError> {
        Ok(parent.append(self.path()?))
    }

    pub async fn insert(
        &self,
        resolver: &ContentResolver,
        parent: &ResourcePath,
        values: ContentValues,
    ) -> Result<ResourcePath, AppError> {
        let uri = self.uri(parent)?;
        resolver.insert(&uri, values).await
    }

    /// All linked rows, in the joined entity's sort order.
    pub async fn query(
        &self,
        resolver: &ContentResolver,
        parent: &ResourcePath,
        projection: Option<Vec<String>>,
    ) -> Result<Cursor, AppError> {
        let uri = self.uri(parent)?;
        let args = QueryArgs {
            projection,
            selection: Selection::all(),
            sort_order: self.sort_order().map(str::to_string),
        };
        resolver.query(&uri, &args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::message_entity;

    #[test]
    fn manager_paths() {
        let m = M2MManager::new(Arc::new(message_entity()));
        assert_eq!(m.path().unwrap(), "message");
        assert_eq!(m.sort_order(), Some("_id ASC"));
        let uri = m.uri(&ResourcePath::parse("/thread/4")).unwrap();
        assert_eq!(uri.to_string(), "/thread/4/message");
    }

    #[test]
    fn manager_without_path_is_a_config_error() {
        let mut e = message_entity();
        e.path_segment = None;
        let m = M2MManager::new(Arc::new(e));
        assert!(matches!(m.path(), Err(ConfigError::MissingPath(_))));
        assert!(m.uri(&ResourcePath::parse("/thread/4")).is_err());
    }
}
