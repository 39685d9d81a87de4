//! Apply entity declarations to the database: create tables and upgrade them between schema versions.
//!
//! Everything here runs on one connection so the resolver can wrap a whole upgrade in a
//! transaction.

use crate::config::{ResolvedEntity, UpgradePolicy};
use crate::error::AppError;
use crate::sql::{add_column, create_table, drop_table};
use crate::store::describe_table;
use sqlx::SqliteConnection;
use std::collections::HashSet;

/// CREATE TABLE IF NOT EXISTS for one entity. Idempotent.
pub async fn create_entity_table(conn: &mut SqliteConnection, entity: &ResolvedEntity) -> Result<(), AppError> {
    let sql = create_table(entity);
    tracing::debug!(sql = %sql, "ddl");
    sqlx::query(&sql).execute(&mut *conn).await?;
    tracing::info!(table = %entity.table_name, "table ensured");
    Ok(())
}

/// Bring one entity's table from `old` to `new` according to its upgrade policy.
pub async fn upgrade_entity_table(
    conn: &mut SqliteConnection,
    entity: &ResolvedEntity,
    old: i64,
    new: i64,
) -> Result<(), AppError> {
    match entity.upgrade {
        UpgradePolicy::Recreate => {
            tracing::warn!(
                table = %entity.table_name,
                old,
                new,
                "upgrading by drop and recreate; existing rows are discarded"
            );
            sqlx::query(&drop_table(&entity.table_name)).execute(&mut *conn).await?;
            create_entity_table(conn, entity).await
        }
        UpgradePolicy::AddColumns => {
            let live = describe_table(&mut *conn, &entity.table_name).await?;
            if live.is_empty() {
                return create_entity_table(conn, entity).await;
            }
            let present: HashSet<&str> = live.iter().map(|c| c.name.as_str()).collect();
            for column in entity.columns.iter().filter(|c| !present.contains(c.name.as_str())) {
                if column.is_required() {
                    return Err(AppError::Validation(format!(
                        "cannot add NOT NULL column {}.{} without a default",
                        entity.table_name, column.name
                    )));
                }
                let sql = add_column(entity, column);
                tracing::info!(table = %entity.table_name, column = %column.name, old, new, "adding column");
                sqlx::query(&sql).execute(&mut *conn).await?;
            }
            Ok(())
        }
        UpgradePolicy::None => {
            tracing::debug!(table = %entity.table_name, old, new, "upgrade policy none; table left as is");
            create_entity_table(conn, entity).await
        }
    }
}
