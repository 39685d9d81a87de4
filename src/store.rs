//! SQLite pool construction, schema version bookkeeping and table introspection.

use crate::config::Settings;
use crate::error::AppError;
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Executor;
use std::str::FromStr;

/// One column as reported by `pragma_table_info`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableColumn {
    pub name: String,
    /// Declared storage type, e.g. `TEXT`.
    pub sql_type: String,
    pub not_null: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

/// True for `sqlite::memory:` style URLs; every connection to those sees its own database.
pub fn is_memory_url(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open the pool. In-memory databases are pinned to one long-lived connection.
pub async fn connect(settings: &Settings) -> Result<SqlitePool, AppError> {
    let options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .foreign_keys(settings.foreign_keys);
    let pool_options = if is_memory_url(&settings.database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(settings.max_connections.max(1))
    };
    let pool = pool_options.connect_with(options).await?;
    tracing::info!(
        url = %settings.database_url,
        foreign_keys = settings.foreign_keys,
        "database connected"
    );
    Ok(pool)
}

/// Stored schema version (`PRAGMA user_version`); 0 on a fresh database.
pub async fn schema_version<'c, E>(executor: E) -> Result<i64, AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let (version,): (i64,) = sqlx::query_as("PRAGMA user_version").fetch_one(executor).await?;
    Ok(version)
}

pub async fn set_schema_version<'c, E>(executor: E, version: i64) -> Result<(), AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    // PRAGMA takes no bound parameters; the value is an integer.
    sqlx::query(&format!("PRAGMA user_version = {}", version))
        .execute(executor)
        .await?;
    tracing::info!(version, "schema version recorded");
    Ok(())
}

pub async fn table_exists<'c, E>(executor: E, table: &str) -> Result<bool, AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let row: Option<(String,)> = sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
        .bind(table)
        .fetch_optional(executor)
        .await?;
    Ok(row.is_some())
}

/// Columns of a live table in declaration order. Empty when the table does not exist.
pub async fn describe_table<'c, E>(executor: E, table: &str) -> Result<Vec<TableColumn>, AppError>
where
    E: Executor<'c, Database = Sqlite>,
{
    let rows: Vec<(String, String, i64, Option<String>, i64)> =
        sqlx::query_as("SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid")
            .bind(table)
            .fetch_all(executor)
            .await?;
    Ok(rows
        .into_iter()
        .map(|(name, sql_type, not_null, default, pk)| TableColumn {
            name,
            sql_type,
            not_null: not_null != 0,
            default,
            primary_key: pk != 0,
        })
        .collect())
}
