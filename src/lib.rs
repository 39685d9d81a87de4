//! Provider SDK: path-addressed relational resources over SQLite.
//!
//! Entities and their foreign-key and many-to-many relationships are declared as data,
//! resolved into a registry, and served through a `ContentResolver` that maps resource
//! paths such as `/thread/42/message` onto parameterized SQL.

pub mod column;
pub mod config;
pub mod cursor;
pub mod error;
pub mod migration;
pub mod path;
pub mod resolver;
pub mod response;
pub mod sql;
pub mod state;
pub mod store;
pub mod service;
pub mod handlers;
pub mod routes;

pub use column::{ColumnType, ColumnTypeRegistry};
pub use config::{load_from_path, load_from_str, resolve, resolve_with, FullConfig, ResolvedEntity, SchemaRegistry, Settings};
pub use cursor::{Cursor, Record};
pub use error::{AppError, ConfigError};
pub use path::{ResourcePath, DIR_PARENT_OFFSET, ITEM_PARENT_OFFSET, WILDCARD_PATH_SEGMENT};
pub use resolver::{ContentResolver, RouteKind};
pub use routes::{common_routes, common_routes_with_ready, content_routes};
pub use service::{DbHelper, ForeignKeyDbHelper, GenericDbHelper, M2MDbHelper, M2MManager, QueryArgs};
pub use sql::{ContentValues, Selection, Value};
pub use state::AppState;
pub use store::{connect, describe_table, schema_version, TableColumn};
