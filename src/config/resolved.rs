//! Resolved schema registry: declarations validated and flattened for runtime use.

use crate::column::{ColumnType, IntegerColumn};
use crate::config::{UpgradePolicy, ValidationRule};
use crate::error::ConfigError;
use crate::sql::quoted;
use std::collections::HashMap;
use std::sync::Arc;

/// Implicit identity column present on every table.
pub const ID_COLUMN: &str = "_id";

#[derive(Clone, Debug)]
pub struct ResolvedColumn {
    pub name: String,
    pub column_type: Arc<dyn ColumnType>,
    pub nullable: bool,
    /// SQL text after `DEFAULT`.
    pub default: Option<String>,
    pub primary_key: bool,
}

impl ResolvedColumn {
    pub fn id() -> Self {
        ResolvedColumn {
            name: ID_COLUMN.to_string(),
            column_type: Arc::new(IntegerColumn),
            nullable: false,
            default: None,
            primary_key: true,
        }
    }

    /// Must be supplied on insert: NOT NULL without a default.
    pub fn is_required(&self) -> bool {
        !self.primary_key && !self.nullable && self.default.is_none()
    }

    pub fn to_create_column(&self) -> String {
        if self.primary_key {
            return format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quoted(&self.name));
        }
        let mut def = self.column_type.to_create_column(&self.name);
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        if let Some(d) = &self.default {
            def.push_str(" DEFAULT ");
            def.push_str(d);
        }
        def
    }
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub id: String,
    pub table_name: String,
    pub path_segment: Option<String>,
    pub sort_order: Option<String>,
    /// `_id` first, then declared columns in declaration order.
    pub columns: Vec<ResolvedColumn>,
    pub unique: Vec<Vec<String>>,
    pub upgrade: UpgradePolicy,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ResolvedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Path segment, or a configuration error when the entity cannot be addressed.
    pub fn require_path(&self) -> Result<&str, ConfigError> {
        self.path_segment
            .as_deref()
            .ok_or_else(|| ConfigError::MissingPath(self.id.clone()))
    }
}

#[derive(Clone, Debug)]
pub struct ForeignKeyRelation {
    pub parent: Arc<ResolvedEntity>,
    pub child: Arc<ResolvedEntity>,
    pub column: String,
}

#[derive(Clone, Debug)]
pub struct ManyToManyRelation {
    pub from: Arc<ResolvedEntity>,
    pub to: Arc<ResolvedEntity>,
    pub join_table: String,
}

#[derive(Clone, Debug)]
pub enum ResolvedRelationship {
    ForeignKey(ForeignKeyRelation),
    ManyToMany(ManyToManyRelation),
}

/// Entity id -> schema. Built once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct SchemaRegistry {
    pub entities: Vec<Arc<ResolvedEntity>>,
    pub entity_by_id: HashMap<String, Arc<ResolvedEntity>>,
    pub relationships: Vec<ResolvedRelationship>,
}

impl SchemaRegistry {
    pub fn entity(&self, id: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entity_by_id.get(id)
    }

    pub fn entity_by_path(&self, path_segment: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entities
            .iter()
            .find(|e| e.path_segment.as_deref() == Some(path_segment))
    }
}
