//! Load schema declarations from JSON and resolve them into a `SchemaRegistry`.

use crate::column::{ColumnType, ColumnTypeRegistry, ReferenceColumn};
use crate::config::resolved::{
    ForeignKeyRelation, ManyToManyRelation, ResolvedColumn, ResolvedEntity, ResolvedRelationship, SchemaRegistry,
};
use crate::config::types::*;
use crate::config::validate;
use crate::error::ConfigError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Build the registry with the default column types.
pub fn resolve(config: &FullConfig) -> Result<SchemaRegistry, ConfigError> {
    resolve_with(config, &ColumnTypeRegistry::with_defaults())
}

/// Build the registry, looking column types up in `types`.
pub fn resolve_with(config: &FullConfig, types: &ColumnTypeRegistry) -> Result<SchemaRegistry, ConfigError> {
    validate(config)?;

    // Foreign-key columns per child entity: column -> (parent table, on_delete).
    let mut references: HashMap<&str, Vec<(&str, &str, Option<String>)>> = HashMap::new();
    let table_by_id: HashMap<&str, &str> = config
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.table_name()))
        .collect();
    for r in &config.relationships {
        if let RelationshipConfig::ForeignKey {
            parent,
            child,
            column,
            on_delete,
        } = r
        {
            let parent_table = table_by_id.get(parent.as_str()).copied().unwrap_or(parent.as_str());
            references
                .entry(child.as_str())
                .or_default()
                .push((column.as_str(), parent_table, on_delete.as_ref().map(|a| a.to_uppercase())));
        }
    }

    let mut entities = Vec::with_capacity(config.entities.len());
    let mut entity_by_id = HashMap::new();

    for e in &config.entities {
        let mut columns = vec![ResolvedColumn::id()];
        for c in &e.columns {
            let column_type = types.get(&c.type_).ok_or_else(|| ConfigError::UnknownColumnType {
                entity: e.id.clone(),
                column: c.name.clone(),
                type_name: c.type_.clone(),
            })?;
            columns.push(ResolvedColumn {
                name: c.name.clone(),
                column_type,
                nullable: c.nullable,
                default: c.default.as_ref().map(ColumnDefaultConfig::to_sql),
                primary_key: false,
            });
        }

        for (column, parent_table, on_delete) in references.get(e.id.as_str()).into_iter().flatten() {
            let reference: Arc<dyn ColumnType> = Arc::new(ReferenceColumn::new(*parent_table, on_delete.clone()));
            match columns.iter_mut().find(|c| c.name == *column) {
                Some(existing) => existing.column_type = reference,
                None => columns.push(ResolvedColumn {
                    name: column.to_string(),
                    column_type: reference,
                    nullable: true,
                    default: None,
                    primary_key: false,
                }),
            }
        }

        let entity = Arc::new(ResolvedEntity {
            id: e.id.clone(),
            table_name: e.table_name().to_string(),
            path_segment: e.path.clone(),
            sort_order: e.sort_order.clone(),
            columns,
            unique: e.unique.clone(),
            upgrade: e.upgrade,
            validation: e.validation.clone(),
        });
        entity_by_id.insert(e.id.clone(), entity.clone());
        entities.push(entity);
    }

    let lookup = |id: &str| -> Result<Arc<ResolvedEntity>, ConfigError> {
        entity_by_id.get(id).cloned().ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: id.to_string(),
        })
    };
    let mut relationships = Vec::with_capacity(config.relationships.len());
    for r in &config.relationships {
        relationships.push(match r {
            RelationshipConfig::ForeignKey {
                parent, child, column, ..
            } => ResolvedRelationship::ForeignKey(ForeignKeyRelation {
                parent: lookup(parent)?,
                child: lookup(child)?,
                column: column.clone(),
            }),
            RelationshipConfig::ManyToMany { from, to, join_table } => {
                ResolvedRelationship::ManyToMany(ManyToManyRelation {
                    from: lookup(from)?,
                    to: lookup(to)?,
                    join_table: join_table.clone().unwrap_or_else(|| format!("{}_{}", from, to)),
                })
            }
        });
    }

    tracing::debug!(
        entities = entities.len(),
        relationships = relationships.len(),
        "schema resolved"
    );
    Ok(SchemaRegistry {
        entities,
        entity_by_id,
        relationships,
    })
}

pub fn load_from_str(json: &str) -> Result<FullConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
}

/// Read a schema document from disk.
pub async fn load_from_path(path: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    load_from_str(&text)
}
