//! Schema validation: identifiers, referential integrity and addressability.

use crate::config::{FullConfig, RelationshipConfig, ID_COLUMN};
use crate::error::ConfigError;
use crate::path::WILDCARD_PATH_SEGMENT;
use std::collections::{HashMap, HashSet};

const ON_DELETE_ACTIONS: &[&str] = &["CASCADE", "SET NULL", "SET DEFAULT", "RESTRICT", "NO ACTION"];

/// Plain SQL identifier: letter or underscore, then letters, digits, underscores.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn check_identifier(s: &str) -> Result<(), ConfigError> {
    if is_identifier(s) {
        Ok(())
    } else {
        Err(ConfigError::InvalidIdentifier(s.to_string()))
    }
}

fn require_entity<'a>(
    entity_path: &HashMap<&str, Option<&'a str>>,
    id: &str,
) -> Result<Option<&'a str>, ConfigError> {
    entity_path
        .get(id)
        .copied()
        .ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: id.to_string(),
        })
}

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut entity_ids = HashSet::new();
    let mut tables: HashSet<String> = HashSet::new();
    let mut paths = HashSet::new();
    let mut columns_by_entity: HashMap<&str, HashMap<&str, &str>> = HashMap::new();

    for e in &config.entities {
        check_identifier(&e.id)?;
        check_identifier(e.table_name())?;
        if !entity_ids.insert(e.id.as_str()) || !tables.insert(e.table_name().to_string()) {
            return Err(ConfigError::DuplicateEntity(e.id.clone()));
        }
        if let Some(path) = &e.path {
            check_identifier(path)?;
            if path == WILDCARD_PATH_SEGMENT {
                return Err(ConfigError::Validation(format!(
                    "entity {}: path may not be the wildcard segment {}",
                    e.id, WILDCARD_PATH_SEGMENT
                )));
            }
            if !paths.insert(path.as_str()) {
                return Err(ConfigError::DuplicatePathSegment(path.clone()));
            }
        }

        let cols = columns_by_entity.entry(e.id.as_str()).or_default();
        for c in &e.columns {
            check_identifier(&c.name)?;
            if c.name == ID_COLUMN {
                return Err(ConfigError::Validation(format!(
                    "entity {}: {} is implicit and may not be declared",
                    e.id, ID_COLUMN
                )));
            }
            if cols.insert(c.name.as_str(), c.type_.as_str()).is_some() {
                return Err(ConfigError::Validation(format!(
                    "entity {}: duplicate column {}",
                    e.id, c.name
                )));
            }
        }
        for u in &e.unique {
            for name in u {
                if name != ID_COLUMN && !cols.contains_key(name.as_str()) {
                    return Err(ConfigError::MissingReference {
                        kind: "unique column",
                        id: format!("{}.{}", e.id, name),
                    });
                }
            }
        }
        for name in e.validation.keys() {
            if !cols.contains_key(name.as_str()) {
                return Err(ConfigError::MissingReference {
                    kind: "validated column",
                    id: format!("{}.{}", e.id, name),
                });
            }
        }
    }

    let entity_path: HashMap<&str, Option<&str>> = config
        .entities
        .iter()
        .map(|e| (e.id.as_str(), e.path.as_deref()))
        .collect();

    for r in &config.relationships {
        match r {
            RelationshipConfig::ForeignKey {
                parent,
                child,
                column,
                on_delete,
            } => {
                let parent_path = require_entity(&entity_path, parent)?;
                let child_path = require_entity(&entity_path, child)?;
                if parent_path.is_none() {
                    return Err(ConfigError::MissingPath(parent.clone()));
                }
                if child_path.is_none() {
                    return Err(ConfigError::MissingPath(child.clone()));
                }
                check_identifier(column)?;
                if column == ID_COLUMN {
                    return Err(ConfigError::Validation(format!(
                        "foreign key {} -> {}: column may not be {}",
                        child, parent, ID_COLUMN
                    )));
                }
                if let Some(ty) = columns_by_entity.get(child.as_str()).and_then(|c| c.get(column.as_str())) {
                    if !ty.eq_ignore_ascii_case("integer") {
                        return Err(ConfigError::Validation(format!(
                            "foreign key column {}.{} must be integer, got {}",
                            child, column, ty
                        )));
                    }
                }
                if let Some(action) = on_delete {
                    if !ON_DELETE_ACTIONS.contains(&action.to_uppercase().as_str()) {
                        return Err(ConfigError::Validation(format!("unsupported ON DELETE action: {}", action)));
                    }
                }
            }
            RelationshipConfig::ManyToMany { from, to, join_table } => {
                if require_entity(&entity_path, from)?.is_none() {
                    return Err(ConfigError::MissingPath(from.clone()));
                }
                if require_entity(&entity_path, to)?.is_none() {
                    return Err(ConfigError::MissingPath(to.clone()));
                }
                let join = join_table.clone().unwrap_or_else(|| format!("{}_{}", from, to));
                check_identifier(&join)?;
                if !tables.insert(join.clone()) {
                    return Err(ConfigError::DuplicateEntity(join));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(v: serde_json::Value) -> FullConfig {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn identifiers() {
        assert!(is_identifier("thread_id"));
        assert!(is_identifier("_all"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier("a\"b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn rejects_duplicate_paths() {
        let c = config(json!({
            "entities": [
                {"id": "a", "path": "items"},
                {"id": "b", "path": "items"}
            ]
        }));
        assert!(matches!(validate(&c), Err(ConfigError::DuplicatePathSegment(p)) if p == "items"));
    }

    #[test]
    fn rejects_declared_id_column() {
        let c = config(json!({
            "entities": [{"id": "a", "columns": [{"name": "_id", "type": "integer"}]}]
        }));
        assert!(matches!(validate(&c), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn many_to_many_target_needs_a_path() {
        let c = config(json!({
            "entities": [{"id": "person", "path": "person"}, {"id": "tag"}],
            "relationships": [{"kind": "many_to_many", "from": "person", "to": "tag"}]
        }));
        assert!(matches!(validate(&c), Err(ConfigError::MissingPath(id)) if id == "tag"));
    }

    #[test]
    fn foreign_key_checks_references_and_actions() {
        let c = config(json!({
            "entities": [{"id": "thread", "path": "thread"}, {"id": "message", "path": "message"}],
            "relationships": [{"kind": "foreign_key", "parent": "thread", "child": "nope", "column": "thread_id"}]
        }));
        assert!(matches!(validate(&c), Err(ConfigError::MissingReference { kind: "entity", .. })));

        let c = config(json!({
            "entities": [{"id": "thread", "path": "thread"}, {"id": "message", "path": "message"}],
            "relationships": [{"kind": "foreign_key", "parent": "thread", "child": "message",
                               "column": "thread_id", "on_delete": "DROP TABLE x"}]
        }));
        assert!(matches!(validate(&c), Err(ConfigError::Validation(_))));
    }
}
