//! Raw schema declaration types matching the JSON document (entities + relationships).

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;

#[derive(Clone, Debug, Serialize)]
pub enum ColumnDefaultConfig {
    Literal(String),
    Expression { expression: String },
}

impl ColumnDefaultConfig {
    /// SQL text for `DEFAULT ...`. Finite numeric literals stay bare, other literals are quoted.
    pub fn to_sql(&self) -> String {
        match self {
            ColumnDefaultConfig::Literal(s) if s.parse::<f64>().is_ok_and(f64::is_finite) => s.clone(),
            ColumnDefaultConfig::Literal(s) => format!("'{}'", s.replace('\'', "''")),
            ColumnDefaultConfig::Expression { expression } => format!("({})", expression),
        }
    }
}

impl<'de> Deserialize<'de> for ColumnDefaultConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;
        match v {
            serde_json::Value::String(s) => Ok(ColumnDefaultConfig::Literal(s)),
            serde_json::Value::Number(n) => Ok(ColumnDefaultConfig::Literal(n.to_string())),
            serde_json::Value::Bool(b) => Ok(ColumnDefaultConfig::Literal(if b { "1" } else { "0" }.into())),
            serde_json::Value::Object(mut obj) => {
                if let Some(serde_json::Value::String(s)) = obj.remove("expression") {
                    return Ok(ColumnDefaultConfig::Expression { expression: s });
                }
                if let Some(serde_json::Value::String(s)) = obj.remove("value").or_else(|| obj.remove("literal")) {
                    return Ok(ColumnDefaultConfig::Literal(s));
                }
                Err(serde::de::Error::custom(format!(
                    "column default must be a string, {{ \"expression\": \"...\" }}, or {{ \"value\": \"...\" }}; got object with keys: {:?}",
                    obj.keys().collect::<Vec<_>>()
                )))
            }
            other => Err(serde::de::Error::custom(format!(
                "column default must be a scalar or {{ \"expression\": \"...\" }}; got {}",
                type_name_of_json(&other)
            ))),
        }
    }
}

fn type_name_of_json(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub name: String,
    /// Logical type name looked up in the column type registry.
    #[serde(rename = "type")]
    pub type_: String,
    #[serde(default = "default_true")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<ColumnDefaultConfig>,
    #[serde(default)]
    pub comment: Option<String>,
}

fn default_true() -> bool {
    true
}

/// What `upgrade_tables` does with an entity's table when the schema version moves forward.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradePolicy {
    /// Drop and recreate the table. Existing rows are lost.
    #[default]
    Recreate,
    /// Add declared columns missing from the live table.
    AddColumns,
    /// Leave the table alone.
    None,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EntityConfig {
    pub id: String,
    /// Table name; defaults to the id.
    #[serde(default)]
    pub table: Option<String>,
    /// Collection path segment. Entities without one get a table but no top-level route.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub sort_order: Option<String>,
    #[serde(default)]
    pub columns: Vec<ColumnConfig>,
    #[serde(default)]
    pub unique: Vec<Vec<String>>,
    #[serde(default)]
    pub upgrade: UpgradePolicy,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    #[serde(default)]
    pub comment: Option<String>,
}

impl EntityConfig {
    pub fn table_name(&self) -> &str {
        self.table.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationshipConfig {
    /// Child rows carry `column` pointing at the parent's `_id`; served at `/{parent}/{id}/{child}`.
    ForeignKey {
        parent: String,
        child: String,
        column: String,
        #[serde(default)]
        on_delete: Option<String>,
    },
    /// Link rows in `join_table` (default `{from}_{to}`); served at `/{from}/{id}/{to}`.
    ManyToMany {
        from: String,
        to: String,
        #[serde(default)]
        join_table: Option<String>,
    },
}

/// The whole schema document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    #[serde(default)]
    pub entities: Vec<EntityConfig>,
    #[serde(default)]
    pub relationships: Vec<RelationshipConfig>,
}
