//! Content handlers: GET/POST/PATCH/DELETE on any resource path the resolver knows.

use crate::config::ResolvedEntity;
use crate::error::AppError;
use crate::path::ResourcePath;
use crate::response::{created, success_many, success_one_ok};
use crate::service::QueryArgs;
use crate::sql::{quoted, ContentValues, Selection, Value};
use crate::state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::collections::BTreeMap;

const PROJECTION_PARAM: &str = "projection";
const SORT_PARAM: &str = "sort";

fn body_to_values(value: serde_json::Value) -> Result<ContentValues, AppError> {
    match value {
        serde_json::Value::Object(m) => m
            .into_iter()
            .map(|(k, v)| Ok((k, Value::from_json(&v)?)))
            .collect(),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

/// Equality filter from a query-string pair; the column must be declared and the text must parse as its type.
fn filter_for(entity: &ResolvedEntity, column: &str, text: &str) -> Result<Selection, AppError> {
    let col = entity
        .column(column)
        .ok_or_else(|| AppError::BadRequest(format!("unknown filter column {}", column)))?;
    let value = col
        .column_type
        .parse(text)
        .ok_or_else(|| AppError::BadRequest(format!("{} expects {}, got {}", column, col.column_type.type_name(), text)))?;
    Ok(Selection::eq(column, value))
}

/// `sort=a,-b` -> `"a" ASC, "b" DESC`.
fn sort_for(entity: &ResolvedEntity, raw: &str) -> Result<String, AppError> {
    let mut terms = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (column, direction) = match part.strip_prefix('-') {
            Some(c) => (c, "DESC"),
            None => (part, "ASC"),
        };
        if entity.column(column).is_none() {
            return Err(AppError::BadRequest(format!("unknown sort column {}", column)));
        }
        terms.push(format!("{} {}", quoted(column), direction));
    }
    Ok(terms.join(", "))
}

fn filters(entity: &ResolvedEntity, params: &BTreeMap<String, String>) -> Result<Selection, AppError> {
    let mut selection = Selection::all();
    for (k, v) in params {
        if k == PROJECTION_PARAM || k == SORT_PARAM {
            continue;
        }
        selection = selection.and(filter_for(entity, k, v)?);
    }
    Ok(selection)
}

fn query_args(entity: &ResolvedEntity, params: &BTreeMap<String, String>) -> Result<QueryArgs, AppError> {
    let mut args = QueryArgs::new().selection(filters(entity, params)?);
    if let Some(p) = params.get(PROJECTION_PARAM) {
        let columns: Vec<String> = p
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        if !columns.is_empty() {
            args = args.projection(columns);
        }
    }
    if let Some(s) = params.get(SORT_PARAM) {
        let order = sort_for(entity, s)?;
        if !order.is_empty() {
            args = args.sort_order(order);
        }
    }
    Ok(args)
}

/// Mutations take filters only.
fn mutation_filters(entity: &ResolvedEntity, params: &BTreeMap<String, String>) -> Result<Selection, AppError> {
    if params.contains_key(PROJECTION_PARAM) || params.contains_key(SORT_PARAM) {
        return Err(AppError::BadRequest("projection and sort apply to reads only".into()));
    }
    filters(entity, params)
}

pub async fn read(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<axum::response::Response, AppError> {
    let path = ResourcePath::parse(&path);
    let entity = state.resolver.entity_for(&path)?;
    let args = query_args(entity, &params)?;
    let cursor = state.resolver.query(&path, &args).await?;
    if state.resolver.is_item(&path)? {
        let record = cursor
            .into_records()
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(path.to_string()))?;
        Ok(success_one_ok(record).into_response())
    } else {
        Ok(success_many(cursor.into_records()).into_response())
    }
}

pub async fn create(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let path = ResourcePath::parse(&path);
    let values = body_to_values(body)?;
    let uri = state.resolver.insert(&path, values).await?;
    Ok(created(uri.to_string(), format!("/content{}", uri)))
}

pub async fn update(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
    Json(body): Json<serde_json::Value>,
) -> Result<impl IntoResponse, AppError> {
    let path = ResourcePath::parse(&path);
    let entity = state.resolver.entity_for(&path)?;
    let selection = mutation_filters(entity, &params)?;
    let values = body_to_values(body)?;
    let updated = state.resolver.update(&path, values, selection).await?;
    Ok(success_one_ok(json!({ "updated": updated })))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(path): Path<String>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, AppError> {
    let path = ResourcePath::parse(&path);
    let entity = state.resolver.entity_for(&path)?;
    let selection = mutation_filters(entity, &params)?;
    let deleted = state.resolver.delete(&path, selection).await?;
    Ok(success_one_ok(json!({ "deleted": deleted })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::message_entity;

    #[test]
    fn sort_and_filters_are_checked_against_columns() {
        let e = message_entity();
        assert_eq!(sort_for(&e, "-_id,subject").unwrap(), "\"_id\" DESC, \"subject\" ASC");
        assert!(sort_for(&e, "nope").is_err());

        let params: BTreeMap<String, String> = [("thread_id", "4"), ("sort", "subject")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let args = query_args(&e, &params).unwrap();
        assert_eq!(args.selection.args, vec![Value::Integer(4)]);
        assert_eq!(args.sort_order.as_deref(), Some("\"subject\" ASC"));
        assert!(mutation_filters(&e, &params).is_err());

        let bad: BTreeMap<String, String> = [("thread_id".to_string(), "four".to_string())].into_iter().collect();
        assert!(matches!(query_args(&e, &bad), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn body_must_be_an_object() {
        assert!(body_to_values(json!([1])).is_err());
        let v = body_to_values(json!({"subject": "hi", "n": 2})).unwrap();
        assert_eq!(v["n"], Value::Integer(2));
    }
}
