//! Dispatches path-addressed requests to the helper registered for the path's shape.

use crate::config::{ResolvedEntity, ResolvedRelationship, SchemaRegistry};
use crate::cursor::Cursor;
use crate::error::{AppError, ConfigError};
use crate::path::ResourcePath;
use crate::service::{DbHelper, ForeignKeyDbHelper, GenericDbHelper, M2MDbHelper, M2MManager, QueryArgs};
use crate::sql::{ContentValues, Selection};
use crate::store;
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// Any single segment: an id or the wildcard.
    Any,
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Literal(s) => f.write_str(s),
            Segment::Any => f.write_str("#"),
        }
    }
}

/// Whether a route addresses a collection or one item in it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    Dir,
    Item,
}

struct Route {
    pattern: Vec<Segment>,
    kind: RouteKind,
    helper: Arc<dyn DbHelper>,
}

impl Route {
    fn matches(&self, path: &ResourcePath) -> bool {
        self.pattern.len() == path.len()
            && self.pattern.iter().zip(path.segments()).all(|(p, s)| match p {
                Segment::Literal(l) => l == s,
                Segment::Any => true,
            })
    }
}

fn pattern_string(pattern: &[Segment]) -> String {
    pattern.iter().map(|s| format!("/{}", s)).collect()
}

/// A relationship waiting to be mounted under its parent's collection routes.
struct Edge {
    parent: String,
    child: String,
    segment: String,
    helper: Arc<dyn DbHelper>,
}

/// Request dispatcher over a schema registry and a pool.
///
/// Routes, in registration order: `/{path}` and `/{path}/#` per addressable entity, then each
/// relationship as `{parent_dir}/#/{child}[/#]` below every collection route that serves its
/// parent, so `/thread/#/message/#/tag` exists when message rows are reachable under threads.
pub struct ContentResolver {
    pool: SqlitePool,
    registry: Arc<SchemaRegistry>,
    routes: Vec<Route>,
    /// Create and upgrade order; one helper per managed table.
    schema_helpers: Vec<Arc<dyn DbHelper>>,
}

impl ContentResolver {
    pub fn new(registry: SchemaRegistry, pool: SqlitePool) -> Result<Self, ConfigError> {
        let mut resolver = ContentResolver {
            pool,
            registry: Arc::new(registry),
            routes: Vec::new(),
            schema_helpers: Vec::new(),
        };
        let registry = resolver.registry.clone();

        let mut roots = Vec::new();
        for entity in &registry.entities {
            let helper: Arc<dyn DbHelper> = Arc::new(GenericDbHelper::new(entity.clone()));
            resolver.add_schema_helper(helper.clone());
            if let Some(seg) = &entity.path_segment {
                let dir = vec![Segment::Literal(seg.clone())];
                resolver.add_collection(dir.clone(), helper)?;
                roots.push((dir, entity.id.as_str()));
            }
        }

        let mut edges = Vec::new();
        for relationship in &registry.relationships {
            let (helper, parent, child) = match relationship {
                ResolvedRelationship::ForeignKey(fk) => {
                    let helper: Arc<dyn DbHelper> = Arc::new(ForeignKeyDbHelper::new(fk));
                    (helper, &fk.parent, &fk.child)
                }
                ResolvedRelationship::ManyToMany(m2m) => {
                    let helper: Arc<dyn DbHelper> = Arc::new(M2MDbHelper::new(m2m));
                    (helper, &m2m.from, &m2m.to)
                }
            };
            parent.require_path()?;
            let segment = child.require_path()?.to_string();
            resolver.add_schema_helper(helper.clone());
            edges.push(Edge {
                parent: parent.id.clone(),
                child: child.id.clone(),
                segment,
                helper,
            });
        }
        resolver.mount_relationships(roots, &edges)?;

        tracing::debug!(routes = resolver.routes.len(), "content routes registered");
        Ok(resolver)
    }

    /// Schema management goes to the first helper registered for a table. The generic helper of
    /// a foreign-key child comes first and manages the same table its relation helper would.
    fn add_schema_helper(&mut self, helper: Arc<dyn DbHelper>) {
        if !self.schema_helpers.iter().any(|h| h.table() == helper.table()) {
            self.schema_helpers.push(helper);
        }
    }

    /// Breadth-first from the top-level collections. A relationship is used at most once along a
    /// path, which bounds self-joins and cycles.
    fn mount_relationships(&mut self, roots: Vec<(Vec<Segment>, &str)>, edges: &[Edge]) -> Result<(), ConfigError> {
        let mut pending: VecDeque<(Vec<Segment>, &str, Vec<usize>)> =
            roots.into_iter().map(|(dir, id)| (dir, id, Vec::new())).collect();
        while let Some((dir, entity, used)) = pending.pop_front() {
            for (i, edge) in edges.iter().enumerate() {
                if edge.parent != entity || used.contains(&i) {
                    continue;
                }
                let mut nested = dir.clone();
                nested.push(Segment::Any);
                nested.push(Segment::Literal(edge.segment.clone()));
                self.add_collection(nested.clone(), edge.helper.clone())?;
                let mut chain = used.clone();
                chain.push(i);
                pending.push_back((nested, edge.child.as_str(), chain));
            }
        }
        Ok(())
    }

    /// Register `dir` and `dir/#`.
    fn add_collection(&mut self, dir: Vec<Segment>, helper: Arc<dyn DbHelper>) -> Result<(), ConfigError> {
        let mut item = dir.clone();
        item.push(Segment::Any);
        self.add_route(dir, RouteKind::Dir, helper.clone())?;
        self.add_route(item, RouteKind::Item, helper)
    }

    fn add_route(&mut self, pattern: Vec<Segment>, kind: RouteKind, helper: Arc<dyn DbHelper>) -> Result<(), ConfigError> {
        if self.routes.iter().any(|r| r.pattern == pattern) {
            return Err(ConfigError::DuplicatePathSegment(pattern_string(&pattern)));
        }
        self.routes.push(Route { pattern, kind, helper });
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn route(&self, path: &ResourcePath) -> Result<&Route, AppError> {
        self.routes
            .iter()
            .find(|r| r.matches(path))
            .ok_or_else(|| AppError::NotFound(format!("no resource at {}", path)))
    }

    pub fn route_kind(&self, path: &ResourcePath) -> Result<RouteKind, AppError> {
        Ok(self.route(path)?.kind)
    }

    pub fn is_item(&self, path: &ResourcePath) -> Result<bool, AppError> {
        Ok(self.route_kind(path)? == RouteKind::Item)
    }

    /// Entity whose rows the path returns.
    pub fn entity_for(&self, path: &ResourcePath) -> Result<&Arc<ResolvedEntity>, AppError> {
        Ok(self.route(path)?.helper.entity())
    }

    /// Manager for the `from` -> `to` many-to-many relationship.
    pub fn many_to_many(&self, from: &str, to: &str) -> Result<M2MManager, ConfigError> {
        self.registry
            .relationships
            .iter()
            .find_map(|r| match r {
                ResolvedRelationship::ManyToMany(m) if m.from.id == from && m.to.id == to => {
                    Some(M2MManager::new(m.to.clone()))
                }
                _ => None,
            })
            .ok_or_else(|| ConfigError::MissingReference {
                kind: "many_to_many relationship",
                id: format!("{}->{}", from, to),
            })
    }

    /// Insert at a collection path; returns the new item's path.
    pub async fn insert(&self, path: &ResourcePath, values: ContentValues) -> Result<ResourcePath, AppError> {
        let route = self.route(path)?;
        match route.kind {
            RouteKind::Dir => route.helper.insert_dir(&self.pool, path, values).await,
            RouteKind::Item => Err(AppError::BadRequest(format!("cannot insert at item path {}", path))),
        }
    }

    pub async fn query(&self, path: &ResourcePath, args: &QueryArgs) -> Result<Cursor, AppError> {
        let route = self.route(path)?;
        match route.kind {
            RouteKind::Dir => route.helper.query_dir(&self.pool, path, args).await,
            RouteKind::Item => route.helper.query_item(&self.pool, path, args).await,
        }
    }

    pub async fn update(
        &self,
        path: &ResourcePath,
        values: ContentValues,
        selection: Selection,
    ) -> Result<u64, AppError> {
        let route = self.route(path)?;
        match route.kind {
            RouteKind::Dir => route.helper.update_dir(&self.pool, path, values, selection).await,
            RouteKind::Item => route.helper.update_item(&self.pool, path, values, selection).await,
        }
    }

    pub async fn delete(&self, path: &ResourcePath, selection: Selection) -> Result<u64, AppError> {
        let route = self.route(path)?;
        match route.kind {
            RouteKind::Dir => route.helper.delete_dir(&self.pool, path, selection).await,
            RouteKind::Item => route.helper.delete_item(&self.pool, path, selection).await,
        }
    }

    pub async fn create_tables(&self) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.create_tables_on(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Upgrade every managed table in one transaction; on failure nothing is dropped.
    pub async fn upgrade_tables(&self, old: i64, new: i64) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;
        self.upgrade_tables_on(&mut tx, old, new).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn create_tables_on(&self, conn: &mut SqliteConnection) -> Result<(), AppError> {
        for helper in &self.schema_helpers {
            helper.create_tables(&mut *conn).await?;
        }
        Ok(())
    }

    async fn upgrade_tables_on(&self, conn: &mut SqliteConnection, old: i64, new: i64) -> Result<(), AppError> {
        tracing::info!(old, new, "upgrading schema");
        // Foreign keys are checked at commit, after every table has been rebuilt.
        sqlx::query("PRAGMA defer_foreign_keys = ON").execute(&mut *conn).await?;
        for helper in &self.schema_helpers {
            helper.upgrade_tables(&mut *conn, old, new).await?;
        }
        Ok(())
    }

    /// Bring the store to `version`: create on a fresh store, upgrade an older one, refuse a newer one.
    /// Table changes and the version bump commit together.
    pub async fn open(&self, version: i64) -> Result<(), AppError> {
        if version < 1 {
            return Err(ConfigError::Validation(format!("schema version must be at least 1, got {}", version)).into());
        }
        let mut tx = self.pool.begin().await?;
        let current = store::schema_version(&mut *tx).await?;
        if current > version {
            return Err(ConfigError::Validation(format!(
                "database schema version {} is newer than {}",
                current, version
            ))
            .into());
        }
        if current == 0 {
            self.create_tables_on(&mut tx).await?;
        } else if current < version {
            self.upgrade_tables_on(&mut tx, current, version).await?;
        } else {
            // Same version: ensure join tables and any table dropped out of band.
            self.create_tables_on(&mut tx).await?;
        }
        if current != version {
            store::set_schema_version(&mut *tx, version).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}
