//! Shared application state for all routes.

use crate::resolver::ContentResolver;
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub resolver: Arc<ContentResolver>,
}

impl AppState {
    pub fn new(resolver: ContentResolver) -> Self {
        Self {
            pool: resolver.pool().clone(),
            resolver: Arc::new(resolver),
        }
    }
}
