//! Content routes: every resource path under `/content`, dispatched by the resolver.

use crate::handlers::content::{create, delete as delete_handler, read, update};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn content_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/content/*path",
            get(read).post(create).patch(update).delete(delete_handler),
        )
        .with_state(state)
}
