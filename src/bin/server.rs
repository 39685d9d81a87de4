//! Provider server: loads settings from the environment and the schema from `SCHEMA_PATH`,
//! opens the store at `SCHEMA_VERSION`, and serves common and content routes.

use axum::Router;
use provider_sdk::{
    common_routes_with_ready, connect, content_routes, load_from_path, resolve, AppState, ContentResolver, Settings,
};
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("provider_sdk=info".parse()?))
        .init();

    let settings = Settings::from_env()?;
    let config = load_from_path(&settings.schema_path).await?;
    let registry = resolve(&config)?;
    let pool = connect(&settings).await?;
    let resolver = ContentResolver::new(registry, pool)?;
    resolver.open(settings.schema_version).await?;
    let state = AppState::new(resolver);

    let app = Router::new()
        .merge(common_routes_with_ready(state.clone()))
        .merge(content_routes(state))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
