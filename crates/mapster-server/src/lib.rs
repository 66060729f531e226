//! Mapster Server - Shared map API
//!
//! HTTP surface over mapster-core. Every route requires a bearer token.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;

use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use mapster_core::{CellService, JoinCodeGenerator, MapService, SqliteStorage};

pub use auth::{AuthUser, IdentityProvider, StaticTokens};
pub use config::ServerConfig;
pub use error::{ApiError, ServerError};

/// Shared application state
pub struct AppState {
    pub maps: MapService<Arc<SqliteStorage>>,
    pub cells: CellService<Arc<SqliteStorage>>,
    pub identity: Box<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        storage: SqliteStorage,
        join_codes: JoinCodeGenerator,
        identity: impl IdentityProvider + 'static,
    ) -> Self {
        let storage = Arc::new(storage);
        Self {
            maps: MapService::new(Arc::clone(&storage), join_codes),
            cells: CellService::new(storage),
            identity: Box::new(identity),
        }
    }

    /// Open storage and build the token table from configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ServerError> {
        config.validate()?;

        let storage = match &config.database_path {
            Some(path) => {
                tracing::info!("Opening map database at {:?}", path);
                SqliteStorage::open(path, &config.core.storage)?
            }
            None => {
                tracing::warn!("No database_path configured, maps will not survive a restart");
                SqliteStorage::open_in_memory(&config.core.storage)?
            }
        };
        if config.tokens.is_empty() {
            tracing::warn!("No tokens configured, every request will be rejected");
        }

        Ok(Self::new(
            storage,
            JoinCodeGenerator::from_os_rng(&config.core.join_code)?,
            StaticTokens::new(config.tokens.clone()),
        ))
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Map endpoints
        .route("/api/maps", get(http::list_maps).post(http::create_map))
        .route(
            "/api/maps/{id}",
            get(http::get_map)
                .put(http::update_map)
                .delete(http::delete_map),
        )
        // Join codes
        .route("/api/maps/join", post(http::join_map))
        .route("/api/maps/join/{code}", get(http::get_map_by_join_code))
        // Membership endpoints
        .route("/api/maps/{id}/members", get(http::list_members))
        .route("/api/maps/{id}/members/{user_id}", delete(http::remove_member))
        .route(
            "/api/maps/{id}/members/{user_id}/promote",
            post(http::promote_member),
        )
        .route(
            "/api/maps/{id}/members/{user_id}/demote",
            post(http::demote_member),
        )
        .route("/api/maps/{id}/transfer", post(http::transfer_ownership))
        // Grid cells
        .route(
            "/api/grid-cells/{map_id}/{row}/{col}",
            get(http::get_cell).post(http::save_cell),
        )
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Start the server
pub async fn serve(addr: &str, state: Arc<AppState>) -> Result<(), ServerError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Mapster server listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
