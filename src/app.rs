use crate::state::AppState;
use crate::{control, status};
use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Control API
        .route("/control/v1/sync", post(control::sync))
        .route(
            "/control/v1/servers/{host}",
            put(control::put_server).delete(control::delete_server),
        )
        .route(
            "/control/v1/servers/{host}/cleanup",
            post(control::cleanup),
        )
        .route(
            "/control/v1/accounts/{name}",
            put(control::put_account)
                .patch(control::patch_account)
                .delete(control::delete_account),
        )
        .route(
            "/control/v1/accounts/{name}/password",
            put(control::put_password),
        )
        .route(
            "/control/v1/accounts/{name}/sync",
            post(control::sync_account),
        )
        .route(
            "/control/v1/accounts/{name}/backups",
            post(control::create_backup),
        )
        .route(
            "/control/v1/accounts/{name}/restore",
            post(control::restore_backup),
        )
        // Status API
        .route("/status/v1/health", get(status::health))
        .route("/status/v1/servers/{host}", get(status::server_status))
        .route(
            "/status/v1/servers/{host}/configurations",
            get(status::server_configurations),
        )
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
