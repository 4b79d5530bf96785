use axum::{
    Router, middleware,
    routing::{get, post, put},
};
use tower_http::trace::TraceLayer;

use crate::auth::{optional_api_token, require_api_token};
use crate::handlers::{admin, allocation, chat, health_handler};
use crate::infra::app_state::AppState;

/// Versioned API routes.
pub fn create_api_router(state: AppState) -> Router<AppState> {
    Router::new().nest("/api/v1", create_v1_router(state))
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    Router::new()
        .merge(create_requester_routes(state.clone()))
        .merge(create_admin_routes(state))
}

/// Allocation and clearing. Open unless a token is configured.
fn create_requester_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/allocate/{kind}", post(allocation::allocate))
        .route("/obligations/clear", post(allocation::clear_obligation))
        .route_layer(middleware::from_fn_with_state(state, optional_api_token))
}

/// Routes that act on behalf of admins or trust a caller-supplied
/// requester id. Always token-gated.
fn create_admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/command", post(chat::command))
        .route("/directory/edits", post(admin::edit_directory))
        .route(
            "/priority/{owner}",
            put(admin::set_priority).delete(admin::remove_priority),
        )
        .route("/bans", get(admin::list_bans))
        .route("/bans/{requester_id}", post(admin::ban).delete(admin::unban))
        .route("/owners/lookup", get(admin::lookup_owner))
        .route(
            "/requesters/{requester_id}/activity",
            get(admin::requester_activity),
        )
        .route("/status", get(admin::status))
        .route_layer(middleware::from_fn_with_state(state, require_api_token))
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(create_api_router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
