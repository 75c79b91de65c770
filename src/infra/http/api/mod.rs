pub mod error;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::RouterState;
use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: RouterState) -> Router<RouterState> {
    Router::new()
        .route(
            "/api/playlists",
            get(handlers::list_playlists).post(handlers::create_playlist),
        )
        .route("/api/playlists/{id}", get(handlers::get_playlist))
        .route(
            "/api/playlists/{id}/detail",
            get(handlers::get_playlist_detail),
        )
        .route(
            "/api/playlists/{id}/upvote",
            post(handlers::upvote_playlist),
        )
        .route(
            "/api/external/{external_id}",
            get(handlers::get_external),
        )
        .route("/api/search", get(handlers::search))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
