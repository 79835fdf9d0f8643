pub mod health;
pub mod users;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

/// User CRUD. The verbs (GET for delete, POST for update) are part of the
/// published contract and kept as-is for existing clients.
pub fn api_routes() -> Router<SharedState> {
    Router::new()
        .route("/user/", post(users::create))
        .route("/user/{id}", get(users::get))
        .route("/user/update/{id}", post(users::update))
        .route("/user/delete/{id}", get(users::delete))
}

pub fn health_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health::live))
        .route("/health/ready", get(health::ready))
}
