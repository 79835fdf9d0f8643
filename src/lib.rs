pub mod config;
pub mod db;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod response;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use axum::http::{Request, StatusCode};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::users::PgUserRepository;
use crate::error::StartupError;
use crate::lifecycle::{Lifecycle, ShutdownOutcome};
use crate::state::{AppState, SharedState};

pub fn build_app(state: SharedState, request_timeout: Duration) -> Router {
    Router::new()
        .merge(routes::api_routes())
        .merge(routes::health_routes())
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                let request_id = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("-");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %request_id,
                )
            }),
        )
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Connect to the store, bind the listener and serve until SIGINT/SIGTERM.
pub async fn run(config: Config) -> Result<ShutdownOutcome, StartupError> {
    let signal = CancellationToken::new();
    tokio::spawn({
        let signal = signal.clone();
        async move {
            lifecycle::shutdown_signal().await;
            signal.cancel();
        }
    });

    let lifecycle = Lifecycle::new(config.shutdown);

    let pool = db::connect(&config.database, &signal).await?;

    let state: SharedState = Arc::new(AppState {
        users: Arc::new(PgUserRepository::new(pool.clone())),
        readiness: lifecycle.readiness(),
    });
    let app = build_app(state, config.http.request_timeout);

    let addr = config.http.address;
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| StartupError::Bind { addr, source })?;

    let outcome = lifecycle
        .run(listener, app, signal.cancelled_owned())
        .await
        .map_err(StartupError::Server)?;

    pool.close().await;
    Ok(outcome)
}
