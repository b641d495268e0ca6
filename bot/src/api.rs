use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;
use starfall_engine::session::ThrowEmitter;
use starfall_engine::store::Store;
use starfall_types::{Command, Event};

use crate::dispatch::Dispatcher;

/// Shared state behind the ingress router.
pub struct AppState<S: Store, E: ThrowEmitter> {
    pub dispatcher: Dispatcher<S, E>,
    pub registry: Registry,
}

/// Ingress for the external transport: decoded commands in, events out,
/// plus health and metrics endpoints.
pub fn router<S, E>(state: Arc<AppState<S, E>>) -> Router
where
    S: Store + 'static,
    E: ThrowEmitter + 'static,
{
    Router::new()
        .route("/commands", post(commands::<S, E>))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics::<S, E>))
        .with_state(state)
}

async fn commands<S, E>(
    State(state): State<Arc<AppState<S, E>>>,
    Json(command): Json<Command>,
) -> Json<Vec<Event>>
where
    S: Store + 'static,
    E: ThrowEmitter + 'static,
{
    Json(state.dispatcher.dispatch(command).await)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn metrics<S, E>(State(state): State<Arc<AppState<S, E>>>) -> Result<String, StatusCode>
where
    S: Store + 'static,
    E: ThrowEmitter + 'static,
{
    let mut body = String::new();
    encode(&mut body, &state.registry).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(body)
}
