//! The fetch endpoint
//!
//! `POST /bot/fetch` parses the call, registers it in the pending table,
//! schedules one fetch on the shared engine and holds the connection open
//! until the outcome handler completes it.

use crate::engine::{FetchEngine, FetchTask, WorkerId};
use crate::server::params::parse_fetch_request;
use crate::server::pending::PendingTable;
use crate::server::payload::ResponsePayload;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::Router;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shared state of the endpoint
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<FetchEngine>,
    /// Identity every fetch is scheduled under
    pub worker: WorkerId,
    pub pending: Arc<PendingTable>,
}

impl AppState {
    pub fn new(engine: Arc<FetchEngine>, pending: Arc<PendingTable>) -> Self {
        let worker = engine.worker().clone();
        Self {
            engine,
            worker,
            pending,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/bot/fetch", post(handle_fetch))
        .with_state(state)
}

/// Handles one fetch call
///
/// Malformed bodies are answered right away. Everything else is answered by
/// whichever outcome continuation completes the request.
pub async fn handle_fetch(State(state): State<AppState>, body: Bytes) -> ResponsePayload {
    let params = match parse_fetch_request(&body) {
        Ok(params) => params,
        Err(e) => {
            warn!("rejecting fetch call: {}", e);
            return ResponsePayload::error(e.to_string());
        }
    };

    let (context, receiver) = state.pending.register(params);
    let task = FetchTask::new(context.id, context.params.request.clone())
        .accept_all_statuses()
        .dont_filter();

    debug!(
        request = %context.id,
        worker = %state.worker,
        method = %task.params.method,
        url = %task.params.url,
        "scheduling fetch"
    );
    state.engine.schedule(task, &state.worker);

    match receiver.await {
        Ok(payload) => payload,
        Err(_) => {
            state.pending.abandon(context.id);
            error!(request = %context.id, "fetch was abandoned without a response");
            ResponsePayload::error("unexpected internal error: fetch was abandoned without a response")
        }
    }
}
