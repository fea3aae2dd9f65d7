//! Control endpoint module
//!
//! Bridges inbound HTTP calls to the fetch engine:
//! - `params`: request schema and validation
//! - `pending`: correlation table completing each connection once
//! - `outcome`: the engine's outcome sink (classify, extract, complete)
//! - `handler`: the axum endpoint and router
//! - `payload`: the JSON response

mod handler;
mod outcome;
mod params;
mod payload;
mod pending;

pub use handler::{build_router, handle_fetch, AppState};
pub use outcome::{classify, OutcomeHandler};
pub use params::{parse_fetch_request, FetchRequestParams};
pub use payload::ResponsePayload;
pub use pending::{Completion, CorrelationContext, PendingTable};

use crate::config::{validate, Config};
use crate::engine::EngineSupervisor;
use crate::extraction::{ExtractorAdapter, SpecProvider};
use crate::BotError;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Everything a running bot is made of
pub struct BotService {
    pub supervisor: EngineSupervisor,
    pub router: Router,
    pub pending: Arc<PendingTable>,
}

/// Wires the pending table, outcome handler, engine and router together
///
/// The configuration is validated first, since it may not come from
/// `load_config`. Starts the engine, so this must run inside a Tokio runtime.
pub fn build_service(
    config: &Config,
    provider: Arc<dyn SpecProvider>,
) -> Result<BotService, BotError> {
    validate(config)?;

    let pending = Arc::new(PendingTable::new());
    let handler = OutcomeHandler::new(
        Arc::clone(&pending),
        ExtractorAdapter::new(provider),
        config.extraction.classification,
    );

    let supervisor = EngineSupervisor::start(config, Arc::new(handler))?;
    let state = AppState::new(Arc::clone(supervisor.engine()), Arc::clone(&pending));

    Ok(BotService {
        supervisor,
        router: build_router(state),
        pending,
    })
}

/// Serves the router until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), BotError>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
