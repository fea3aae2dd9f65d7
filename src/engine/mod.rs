//! Fetch engine module
//!
//! This module contains everything that talks to the network:
//! - Task and outcome types (`FetchTask`, `FetchOutcome`)
//! - HTTP fetching and error classification
//! - Request fingerprints and the duplicate filter
//! - The persistent engine loop and its supervisor

mod core;
mod fetcher;
mod fingerprint;
mod supervisor;
mod task;

pub use self::core::{EngineState, FetchEngine, IdleVerdict};
pub use fetcher::{build_http_client, execute};
pub use fingerprint::{canonicalize_url, request_fingerprint, DupeFilter};
pub use supervisor::EngineSupervisor;
pub use task::{
    FailureKind, FetchFailure, FetchOutcome, FetchTask, FetchTaskParams, FetchedDocument,
    HeaderValues, OutcomeSink, RequestId, StatusPolicy, WorkerId,
};
