//! Correlation of held-open connections with in-flight fetches
//!
//! Every inbound call registers a pending record keyed by a fresh
//! `RequestId`. The record owns the sending half of the connection's
//! completion channel. Completing removes the record from the table, so a
//! second completion for the same id finds nothing and is rejected.

use crate::engine::RequestId;
use crate::server::params::FetchRequestParams;
use crate::server::payload::ResponsePayload;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// What a continuation knows about the request it answers
#[derive(Debug, Clone)]
pub struct CorrelationContext {
    pub id: RequestId,
    pub params: Arc<FetchRequestParams>,
}

/// Result of a completion attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The payload was handed to the waiting connection
    Delivered,
    /// The client went away before the payload was ready
    ClientGone,
    /// The request was already completed (or never registered)
    AlreadyCompleted,
}

struct PendingRecord {
    context: CorrelationContext,
    responder: oneshot::Sender<ResponsePayload>,
}

/// Concurrent table of requests awaiting their one response
#[derive(Default)]
pub struct PendingTable {
    records: DashMap<RequestId, PendingRecord>,
    completed: AtomicU64,
    rejected: AtomicU64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new request and returns the receiver its connection waits on
    pub fn register(
        &self,
        params: FetchRequestParams,
    ) -> (CorrelationContext, oneshot::Receiver<ResponsePayload>) {
        let (responder, receiver) = oneshot::channel();
        let context = CorrelationContext {
            id: RequestId::new(),
            params: Arc::new(params),
        };

        self.records.insert(
            context.id,
            PendingRecord {
                context: context.clone(),
                responder,
            },
        );
        debug!(request = %context.id, url = %context.params.request.url, "registered request");

        (context, receiver)
    }

    /// Context of a request that has not been completed yet
    pub fn context(&self, id: RequestId) -> Option<CorrelationContext> {
        self.records.get(&id).map(|record| record.context.clone())
    }

    /// Completes a request with its payload
    ///
    /// Only the first call for an id delivers anything; later calls are
    /// rejected and counted.
    pub fn complete(&self, id: RequestId, payload: ResponsePayload) -> Completion {
        let Some((_, record)) = self.records.remove(&id) else {
            self.rejected.fetch_add(1, Ordering::SeqCst);
            warn!(request = %id, "request already completed, dropping response");
            return Completion::AlreadyCompleted;
        };

        self.completed.fetch_add(1, Ordering::SeqCst);
        match record.responder.send(payload) {
            Ok(()) => {
                debug!(request = %id, "request completed");
                Completion::Delivered
            }
            Err(_) => {
                warn!(request = %id, "client disconnected before the response was ready");
                Completion::ClientGone
            }
        }
    }

    /// Drops the record of a request whose connection gave up waiting
    pub fn abandon(&self, id: RequestId) -> bool {
        self.records.remove(&id).is_some()
    }

    /// Requests still waiting for a response
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Requests completed (delivered or client gone)
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Completion attempts refused because the request was already done
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::SeqCst)
    }
}
