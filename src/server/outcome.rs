//! Outcome handling
//!
//! Turns the engine's `FetchOutcome` for a request into the one payload its
//! connection receives. The success arm classifies the document, runs
//! extraction when a spec exists and renders the page; the failure arm
//! reports what the engine said.

use crate::config::ClassificationPolicy;
use crate::engine::{FetchFailure, FetchOutcome, FetchedDocument, OutcomeSink, RequestId};
use crate::extraction::ExtractorAdapter;
use crate::server::pending::{CorrelationContext, PendingTable};
use crate::server::payload::ResponsePayload;
use crate::ExtractionResult;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Checks that a fetched document is a page worth rendering
///
/// Returns the client-facing reason when it is not.
pub fn classify(document: &FetchedDocument) -> Result<(), String> {
    if document.status != 200 {
        return Err(format!("Received http {}", document.status));
    }
    if !document.is_html() {
        return Err(format!(
            "Non-html response: {}",
            document.content_type.as_deref().unwrap_or("no content type")
        ));
    }
    Ok(())
}

/// Completes pending requests from engine outcomes
pub struct OutcomeHandler {
    pending: Arc<PendingTable>,
    adapter: ExtractorAdapter,
    policy: ClassificationPolicy,
}

impl OutcomeHandler {
    pub fn new(
        pending: Arc<PendingTable>,
        adapter: ExtractorAdapter,
        policy: ClassificationPolicy,
    ) -> Self {
        Self {
            pending,
            adapter,
            policy,
        }
    }

    pub fn policy(&self) -> ClassificationPolicy {
        self.policy
    }

    fn on_success(&self, id: RequestId, document: FetchedDocument) {
        let Some(context) = self.pending.context(id) else {
            warn!(request = %id, url = %document.url, "no pending request for fetched document");
            return;
        };
        debug!(request = %id, url = %document.url, status = document.status, "document received");

        if let Err(reason) = classify(&document) {
            warn!(request = %id, url = %document.url, "{}", reason);
            self.pending.complete(id, ResponsePayload::error(reason));
            if self.policy == ClassificationPolicy::ShortCircuit {
                return;
            }
        }

        let rendered = catch_unwind(AssertUnwindSafe(|| self.render(&context, document)));
        let payload = match rendered {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => {
                error!(request = %id, "extraction failed: {}", e);
                ResponsePayload::error(format!("unexpected internal error: {}", e))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(request = %id, "extraction panicked: {}", message);
                ResponsePayload::error(format!("unexpected internal error: {}", message))
            }
        };

        self.pending.complete(id, payload);
    }

    fn on_failure(&self, id: RequestId, failure: FetchFailure) {
        let url = self
            .pending
            .context(id)
            .map(|context| context.params.request.url.clone())
            .unwrap_or_default();
        error!(request = %id, url = %url, kind = ?failure.kind, "fetch failed: {}", failure);

        self.pending.complete(
            id,
            ResponsePayload::error(format!("unexpected error response: {}", failure)),
        );
    }

    fn render(
        &self,
        context: &CorrelationContext,
        document: FetchedDocument,
    ) -> ExtractionResult<ResponsePayload> {
        let params = &context.params;
        let items = self.adapter.build_and_extract(
            params.project.as_deref(),
            params.spider.as_deref(),
            &document,
        )?;
        Ok(ResponsePayload::page(document.body, items))
    }
}

impl OutcomeSink for OutcomeHandler {
    fn deliver(&self, id: RequestId, outcome: FetchOutcome) {
        match outcome {
            Ok(document) => self.on_success(id, document),
            Err(failure) => self.on_failure(id, failure),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "extractor panicked".to_string()
    }
}
