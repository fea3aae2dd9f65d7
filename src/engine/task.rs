//! Fetch task and outcome types
//!
//! A `FetchTask` is one request to retrieve a single resource. The engine
//! answers every task exactly once with a `FetchOutcome`, handed to the
//! registered `OutcomeSink` together with the task's `RequestId`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Immutable correlation token linking a fetch task to the caller awaiting it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the long-lived worker that tasks are scheduled under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId(Arc<str>);

impl WorkerId {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A header value supplied either as a single string or as a list
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum HeaderValues {
    One(String),
    Many(Vec<String>),
}

impl HeaderValues {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let values: &[String] = match self {
            Self::One(value) => std::slice::from_ref(value),
            Self::Many(values) => values,
        };
        values.iter().map(String::as_str)
    }
}

/// Caller-supplied description of the resource to fetch
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchTaskParams {
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    #[serde(default)]
    pub headers: BTreeMap<String, HeaderValues>,

    #[serde(default)]
    pub body: Option<String>,

    /// Sent as a single `Cookie` header
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,

    /// Charset used to decode the page when the response does not declare one
    ///
    /// Unlike a Scrapy `Request(encoding=...)`, this never changes how the URL
    /// or request body are encoded; it only picks the fallback charset for
    /// the response text. A charset in the response's Content-Type wins.
    #[serde(default)]
    pub encoding: Option<String>,

    /// Engine-specific fields the bot passes through without interpreting
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl FetchTaskParams {
    /// Convenience constructor for a plain GET
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            headers: BTreeMap::new(),
            body: None,
            cookies: BTreeMap::new(),
            encoding: None,
            extra: Map::new(),
        }
    }
}

/// Which response statuses count as a fetched document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    /// Every status is delivered as a document
    AcceptAll,
    /// Non-2xx statuses are delivered as an `Http` failure
    SuccessOnly,
}

/// One fetch submitted to the engine
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub id: RequestId,
    pub params: FetchTaskParams,
    pub status_policy: StatusPolicy,
    /// Skips the duplicate filter when set
    pub dont_filter: bool,
}

impl FetchTask {
    pub fn new(id: RequestId, params: FetchTaskParams) -> Self {
        Self {
            id,
            params,
            status_policy: StatusPolicy::SuccessOnly,
            dont_filter: false,
        }
    }

    pub fn accept_all_statuses(mut self) -> Self {
        self.status_policy = StatusPolicy::AcceptAll;
        self
    }

    pub fn dont_filter(mut self) -> Self {
        self.dont_filter = true;
        self
    }
}

/// A document delivered by the engine once its content has fully arrived
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    /// Body decoded to text
    pub body: String,
}

impl FetchedDocument {
    /// Returns true if the document is an HTML (or XHTML) page
    ///
    /// Without a Content-Type header the body is sniffed for an `<html` tag.
    pub fn is_html(&self) -> bool {
        match &self.content_type {
            Some(content_type) => {
                let mime = content_type
                    .split(';')
                    .next()
                    .unwrap_or("")
                    .trim()
                    .to_ascii_lowercase();
                matches!(
                    mime.as_str(),
                    "text/html" | "application/xhtml+xml" | "application/vnd.wap.xhtml+xml"
                )
            }
            None => {
                let head: String = self.body.chars().take(1024).collect();
                head.to_ascii_lowercase().contains("<html")
            }
        }
    }
}

/// Why the engine could not produce a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection refused, DNS failure, TLS error
    Connect,
    Timeout,
    /// Status rejected by `StatusPolicy::SuccessOnly`
    Http(u16),
    /// Dropped by the duplicate filter
    Filtered,
    /// The engine was not running when the task reached it
    EngineStopped,
    /// The task named a worker the engine has not opened
    WorkerClosed,
    /// The request could not be built or sent
    Request,
}

/// A fetch that produced no document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub description: String,
}

impl FetchFailure {
    pub fn new(kind: FailureKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// Result of a fetch task: the success and failure continuations are the
/// two arms of this type
pub type FetchOutcome = Result<FetchedDocument, FetchFailure>;

/// Receives the outcome of every task, exactly once per task
pub trait OutcomeSink: Send + Sync {
    fn deliver(&self, id: RequestId, outcome: FetchOutcome);
}
