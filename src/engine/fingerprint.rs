//! Request fingerprints and the duplicate filter
//!
//! Two tasks are duplicates when they share method, canonical URL and body.
//! The canonical URL drops the fragment and sorts query parameters, so
//! `?b=2&a=1#top` and `?a=1&b=2` fingerprint the same.

use crate::engine::task::FetchTaskParams;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Mutex;
use url::Url;

/// Canonicalizes a URL for fingerprinting
///
/// Unparseable URLs are returned unchanged so they still fingerprint
/// deterministically.
pub fn canonicalize_url(url_str: &str) -> String {
    let mut url = match Url::parse(url_str) {
        Ok(url) => url,
        Err(_) => return url_str.to_string(),
    };

    url.set_fragment(None);

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    url.to_string()
}

/// Computes the hex-encoded SHA-256 fingerprint of a request
pub fn request_fingerprint(params: &FetchTaskParams) -> String {
    let mut hasher = Sha256::new();
    hasher.update(params.method.to_ascii_uppercase().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonicalize_url(&params.url).as_bytes());
    hasher.update(b"\n");
    hasher.update(params.body.as_deref().unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Remembers every fingerprint seen for the engine's lifetime
///
/// Nothing is ever evicted: one 64-byte hex fingerprint is kept per distinct
/// filtered request until the engine is dropped. Tasks marked `dont_filter`
/// (everything the fetch endpoint schedules) never reach the set, so only
/// library callers scheduling filtered tasks pay this cost.
#[derive(Debug, Default)]
pub struct DupeFilter {
    seen: Mutex<HashSet<String>>,
}

impl DupeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the request and returns true if it was not seen before
    pub fn insert(&self, params: &FetchTaskParams) -> bool {
        let fingerprint = request_fingerprint(params);
        match self.seen.lock() {
            Ok(mut seen) => seen.insert(fingerprint),
            Err(poisoned) => poisoned.into_inner().insert(fingerprint),
        }
    }

    /// Number of fingerprints retained
    pub fn len(&self) -> usize {
        match self.seen.lock() {
            Ok(seen) => seen.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
