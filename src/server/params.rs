//! Inbound request schema and validation

use crate::engine::FetchTaskParams;
use crate::BotError;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// Body of a fetch call
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FetchRequestParams {
    /// What to fetch
    pub request: FetchTaskParams,

    #[serde(default)]
    pub project: Option<String>,

    #[serde(default)]
    pub spider: Option<String>,

    /// Any other caller fields, kept with the request
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Parses and validates a fetch call body
///
/// Rejects, with `BotError::BadRequest`:
/// - bodies that are not JSON or lack the `request` object / its `url`
/// - URLs that are not absolute http(s) URLs
/// - unknown HTTP method tokens
/// - header names or values that cannot be sent
pub fn parse_fetch_request(body: &[u8]) -> Result<FetchRequestParams, BotError> {
    let params: FetchRequestParams =
        serde_json::from_slice(body).map_err(|e| BotError::BadRequest(e.to_string()))?;
    validate(&params.request)?;
    Ok(params)
}

fn validate(request: &FetchTaskParams) -> Result<(), BotError> {
    let url = Url::parse(&request.url)
        .map_err(|e| BotError::BadRequest(format!("invalid url '{}': {}", request.url, e)))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(BotError::BadRequest(format!(
            "unsupported url scheme '{}'",
            url.scheme()
        )));
    }

    Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
        .map_err(|_| BotError::BadRequest(format!("invalid method '{}'", request.method)))?;

    for (name, values) in &request.headers {
        HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| BotError::BadRequest(format!("invalid header name '{}'", name)))?;
        for value in values.iter() {
            HeaderValue::from_str(value).map_err(|_| {
                BotError::BadRequest(format!("invalid value for header '{}'", name))
            })?;
        }
    }

    Ok(())
}
