//! HTTP fetcher implementation
//!
//! This module performs the actual network I/O for the engine:
//! - Building the shared HTTP client with the bot's user agent
//! - Turning `FetchTaskParams` into a request (method, headers, cookies, body)
//! - Applying the task's status policy
//! - Error classification

use crate::config::{EngineConfig, UserAgentConfig};
use crate::engine::task::{
    FailureKind, FetchFailure, FetchOutcome, FetchTask, FetchTaskParams, FetchedDocument,
    StatusPolicy,
};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{redirect::Policy, Client, Method, RequestBuilder};

/// Builds the HTTP client shared by every fetch
///
/// # Example
///
/// ```no_run
/// use sumi_bot::config::{EngineConfig, UserAgentConfig};
/// use sumi_bot::engine::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "SumiBot".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&EngineConfig::default(), &user_agent).unwrap();
/// ```
pub fn build_http_client(
    engine: &EngineConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(engine.request_timeout())
        .connect_timeout(engine.connect_timeout())
        .redirect(Policy::limited(engine.max_redirects))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one fetch task and classifies the result
///
/// | Condition | Outcome |
/// |-----------|---------|
/// | Any status, `AcceptAll` | Document |
/// | 2xx, `SuccessOnly` | Document |
/// | Non-2xx, `SuccessOnly` | `Http` failure |
/// | Timeout | `Timeout` failure |
/// | Connection refused / DNS / TLS | `Connect` failure |
/// | Bad method, header or URL | `Request` failure |
pub async fn execute(client: &Client, task: &FetchTask) -> FetchOutcome {
    let request = build_request(client, &task.params)?;

    let response = request.send().await.map_err(classify_error)?;

    let status = response.status();
    if task.status_policy == StatusPolicy::SuccessOnly && !status.is_success() {
        return Err(FetchFailure::new(
            FailureKind::Http(status.as_u16()),
            format!("Ignoring non-2xx response: HTTP {}", status.as_u16()),
        ));
    }

    let url = response.url().to_string();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let charset = task.params.encoding.as_deref().unwrap_or("utf-8");
    let body = response
        .text_with_charset(charset)
        .await
        .map_err(classify_error)?;

    Ok(FetchedDocument {
        url,
        status: status.as_u16(),
        content_type,
        body,
    })
}

/// Builds a request from caller-supplied parameters
fn build_request(client: &Client, params: &FetchTaskParams) -> Result<RequestBuilder, FetchFailure> {
    let method = Method::from_bytes(params.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
        FetchFailure::new(
            FailureKind::Request,
            format!("Invalid HTTP method: {}", params.method),
        )
    })?;

    let url = reqwest::Url::parse(&params.url).map_err(|e| {
        FetchFailure::new(
            FailureKind::Request,
            format!("Invalid URL '{}': {}", params.url, e),
        )
    })?;

    let mut request = client.request(method, url).headers(build_headers(params)?);

    if let Some(body) = &params.body {
        request = request.body(body.clone());
    }

    Ok(request)
}

/// Converts the header map and cookie map into a `HeaderMap`
pub(crate) fn build_headers(params: &FetchTaskParams) -> Result<HeaderMap, FetchFailure> {
    let mut headers = HeaderMap::new();

    for (name, values) in &params.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            FetchFailure::new(FailureKind::Request, format!("Invalid header name: {}", name))
        })?;
        for value in values.iter() {
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                FetchFailure::new(
                    FailureKind::Request,
                    format!("Invalid value for header {}", name),
                )
            })?;
            headers.append(header_name.clone(), header_value);
        }
    }

    if !params.cookies.is_empty() {
        let cookie = params
            .cookies
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect::<Vec<_>>()
            .join("; ");
        let cookie_value = HeaderValue::from_str(&cookie).map_err(|_| {
            FetchFailure::new(FailureKind::Request, "Invalid cookie value".to_string())
        })?;
        headers.insert(COOKIE, cookie_value);
    }

    Ok(headers)
}

/// Maps a reqwest error onto a failure kind
fn classify_error(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::new(FailureKind::Timeout, format!("Request timeout: {}", e))
    } else if e.is_connect() {
        FetchFailure::new(FailureKind::Connect, format!("Connection refused: {}", e))
    } else if e.is_builder() {
        FetchFailure::new(FailureKind::Request, format!("Invalid request: {}", e))
    } else {
        FetchFailure::new(FailureKind::Request, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::task::{HeaderValues, RequestId};
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_user_agent() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestBot".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn client() -> Client {
        build_http_client(&EngineConfig::default(), &create_test_user_agent()).unwrap()
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&EngineConfig::default(), &create_test_user_agent());
        assert!(client.is_ok());
    }

    #[test]
    fn test_build_headers_with_cookies() {
        let mut params = FetchTaskParams::get("http://example.com");
        params.headers.insert(
            "Accept-Language".to_string(),
            HeaderValues::Many(vec!["en".to_string(), "fr".to_string()]),
        );
        params.cookies.insert("a".to_string(), "1".to_string());
        params.cookies.insert("b".to_string(), "2".to_string());

        let headers = build_headers(&params).unwrap();
        assert_eq!(headers.get_all("accept-language").iter().count(), 2);
        assert_eq!(headers.get(COOKIE).unwrap(), "a=1; b=2");
    }

    #[test]
    fn test_build_headers_rejects_invalid_name() {
        let mut params = FetchTaskParams::get("http://example.com");
        params
            .headers
            .insert("bad header".to_string(), HeaderValues::One("x".to_string()));

        let err = build_headers(&params).unwrap_err();
        assert_eq!(err.kind, FailureKind::Request);
    }

    #[tokio::test]
    async fn test_execute_sends_method_headers_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .and(header("x-token", "abc"))
            .and(body_string("q=rust"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html>ok</html>", "text/html"))
            .mount(&server)
            .await;

        let mut params = FetchTaskParams::get(format!("{}/search", server.uri()));
        params.method = "post".to_string();
        params
            .headers
            .insert("X-Token".to_string(), HeaderValues::One("abc".to_string()));
        params.body = Some("q=rust".to_string());

        let task = FetchTask::new(RequestId::new(), params);
        let document = execute(&client(), &task).await.unwrap();

        assert_eq!(document.status, 200);
        assert_eq!(document.body, "<html>ok</html>");
        assert!(document.is_html());
    }

    #[tokio::test]
    async fn test_execute_status_policy() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_raw("down", "text/plain"))
            .mount(&server)
            .await;

        let params = FetchTaskParams::get(server.uri());

        let strict = FetchTask::new(RequestId::new(), params.clone());
        let failure = execute(&client(), &strict).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Http(503));

        let lenient = FetchTask::new(RequestId::new(), params).accept_all_statuses();
        let document = execute(&client(), &lenient).await.unwrap();
        assert_eq!(document.status, 503);
        assert_eq!(document.body, "down");
    }

    #[tokio::test]
    async fn test_execute_uses_encoding_when_charset_undeclared() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                b"<html>caf\xe9</html>".to_vec(),
                "text/html",
            ))
            .mount(&server)
            .await;

        let mut params = FetchTaskParams::get(server.uri());
        params.encoding = Some("latin1".to_string());
        let task = FetchTask::new(RequestId::new(), params);

        let document = execute(&client(), &task).await.unwrap();
        assert_eq!(document.content_type.as_deref(), Some("text/html"));
        assert_eq!(document.body, "<html>caf\u{e9}</html>");
    }

    #[tokio::test]
    async fn test_execute_declared_charset_wins_over_encoding() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                "<html>caf\u{e9}</html>".as_bytes().to_vec(),
                "text/html; charset=utf-8",
            ))
            .mount(&server)
            .await;

        let mut params = FetchTaskParams::get(server.uri());
        params.encoding = Some("latin1".to_string());
        let task = FetchTask::new(RequestId::new(), params);

        let document = execute(&client(), &task).await.unwrap();
        assert_eq!(document.body, "<html>caf\u{e9}</html>");
    }

    #[tokio::test]
    async fn test_execute_connection_refused() {
        let task = FetchTask::new(
            RequestId::new(),
            FetchTaskParams::get("http://127.0.0.1:1/"),
        );
        let failure = execute(&client(), &task).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Connect);
    }

    #[tokio::test]
    async fn test_execute_invalid_method() {
        let mut params = FetchTaskParams::get("http://127.0.0.1:1/");
        params.method = "NOT A METHOD".to_string();
        let task = FetchTask::new(RequestId::new(), params);

        let failure = execute(&client(), &task).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Request);
    }
}
