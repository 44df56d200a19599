//! HTTP client for the Notion REST API

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::NotionApi;
use crate::error::{NotionError, Result};
use crate::retry::RetryPolicy;
use crate::throttle::Throttle;
use crate::types::*;

/// Longest server-requested wait honored before a retry
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// HTTP client for the Notion REST API
///
/// Every request shares one throttle and one retry policy.
///
/// # Example
///
/// ```rust,no_run
/// use notion_client::{ClientConfig, NotionApi, NotionClient};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = NotionClient::new(ClientConfig {
///     token: "secret_xxx".into(),
///     ..Default::default()
/// })?;
///
/// let page = client
///     .create_page(serde_json::json!({
///         "parent": {"page_id": "abc"},
///         "properties": {"title": {"title": [{"text": {"content": "Hello"}}]}}
///     }))
///     .await?;
/// println!("created {}", page.id);
/// # Ok(())
/// # }
/// ```
pub struct NotionClient {
    config: ClientConfig,
    client: Client,
    throttle: Throttle,
    retry: RetryPolicy,
}

impl NotionClient {
    /// Create a new client. Fails if the token is malformed.
    pub fn new(config: ClientConfig) -> Result<Self> {
        validate_token(&config.token)?;

        let mut headers = header::HeaderMap::new();
        let bearer = header::HeaderValue::from_str(&format!("Bearer {}", config.token.trim()))
            .map_err(|e| NotionError::InvalidToken(e.to_string()))?;
        headers.insert(header::AUTHORIZATION, bearer);
        headers.insert(
            header::HeaderName::from_static("notion-version"),
            header::HeaderValue::from_str(&config.notion_version)
                .map_err(|e| NotionError::Config(format!("bad Notion-Version: {}", e)))?,
        );
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let throttle = Throttle::per_second(config.requests_per_second);
        let retry = RetryPolicy::new(
            config.max_retries,
            Duration::from_millis(config.base_delay_ms),
        );

        Ok(Self {
            config,
            client,
            throttle,
            retry,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Send a request through the throttle, retrying transient failures.
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value> {
        let url = self.url(path);
        let mut attempt: u32 = 0;

        loop {
            self.throttle.acquire().await;

            let mut request = self.client.request(method.clone(), &url);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if attempt < self.retry.max_retries && is_transient(&e) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        %method,
                        path,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transport error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                Err(e) => return Err(NotionError::Http(e)),
            };

            let status = response.status();
            if status.is_success() {
                debug!(%method, path, status = status.as_u16(), "Request succeeded");
                let text = response.text().await?;
                if text.trim().is_empty() {
                    return Ok(Value::Null);
                }
                return Ok(serde_json::from_str(&text)?);
            }

            if self.retry.should_retry_status(status.as_u16()) {
                if attempt < self.retry.max_retries {
                    let delay = self
                        .retry
                        .delay_with_hint(attempt, retry_after(response.headers()));
                    warn!(
                        %method,
                        path,
                        status = status.as_u16(),
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable status, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                    continue;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return Err(NotionError::RateLimited {
                        attempts: attempt + 1,
                    });
                }
            }

            return Err(api_error(status, response.text().await.unwrap_or_default()));
        }
    }

    async fn send_for_object(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<ObjectRef> {
        let value = self.send(method, path, body).await?;
        serde_json::from_value(value)
            .map_err(|e| NotionError::InvalidResponse(format!("expected object with id: {}", e)))
    }
}

#[async_trait]
impl NotionApi for NotionClient {
    async fn create_page(&self, body: Value) -> Result<ObjectRef> {
        self.send_for_object(Method::POST, "pages", Some(&body)).await
    }

    async fn create_database(&self, body: Value) -> Result<ObjectRef> {
        self.send_for_object(Method::POST, "databases", Some(&body))
            .await
    }

    async fn update_database(&self, database_id: &str, body: Value) -> Result<ObjectRef> {
        let path = format!("databases/{}", database_id);
        self.send_for_object(Method::PATCH, &path, Some(&body)).await
    }

    async fn append_block_children(&self, block_id: &str, children: Vec<Value>) -> Result<()> {
        let path = format!("blocks/{}/children", block_id);
        let body = serde_json::json!({ "children": children });
        self.send(Method::PATCH, &path, Some(&body)).await?;
        Ok(())
    }

    async fn find_by_title(&self, kind: ObjectKind, title: &str) -> Result<Option<String>> {
        let request = SearchRequest {
            query: title,
            filter: SearchFilter {
                property: "object",
                value: kind.as_str(),
            },
            page_size: 100,
        };
        let body = serde_json::to_value(&request)?;
        let value = self.send(Method::POST, "search", Some(&body)).await?;
        let response: SearchResponse = serde_json::from_value(value)?;

        // Search is fuzzy; only an exact title match counts
        Ok(response
            .results
            .iter()
            .filter(|r| r.get("archived").and_then(|a| a.as_bool()) != Some(true))
            .find(|r| object_title(r).as_deref() == Some(title))
            .and_then(|r| r.get("id").and_then(|id| id.as_str()))
            .map(str::to_string))
    }
}

fn is_transient(e: &reqwest::Error) -> bool {
    e.is_timeout() || e.is_connect()
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    let secs = headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| !s.is_nan())?;
    Duration::try_from_secs_f64(secs.min(MAX_RETRY_AFTER.as_secs_f64())).ok()
}

fn api_error(status: StatusCode, body: String) -> NotionError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
    match parsed {
        Some(err) if !err.message.is_empty() => NotionError::Api {
            status: status.as_u16(),
            code: err.code,
            message: err.message,
        },
        _ => NotionError::Api {
            status: status.as_u16(),
            code: status
                .canonical_reason()
                .unwrap_or("unknown")
                .to_lowercase()
                .replace(' ', "_"),
            message: body,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_token() {
        let result = NotionClient::new(ClientConfig {
            token: "bogus".into(),
            ..Default::default()
        });
        assert!(matches!(result, Err(NotionError::InvalidToken(_))));
    }

    #[test]
    fn test_url_joins_base() {
        let client = NotionClient::new(ClientConfig {
            base_url: "http://localhost:9000/v1/".into(),
            token: "secret_x".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("pages"), "http://localhost:9000/v1/pages");
    }

    #[test]
    fn test_api_error_parses_body() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"object":"error","status":400,"code":"validation_error","message":"bad"}"#.into(),
        );
        match err {
            NotionError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code, "validation_error");
                assert_eq!(message, "bad");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    fn headers_with_retry_after(value: &str) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(
            retry_after(&headers_with_retry_after("2")),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            retry_after(&headers_with_retry_after("1e20")),
            Some(MAX_RETRY_AFTER)
        );
        assert_eq!(retry_after(&headers_with_retry_after("-1")), None);
        assert_eq!(retry_after(&headers_with_retry_after("NaN")), None);
        assert_eq!(retry_after(&headers_with_retry_after("soon")), None);
        assert_eq!(retry_after(&header::HeaderMap::new()), None);
    }

    #[test]
    fn test_api_error_without_json_body() {
        let err = api_error(StatusCode::NOT_FOUND, "nope".into());
        assert_eq!(err.status(), Some(404));
    }
}
