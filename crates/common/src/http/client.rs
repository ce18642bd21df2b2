use crate::domain::{DomainError, DomainResult};
use reqwest::{header, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

const USER_AGENT: &str = concat!("streaming-agent/", env!("CARGO_PKG_VERSION"));

/// Thin JSON GET client shared by the remote service adapters.
///
/// Every failure (connect, status, decode) surfaces as
/// `DomainError::RemoteDependency`.
#[derive(Clone)]
pub struct JsonHttpClient {
    client: reqwest::Client,
}

impl JsonHttpClient {
    pub fn new(timeout: Duration) -> DomainResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static("no-cache"),
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .map_err(|e| {
                DomainError::InvalidConfiguration(format!("failed to build http client: {e}"))
            })?;

        Ok(Self { client })
    }

    /// GET `url` and decode the JSON body.
    ///
    /// With `accept_not_found`, a 404 yields `Ok(None)` instead of an error.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
        accept_not_found: bool,
    ) -> DomainResult<Option<T>> {
        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| DomainError::RemoteDependency(format!("GET {url} failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND && accept_not_found {
            debug!("resource not found");
            return Ok(None);
        }

        if !status.is_success() {
            return Err(DomainError::RemoteDependency(format!(
                "GET {url} returned {status}"
            )));
        }

        let body = response.json::<T>().await.map_err(|e| {
            DomainError::RemoteDependency(format!("GET {url} returned an invalid body: {e}"))
        })?;

        Ok(Some(body))
    }
}

/// Joins a base url and a path without doubling the slash.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderMap;
    use axum::routing::get;
    use axum::Router;
    use serde_json::{json, Value};

    async fn spawn_server(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        format!("http://{addr}")
    }

    #[test]
    fn test_join_url() {
        assert_eq!(join_url("http://host/api/", "/rules"), "http://host/api/rules");
        assert_eq!(join_url("http://host", "rules"), "http://host/rules");
    }

    #[tokio::test]
    async fn test_get_json_sends_standard_headers() {
        // Arrange
        let app = Router::new().route(
            "/echo",
            get(|headers: HeaderMap| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string()
                };
                axum::Json(json!({
                    "accept": header("accept"),
                    "cache": header("cache-control"),
                    "agent": header("user-agent"),
                }))
            }),
        );
        let base_url = spawn_server(app).await;
        let client = JsonHttpClient::new(Duration::from_secs(5)).unwrap();

        // Act
        let body: Value = client
            .get_json(&join_url(&base_url, "echo"), &[], false)
            .await
            .unwrap()
            .unwrap();

        // Assert
        assert_eq!(body["accept"], "application/json");
        assert_eq!(body["cache"], "no-cache");
        assert!(body["agent"].as_str().unwrap().starts_with("streaming-agent/"));
    }

    #[tokio::test]
    async fn test_get_json_not_found_handling() {
        let base_url = spawn_server(Router::new()).await;
        let client = JsonHttpClient::new(Duration::from_secs(5)).unwrap();
        let url = join_url(&base_url, "missing");

        let tolerated: DomainResult<Option<Value>> = client.get_json(&url, &[], true).await;
        let rejected: DomainResult<Option<Value>> = client.get_json(&url, &[], false).await;

        assert!(matches!(tolerated, Ok(None)));
        assert!(matches!(rejected, Err(DomainError::RemoteDependency(_))));
    }

    #[tokio::test]
    async fn test_get_json_unreachable_is_remote_dependency() {
        let client = JsonHttpClient::new(Duration::from_millis(500)).unwrap();

        let result: DomainResult<Option<Value>> =
            client.get_json("http://127.0.0.1:1/rules", &[], false).await;

        assert!(matches!(result, Err(DomainError::RemoteDependency(_))));
    }
}
