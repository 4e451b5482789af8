use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::config::HttpConfig;
use crate::domain::{DomainError, FetchParams, Transport};

/// Real transport using reqwest
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
        }
    }

    pub fn from_config(config: &HttpConfig) -> Result<Self, DomainError> {
        let mut builder = reqwest::Client::builder().user_agent(config.user_agent.clone());

        // 0 disables the request timeout
        if config.timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(config.timeout_secs));
        }

        let client = builder.build().map_err(|e| {
            DomainError::configuration(format!("Failed to build HTTP client: {}", e))
        })?;

        let base_url = config
            .base_url
            .as_deref()
            .map(Url::parse)
            .transpose()
            .map_err(|e| DomainError::configuration(format!("Invalid base_url: {}", e)))?;

        Ok(Self { client, base_url })
    }

    /// Sets the base URL relative endpoints are resolved against
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, DomainError> {
        let url = Url::parse(base_url)
            .map_err(|e| DomainError::configuration(format!("Invalid base_url: {}", e)))?;
        self.base_url = Some(url);
        Ok(self)
    }

    fn resolve(&self, endpoint: &str) -> Result<Url, DomainError> {
        let resolved = match &self.base_url {
            Some(base) => base.join(endpoint),
            None => Url::parse(endpoint),
        };

        resolved.map_err(|e| {
            DomainError::validation(format!("Invalid endpoint '{}': {}", endpoint, e))
        })
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, endpoint: &str, params: &FetchParams) -> Result<Value, DomainError> {
        let url = self.resolve(endpoint)?;

        let response = self
            .client
            .get(url)
            .query(&params.query_pairs())
            .send()
            .await
            .map_err(|e| match e.status() {
                Some(status) => DomainError::http_status(
                    format!("Request failed: {}", e),
                    status.as_u16(),
                ),
                None => DomainError::network(format!("Request failed: {}", e)),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomainError::http_status(
                format!("Request failed with status code {}", status.as_u16()),
                status.as_u16(),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| DomainError::decode(format!("Failed to parse response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_get_sends_query_and_decodes_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .and(query_param("userId", "1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([{"id": 1, "title": "A", "body": "x"}])),
            )
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new().with_base_url(&server.uri()).unwrap();
        let body = transport
            .get("/posts", &FetchParams::new().with("userId", 1))
            .await
            .unwrap();

        assert_eq!(body, json!([{"id": 1, "title": "A", "body": "x"}]));
    }

    #[tokio::test]
    async fn test_absolute_endpoint_ignores_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new()
            .with_base_url("http://unused.invalid")
            .unwrap();
        let body = transport
            .get(&format!("{}/users", server.uri()), &FetchParams::new())
            .await
            .unwrap();

        assert_eq!(body, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().with_base_url(&server.uri()).unwrap();
        let error = transport.get("/posts", &FetchParams::new()).await.unwrap_err();

        assert_eq!(error.status_code(), Some(500));
        assert_eq!(error.to_string(), "Request failed with status code 500");
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new().with_base_url(&server.uri()).unwrap();
        let error = transport.get("/posts", &FetchParams::new()).await.unwrap_err();

        assert!(matches!(error, DomainError::Decode { .. }));
        assert_eq!(error.status_code(), None);
    }

    #[tokio::test]
    async fn test_relative_endpoint_without_base_url() {
        let transport = HttpTransport::new();
        let error = transport.get("/posts", &FetchParams::new()).await.unwrap_err();

        assert!(matches!(error, DomainError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_connection_failure_has_no_status() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new();
        let error = transport
            .get(&format!("http://{}/posts", addr), &FetchParams::new())
            .await
            .unwrap_err();

        assert!(matches!(error, DomainError::Transport { status_code: None, .. }));
    }
}
