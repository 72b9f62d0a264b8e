//! HTTP transport layer for the Dooray SDK.

use crate::config::ClientConfig;
use crate::error::{DoorayError, DoorayResult};
use crate::types::DoorayResponse;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// HTTP transport for making API requests.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    config: Arc<ClientConfig>,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration.
    pub fn new(config: Arc<ClientConfig>) -> DoorayResult<Self> {
        let mut headers = header::HeaderMap::new();

        let mut auth = header::HeaderValue::from_str(&format!("dooray-api {}", config.api_key))
            .map_err(|_| DoorayError::Config("Invalid API key format".to_string()))?;
        auth.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, auth);

        let client = Client::builder()
            .user_agent(concat!("dooray-sdk/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self { client, config })
    }

    /// Build a URL from path segments. Each segment is percent-encoded, so
    /// caller-supplied ids cannot escape their position in the path.
    fn build_url(&self, segments: &[&str]) -> DoorayResult<url::Url> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| DoorayError::Config("base_url cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Execute a request with retries.
    async fn execute_with_retry(&self, request_builder: RequestBuilder) -> DoorayResult<Response> {
        let retry_config = &self.config.retry_config;
        let mut attempts = 0;

        loop {
            let request = request_builder
                .try_clone()
                .ok_or_else(|| DoorayError::Config("Request cannot be cloned".to_string()))?;

            match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if response.status().is_success() {
                        return Ok(response);
                    }

                    if attempts < retry_config.max_retries
                        && retry_config.should_retry_status(status)
                    {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            status = status,
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Request failed, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(DoorayError::from_response(status, &body));
                }
                Err(e) => {
                    if attempts < retry_config.max_retries && e.is_timeout() {
                        let backoff = retry_config.backoff_for_attempt(attempts);
                        warn!(
                            attempt = attempts + 1,
                            backoff_ms = backoff.as_millis(),
                            "Request timed out, retrying"
                        );
                        tokio::time::sleep(backoff).await;
                        attempts += 1;
                        continue;
                    }
                    return Err(e.into());
                }
            }
        }
    }

    /// Decode the envelope and turn `isSuccessful: false` into an error.
    async fn decode<T: DeserializeOwned>(response: Response) -> DoorayResult<DoorayResponse<T>> {
        let status = response.status().as_u16();
        let bytes = response.bytes().await?;
        let envelope: DoorayResponse<T> = serde_json::from_slice(&bytes)?;

        if !envelope.header.is_successful {
            return Err(DoorayError::from_header(status, &envelope.header));
        }
        Ok(envelope)
    }

    /// Execute a GET request.
    pub async fn get<T: DeserializeOwned>(&self, path: &[&str]) -> DoorayResult<DoorayResponse<T>> {
        let url = self.build_url(path)?;
        debug!(url = %url, "GET request");

        let response = self.execute_with_retry(self.client.get(url)).await?;
        Self::decode(response).await
    }

    /// Execute a GET request with query parameters.
    pub async fn get_with_query<T: DeserializeOwned, Q: Serialize + ?Sized>(
        &self,
        path: &[&str],
        query: &Q,
    ) -> DoorayResult<DoorayResponse<T>> {
        let url = self.build_url(path)?;
        debug!(url = %url, "GET request with query");

        let response = self
            .execute_with_retry(self.client.get(url).query(query))
            .await?;
        Self::decode(response).await
    }

    /// Execute a POST request.
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &[&str],
        body: &B,
    ) -> DoorayResult<DoorayResponse<T>> {
        let url = self.build_url(path)?;
        debug!(url = %url, "POST request");

        let response = self
            .execute_with_retry(self.client.post(url).json(body))
            .await?;
        Self::decode(response).await
    }

    /// Execute a PUT request.
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        path: &[&str],
        body: &B,
    ) -> DoorayResult<DoorayResponse<T>> {
        let url = self.build_url(path)?;
        debug!(url = %url, "PUT request");

        let response = self
            .execute_with_retry(self.client.put(url).json(body))
            .await?;
        Self::decode(response).await
    }

    /// Execute a POST request with query parameters.
    pub async fn post_with_query<T, B, Q>(
        &self,
        path: &[&str],
        query: &Q,
        body: &B,
    ) -> DoorayResult<DoorayResponse<T>>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
        Q: Serialize + ?Sized,
    {
        let url = self.build_url(path)?;
        debug!(url = %url, "POST request with query");

        let response = self
            .execute_with_retry(self.client.post(url).query(query).json(body))
            .await?;
        Self::decode(response).await
    }

    /// Execute a DELETE request.
    pub async fn delete<T: DeserializeOwned>(&self, path: &[&str]) -> DoorayResult<DoorayResponse<T>> {
        let url = self.build_url(path)?;
        debug!(url = %url, "DELETE request");

        let response = self.execute_with_retry(self.client.delete(url)).await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryConfig;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Item {
        id: String,
    }

    fn create_config(base_url: &str) -> Arc<ClientConfig> {
        Arc::new(ClientConfig {
            base_url: url::Url::parse(base_url).unwrap(),
            api_key: "test-token".to_string(),
            timeout: Duration::from_secs(30),
            retry_config: RetryConfig::no_retry(),
        })
    }

    fn ok(result: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "header": {"isSuccessful": true, "resultCode": 0, "resultMessage": ""},
            "result": result,
        }))
    }

    #[tokio::test]
    async fn test_get_request_sends_dooray_auth() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/wiki/v1/wikis"))
            .and(header("Authorization", "dooray-api test-token"))
            .respond_with(ok(json!([{"id": "w1"}])))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let response: DoorayResponse<Vec<Item>> =
            transport.get(&["wiki", "v1", "wikis"]).await.unwrap();
        assert_eq!(response.result.unwrap(), vec![Item { id: "w1".to_string() }]);
    }

    #[tokio::test]
    async fn test_get_with_query() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/project/v1/projects"))
            .and(query_param("member", "me"))
            .and(query_param("page", "2"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let response: DoorayResponse<Vec<Item>> = transport
            .get_with_query(
                &["project", "v1", "projects"],
                &[("member", "me"), ("page", "2")],
            )
            .await
            .unwrap();
        assert!(response.result.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_post_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messenger/v1/channels/c1/logs"))
            .and(body_json(json!({"text": "hello"})))
            .respond_with(ok(json!({"id": "log-1"})))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let response: DoorayResponse<Item> = transport
            .post(
                &["messenger", "v1", "channels", "c1", "logs"],
                &json!({"text": "hello"}),
            )
            .await
            .unwrap();
        assert_eq!(response.result.unwrap().id, "log-1");
    }

    #[tokio::test]
    async fn test_post_with_query() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/messenger/v1/channels"))
            .and(query_param("idType", "email"))
            .and(body_json(json!({"title": "ops"})))
            .respond_with(ok(json!({"id": "ch-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let response: DoorayResponse<Item> = transport
            .post_with_query(
                &["messenger", "v1", "channels"],
                &[("idType", "email")],
                &json!({"title": "ops"}),
            )
            .await
            .unwrap();
        assert_eq!(response.result.unwrap().id, "ch-1");
    }

    #[tokio::test]
    async fn test_delete_with_empty_result() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path("/project/v1/projects/p1/posts/9/logs/c1"))
            .respond_with(ok(json!(null)))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let response: DoorayResponse<serde_json::Value> = transport
            .delete(&["project", "v1", "projects", "p1", "posts", "9", "logs", "c1"])
            .await
            .unwrap();
        assert!(response.header.is_successful);
        assert!(response.result.is_none());
    }

    #[tokio::test]
    async fn test_unsuccessful_header_is_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/calendar/v1/calendars"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "header": {"isSuccessful": false, "resultCode": -1, "resultMessage": "denied"},
                "result": null,
            })))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let result: DoorayResult<DoorayResponse<Vec<Item>>> =
            transport.get(&["calendar", "v1", "calendars"]).await;
        match result {
            Err(DoorayError::Api {
                status,
                result_code,
                message,
            }) => {
                assert_eq!(status, 200);
                assert_eq!(result_code, -1);
                assert_eq!(message, "denied");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_error_on_404() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/wiki/v1/wikis/missing/pages"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not found"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(create_config(&server.uri())).unwrap();

        let result: DoorayResult<DoorayResponse<Vec<Item>>> =
            transport.get(&["wiki", "v1", "wikis", "missing", "pages"]).await;
        match result {
            Err(DoorayError::Api { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_retries_on_503() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/common/v1/members"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/common/v1/members"))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let config = Arc::new(ClientConfig {
            retry_config: RetryConfig {
                max_retries: 1,
                initial_backoff: Duration::from_millis(1),
                ..Default::default()
            },
            ..(*create_config(&server.uri())).clone()
        });
        let transport = HttpTransport::new(config).unwrap();

        let response: DoorayResponse<Vec<Item>> =
            transport.get(&["common", "v1", "members"]).await.unwrap();
        assert!(response.header.is_successful);
    }

    #[test]
    fn test_build_url_encodes_segments() {
        let transport = HttpTransport::new(create_config("https://api.dooray.com")).unwrap();

        let url = transport
            .build_url(&["wiki", "v1", "wikis", "a/../b", "pages"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.dooray.com/wiki/v1/wikis/a%2F..%2Fb/pages"
        );
    }

    #[test]
    fn test_build_url_with_base_path() {
        let transport = HttpTransport::new(create_config("http://localhost:8080/")).unwrap();

        let url = transport.build_url(&["calendar", "v1", "calendars", "*", "events"]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/calendar/v1/calendars/*/events"
        );
    }
}
