use std::time::Duration;

use ankisync_common::types::FieldMapping;
use ankisync_config::NotionSettings;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::models::{Page, QueryResponse};
use super::query::{build_changed_since_query, build_property_updates};
use crate::connector::{SourceError, SourceStore};

pub const NOTION_API_URL: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";

#[derive(Debug, Clone)]
pub struct NotionClientConfig {
    pub base_url: String,
    pub token: String,
    pub database_id: String,
    pub max_retries: u32,
    pub timeout_secs: u64,
}

impl From<&NotionSettings> for NotionClientConfig {
    fn from(settings: &NotionSettings) -> Self {
        Self {
            base_url: NOTION_API_URL.to_string(),
            token: settings.token.clone(),
            database_id: settings.database_id.clone(),
            max_retries: settings.max_retries,
            timeout_secs: settings.timeout_secs,
        }
    }
}

#[derive(Clone)]
pub struct NotionClient {
    client: Client,
    config: NotionClientConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum NotionClientError {
    #[error("HTTP {status}: {body}")]
    HttpError { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("max retries exceeded after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl From<NotionClientError> for SourceError {
    fn from(err: NotionClientError) -> Self {
        match err {
            NotionClientError::HttpError { status, body } if status == StatusCode::UNAUTHORIZED => {
                SourceError::AuthenticationFailed(body)
            }
            NotionClientError::HttpError { status, body } if status == StatusCode::NOT_FOUND => {
                SourceError::TargetNotFound(body)
            }
            other => SourceError::TransientFailure(other.to_string()),
        }
    }
}

impl NotionClient {
    pub fn new(config: NotionClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// For testing: create a client pointing at a specific base URL (e.g., wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.to_string();
        self
    }

    /// Fetch every page edited after `since`, following `next_cursor` until the
    /// last page.
    pub async fn query_changed_pages(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<Page>, NotionClientError> {
        let url = format!(
            "{}/v1/databases/{}/query",
            self.config.base_url, self.config.database_id
        );
        let mut cursor: Option<String> = None;
        let mut all_pages = Vec::new();

        loop {
            let body = build_changed_since_query(since, cursor.as_deref());
            let page: QueryResponse = self
                .request_with_retry(Method::POST, &url, &body)
                .await?;
            all_pages.extend(page.results);

            match page.next_cursor {
                Some(next) if page.has_more && !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }

        Ok(all_pages)
    }

    pub async fn update_page(
        &self,
        page_id: &str,
        properties: serde_json::Map<String, Value>,
    ) -> Result<(), NotionClientError> {
        let url = format!("{}/v1/pages/{}", self.config.base_url, page_id);
        let body = json!({ "properties": properties });
        let _: Value = self.request_with_retry(Method::PATCH, &url, &body).await?;
        Ok(())
    }

    async fn request_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &Value,
    ) -> Result<T, NotionClientError> {
        let mut last_error = String::new();

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff_secs = std::cmp::min(1u64 << attempt, 30);
                tracing::warn!(attempt, backoff_secs, "retrying after backoff");
                tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
            }

            let response = match self
                .client
                .request(method.clone(), url)
                .bearer_auth(&self.config.token)
                .header("Notion-Version", NOTION_VERSION)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = e.to_string();
                    if e.is_timeout() || e.is_connect() {
                        continue;
                    }
                    return Err(NotionClientError::RequestError(e));
                }
            };

            let status = response.status();

            if status.is_success() {
                return response
                    .json::<T>()
                    .await
                    .map_err(NotionClientError::RequestError);
            }

            // Honor Retry-After header for 429
            if status == StatusCode::TOO_MANY_REQUESTS {
                if let Some(retry_after) = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                {
                    let wait = std::cmp::min(retry_after, 60);
                    tracing::warn!(wait, "rate-limited, waiting Retry-After");
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                }
                last_error = "429 Too Many Requests".to_string();
                continue;
            }

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                last_error = format!("{status}: {body}");
                continue;
            }

            // Fail fast on other 4xx
            let body = response.text().await.unwrap_or_default();
            return Err(NotionClientError::HttpError { status, body });
        }

        Err(NotionClientError::MaxRetriesExceeded {
            attempts: self.config.max_retries + 1,
            last_error,
        })
    }
}

#[async_trait]
impl SourceStore for NotionClient {
    async fn fetch_changed(&self, since: DateTime<Utc>) -> Result<Vec<Page>, SourceError> {
        let pages = self.query_changed_pages(since).await?;
        tracing::debug!(count = pages.len(), since = %since, "queried notion database");
        Ok(pages)
    }

    async fn update_fields(&self, page: &Page, fields: &FieldMapping) -> Result<(), SourceError> {
        let (properties, skipped) = build_property_updates(fields, &page.properties);
        for name in &skipped {
            tracing::warn!(
                page_id = %page.id,
                field = %name,
                "page has no writable property for field, skipping"
            );
        }
        if properties.is_empty() {
            return Ok(());
        }
        self.update_page(&page.id, properties).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> NotionClientConfig {
        NotionClientConfig {
            base_url: "http://localhost".to_string(),
            token: "secret_test".to_string(),
            database_id: "db-1".to_string(),
            max_retries: 1,
            timeout_secs: 5,
        }
    }

    fn make_page(id: &str, word: &str) -> serde_json::Value {
        json!({
            "object": "page",
            "id": id,
            "last_edited_time": "2026-02-20T15:00:00.000Z",
            "properties": {
                "Word": { "id": "title", "type": "title", "title": [{ "plain_text": word }] },
                "Audio": { "id": "x", "type": "url", "url": null }
            }
        })
    }

    fn query_response(pages: Vec<serde_json::Value>, next: Option<&str>) -> serde_json::Value {
        json!({
            "object": "list",
            "results": pages,
            "has_more": next.is_some(),
            "next_cursor": next
        })
    }

    fn client_for(server: &MockServer) -> NotionClient {
        NotionClient::new(test_config())
            .unwrap()
            .with_base_url(&server.uri())
    }

    #[tokio::test]
    async fn fetch_single_page_with_headers() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(header("authorization", "Bearer secret_test"))
            .and(header("notion-version", NOTION_VERSION))
            .and(body_partial_json(json!({
                "filter": { "last_edited_time": { "after": "1970-01-01T00:00:00.000Z" } },
                "sorts": [{ "timestamp": "last_edited_time", "direction": "descending" }]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(query_response(vec![make_page("p1", "Haus")], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pages = client_for(&server)
            .fetch_changed(DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, "p1");
    }

    #[tokio::test]
    async fn follows_next_cursor_until_exhausted() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({ "start_cursor": "c2" })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(query_response(vec![make_page("p3", "Tisch")], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(
                vec![make_page("p1", "Haus"), make_page("p2", "Baum")],
                Some("c2"),
            )))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let pages = client_for(&server)
            .fetch_changed(DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        let ids: Vec<&str> = pages.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }

    #[tokio::test]
    async fn unauthorized_maps_to_authentication_failed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::AuthenticationFailed(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn not_found_maps_to_target_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("object_not_found"))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::TargetNotFound(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn persistent_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::TransientFailure(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn failure_on_later_page_fails_the_whole_query() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .and(body_partial_json(json!({ "start_cursor": "c2" })))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/databases/db-1/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(
                vec![make_page("p1", "Haus")],
                Some("c2"),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_changed(DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::TransientFailure(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn rate_limited_request_is_retried_after_retry_after() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("Retry-After", "0")
                    .set_body_string("rate_limited"),
            )
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(query_response(vec![make_page("p1", "Haus")], None)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pages = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].id, "p1");
    }

    #[tokio::test]
    async fn persistent_rate_limit_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let err = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::TransientFailure(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn retries_on_500_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(query_response(vec![], None)))
            .mount(&server)
            .await;

        let pages = client_for(&server)
            .fetch_changed(Utc::now())
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[tokio::test]
    async fn update_fields_patches_typed_properties() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v1/pages/p1"))
            .and(body_partial_json(json!({
                "properties": { "Audio": { "url": "https://example.org/haus.mp3" } }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(make_page("p1", "Haus")))
            .expect(1)
            .mount(&server)
            .await;

        let page: Page = serde_json::from_value(make_page("p1", "Haus")).unwrap();
        let mut fields = FieldMapping::new();
        fields.insert(
            "Audio".to_string(),
            "https://example.org/haus.mp3".to_string(),
        );

        client_for(&server)
            .update_fields(&page, &fields)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_fields_without_matching_property_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let page: Page = serde_json::from_value(make_page("p1", "Haus")).unwrap();
        let mut fields = FieldMapping::new();
        fields.insert("Pronunciation".to_string(), "x".to_string());

        client_for(&server)
            .update_fields(&page, &fields)
            .await
            .unwrap();
    }
}
