use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use crate::error::ExternalError;
use crate::services::contracts::{SearchDocument, SearchIndex};

const INDEX_NAME: &str = "video_segments";

/// Client for a Meilisearch-compatible document index.
pub struct HttpSearchIndex {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpSearchIndex {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ExternalError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ExternalError::Http)?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/indexes/{}{}", self.base_url, INDEX_NAME, path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<(), ExternalError> {
        let response = builder.send().await.map_err(ExternalError::Http)?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ExternalError::service("search", format!("{status}: {text}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SearchIndex for HttpSearchIndex {
    async fn delete_by_video(&self, video_id: Uuid) -> Result<(), ExternalError> {
        let body = serde_json::json!({ "filter": format!("video_id = '{video_id}'") });
        self.send(self.request(reqwest::Method::POST, "/documents/delete").json(&body))
            .await
    }

    async fn index_batch(&self, documents: &[SearchDocument]) -> Result<(), ExternalError> {
        if documents.is_empty() {
            return Ok(());
        }
        self.send(
            self.request(reqwest::Method::POST, "/documents?primaryKey=id")
                .json(documents),
        )
        .await
    }
}
