//! HTTP client for the external document engine.

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, error};

use super::error::EngineError;
use super::query::SearchRequest;
use super::results::{SearchHit, normalise_response};

/// How much of an error body we keep for diagnostics.
const ERROR_DETAIL_MAX: usize = 300;

/// Seam between the store façades and the engine transport.
///
/// The HTTP client implements this; tests substitute in-memory fakes.
pub trait SearchBackend: Send + Sync {
    /// Upsert a document's fields under the given id.
    fn upsert(
        &self,
        document_id: &str,
        fields: Value,
    ) -> impl Future<Output = Result<(), EngineError>> + Send;

    /// Delete a document. Returns false if it was already absent.
    fn delete(&self, document_id: &str) -> impl Future<Output = Result<bool, EngineError>> + Send;

    /// Execute a search and return normalised, ordered hits. One-shot:
    /// each call issues a fresh query.
    fn search(
        &self,
        request: &SearchRequest,
    ) -> impl Future<Output = Result<Vec<SearchHit>, EngineError>> + Send;
}

/// Document-engine HTTP client, scoped to one document type.
#[derive(Debug, Clone)]
pub struct EngineClient {
    client: Client,
    base_url: String,
    namespace: String,
    document_type: String,
    rank_profile: String,
}

impl EngineClient {
    pub fn new(
        endpoint: &str,
        namespace: &str,
        document_type: &str,
        rank_profile: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: endpoint.trim_end_matches('/').to_string(),
            namespace: namespace.to_string(),
            document_type: document_type.to_string(),
            rank_profile: rank_profile.to_string(),
        })
    }

    fn document_url(&self, document_id: &str) -> String {
        format!(
            "{}/document/v1/{}/{}/docid/{}",
            self.base_url, self.namespace, self.document_type, document_id
        )
    }

    /// Map a non-success response to an error, keeping a truncated body.
    async fn check_status(
        response: reqwest::Response,
        context: &str,
    ) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let mut detail = response.text().await.unwrap_or_default().trim().to_string();
        if detail.len() > ERROR_DETAIL_MAX {
            detail.truncate(ERROR_DETAIL_MAX);
            detail.push_str("...");
        }
        error!(context, status = status.as_u16(), detail, "engine request failed");

        Err(EngineError::Status {
            context: context.to_string(),
            status: status.as_u16(),
            detail,
        })
    }
}

impl SearchBackend for EngineClient {
    async fn upsert(&self, document_id: &str, fields: Value) -> Result<(), EngineError> {
        let url = self.document_url(document_id);
        debug!(document_id, doc_type = %self.document_type, "upserting document");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "fields": fields }))
            .send()
            .await?;

        Self::check_status(response, "upsert document").await?;
        Ok(())
    }

    async fn delete(&self, document_id: &str) -> Result<bool, EngineError> {
        let url = self.document_url(document_id);
        debug!(document_id, doc_type = %self.document_type, "deleting document");

        let response = self.client.delete(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            // Already gone; common race with a concurrent delete.
            return Ok(false);
        }

        Self::check_status(response, "delete document").await?;
        Ok(true)
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, EngineError> {
        let body = request.to_body(&self.rank_profile);
        debug!(project_id = %request.project_id, hits = request.top_k, "searching engine");

        let response = self
            .client
            .post(format!("{}/search/", self.base_url))
            .json(&body)
            .send()
            .await?;
        let response = Self::check_status(response, "search engine").await?;

        let body: Value = response.json().await?;
        normalise_response(&body)
    }
}
