//! Data models for local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============================================================================
// Rate Limit / Usage Models
// ============================================================================

/// Persisted token-bucket state for one (tenant, limit type) pair.
///
/// `max_tokens` is both the capacity and the per-second refill rate.
#[derive(Debug, Clone, FromRow)]
pub struct BucketRow {
    pub id: String,
    pub tenant_id: String,
    pub limit_type: String,
    pub tokens: f64,
    pub max_tokens: i64,
    pub last_refill: String,
}

/// Running totals per tenant.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UsageRow {
    pub id: String,
    pub tenant_id: String,
    pub total_queries: i64,
    pub total_ingest_requests: i64,
    pub total_vectors: i64,
    pub updated_at: String,
}

// ============================================================================
// Project Models
// ============================================================================

/// A tenant-owned retrieval namespace.
///
/// `vector_count` mirrors the number of active vectors in the external
/// engine; the services maintain it, the engine never reports it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProjectRow {
    pub id: String,
    pub tenant_id: String,
    pub name: String,
    pub embedding_dim: i64,
    pub hybrid_weight_vector: f64,
    pub hybrid_weight_text: f64,
    pub top_k_default: i64,
    pub vector_search_k: i64,
    pub vector_count: i64,
    pub active: bool,
    pub created_at: String,
    pub last_ingest_at: Option<String>,
}

/// Input for creating a project.
#[derive(Debug, Clone)]
pub struct CreateProject {
    pub tenant_id: String,
    pub name: String,
    pub embedding_dim: i64,
    pub hybrid_weight_vector: f64,
    pub hybrid_weight_text: f64,
    pub top_k_default: i64,
    pub vector_search_k: i64,
}

// ============================================================================
// Document / Image Models
// ============================================================================

/// A document row; `engine_document_id` is the join key into the engine.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DocumentRow {
    pub id: String,
    pub project_id: String,
    pub engine_document_id: String,
    pub title: String,
    pub content: String,
    /// JSON object, stored as text.
    pub metadata: String,
    pub active: bool,
    pub created_at: String,
}

/// Input for inserting a document.
#[derive(Debug, Clone)]
pub struct CreateDocument {
    pub title: String,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// An image row. The bytes live in blob storage under `storage_key`; the
/// embedding lives in the engine under `engine_document_id`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageRow {
    pub id: String,
    pub project_id: String,
    pub engine_document_id: String,
    pub storage_key: String,
    pub content_type: String,
    pub metadata: String,
    pub active: bool,
    pub created_at: String,
}

// ============================================================================
// Helpers
// ============================================================================

/// Parse an RFC 3339 timestamp column.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("invalid timestamp '{value}': {e}"))
}

/// Serialize optional metadata to its stored text form.
pub fn metadata_to_text(metadata: &serde_json::Value) -> String {
    if metadata.is_null() {
        "{}".to_string()
    } else {
        metadata.to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDefaults {
    pub top_k: usize,
    pub vector_k: usize,
}

impl ProjectRow {
    /// Resolve top_k/vector_k for a query, falling back to the project's
    /// configuration: vector_k defaults to at least top_k candidates.
    pub fn query_defaults(&self, top_k: Option<usize>, vector_k: Option<usize>) -> QueryDefaults {
        let top_k = top_k.unwrap_or(self.top_k_default.max(1) as usize);
        let vector_k = vector_k.unwrap_or_else(|| (self.vector_search_k.max(1) as usize).max(top_k));
        QueryDefaults { top_k, vector_k }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(top_k_default: i64, vector_search_k: i64) -> ProjectRow {
        ProjectRow {
            id: "p".to_string(),
            tenant_id: "t".to_string(),
            name: "p".to_string(),
            embedding_dim: 256,
            hybrid_weight_vector: 0.5,
            hybrid_weight_text: 0.5,
            top_k_default,
            vector_search_k,
            vector_count: 0,
            active: true,
            created_at: "2026-01-01T00:00:00Z".to_string(),
            last_ingest_at: None,
        }
    }

    #[test]
    fn test_query_defaults_fall_back_to_project() {
        let defaults = project(10, 50).query_defaults(None, None);
        assert_eq!(defaults.top_k, 10);
        assert_eq!(defaults.vector_k, 50);
    }

    #[test]
    fn test_vector_k_covers_requested_top_k() {
        let defaults = project(10, 20).query_defaults(Some(40), None);
        assert_eq!(defaults.top_k, 40);
        assert_eq!(defaults.vector_k, 40);

        let explicit = project(10, 20).query_defaults(Some(40), Some(15));
        assert_eq!(explicit.vector_k, 15);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("2026-01-01T00:00:00Z").is_ok());
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_metadata_to_text() {
        assert_eq!(metadata_to_text(&serde_json::Value::Null), "{}");
        assert_eq!(
            metadata_to_text(&serde_json::json!({"k": 1})),
            "{\"k\":1}"
        );
    }
}
