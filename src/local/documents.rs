//! Document ingest/query/delete orchestration.
//!
//! Order of operations per request: capacity and rate-limit checks first
//! (no compensation needed when they reject), then external calls
//! (embedding, engine), then one final transaction for the local row and
//! counter mutations. An engine write that succeeds before the local
//! transaction fails is reversed by a best-effort compensating delete; a
//! cleanup failure is logged, never allowed to mask the root cause.
//!
//! No transaction is held across an external call.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use crate::embeddings::TextEmbedder;
use crate::engine::{DocumentIndex, SearchBackend, SearchHit};
use crate::quota::{
    self, QuotaError, ensure_vector_capacity, increment_usage, decrement_vector_usage,
};
use crate::types::LimitType;

use super::db::LocalDb;
use super::models::{CreateDocument, DocumentRow, ProjectRow};

/// Document pipeline for one deployment.
pub struct DocumentService<B: SearchBackend, E: TextEmbedder> {
    db: LocalDb,
    index: DocumentIndex<B>,
    embedder: E,
}

/// One query result, flattened from the engine hit payload.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResult {
    pub document_id: Option<String>,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Option<String>,
    pub score: f64,
}

impl QueryResult {
    fn from_hit(hit: &SearchHit) -> Self {
        Self {
            document_id: hit.field_str("document_id").map(str::to_string),
            title: hit.field_str("title").map(str::to_string),
            content: hit.field_str("content").map(str::to_string),
            metadata: hit.field_str("metadata").map(str::to_string),
            score: hit.relevance,
        }
    }
}

impl<B: SearchBackend, E: TextEmbedder> DocumentService<B, E> {
    pub fn new(db: LocalDb, index: DocumentIndex<B>, embedder: E) -> Self {
        Self {
            db,
            index,
            embedder,
        }
    }

    /// Ingest one document: quota checks, embed, engine upsert, then the
    /// local row and counters in a single transaction.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        project_id: &str,
        input: CreateDocument,
    ) -> Result<DocumentRow> {
        let (project, plan) = self.load_project(tenant_id, project_id).await?;

        // Rejections happen before any side effect.
        ensure_vector_capacity(&plan, 1, Some(&project))?;
        quota::consume(&self.db, tenant_id, LimitType::Ingest, 1.0).await?;

        let embedding = self
            .embedder
            .embed_document(&input.title, &input.content)
            .await
            .context("embedding document failed")?;

        let doc = self.db.new_document(&project.id, &input);
        self.index.upsert(&doc, &embedding).await?;

        // The engine now holds the vector; any failure from here on must
        // reverse that write before propagating.
        match self.commit_ingest(tenant_id, &project, &doc).await {
            Ok(()) => {
                info!(project_id, document_id = %doc.id, "document ingested");
                Ok(doc)
            }
            Err(e) => {
                self.cleanup_engine_document(&doc).await;
                Err(e)
            }
        }
    }

    async fn commit_ingest(
        &self,
        tenant_id: &str,
        project: &ProjectRow,
        doc: &DocumentRow,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

        // Re-check capacity on a fresh row; a concurrent ingest may have
        // landed since the pre-check.
        let fresh = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM projects WHERE id = ? AND active = 1",
        )
        .bind(&project.id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| anyhow!("project {} disappeared during ingest", project.id))?;

        let plan = sqlx::query_as::<_, crate::types::Plan>(
            r#"
            SELECT p.* FROM plans p
            JOIN subscriptions s ON s.plan_id = p.id
            WHERE s.tenant_id = ? AND s.status = 'active'
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| QuotaError::MissingSubscription(tenant_id.to_string()))?;
        ensure_vector_capacity(&plan, 1, Some(&fresh))?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, project_id, engine_document_id, title, content, metadata, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.project_id)
        .bind(&doc.engine_document_id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(&doc.metadata)
        .bind(&doc.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE projects SET vector_count = vector_count + 1, last_ingest_at = ? WHERE id = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(&project.id)
        .execute(&mut *tx)
        .await?;

        increment_usage(&mut tx, tenant_id, 0, 1, 1).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Hybrid query over one project. Blank queries still run vector-only
    /// retrieval against the query embedding.
    pub async fn query(
        &self,
        tenant_id: &str,
        project_id: &str,
        query: &str,
        top_k: Option<usize>,
        vector_k: Option<usize>,
    ) -> Result<Vec<QueryResult>> {
        let (project, _plan) = self.load_project(tenant_id, project_id).await?;

        quota::consume(&self.db, tenant_id, LimitType::Query, 1.0).await?;

        let embedding = self
            .embedder
            .embed_query(query)
            .await
            .context("embedding query failed")?;

        let defaults = project.query_defaults(top_k, vector_k);
        let hits = self
            .index
            .hybrid_search(
                &project.id,
                &embedding,
                Some(query),
                defaults.top_k,
                defaults.vector_k,
                project.hybrid_weight_vector,
                project.hybrid_weight_text,
            )
            .await?;

        let mut tx = self.db.pool().begin().await?;
        increment_usage(&mut tx, tenant_id, 1, 0, 0).await?;
        tx.commit().await?;

        Ok(hits.iter().map(QueryResult::from_hit).collect())
    }

    /// Delete a document. Returns false when the engine had already lost
    /// it (a benign race); local state is cleaned up either way.
    pub async fn delete(
        &self,
        tenant_id: &str,
        project_id: &str,
        document_id: &str,
    ) -> Result<bool> {
        let (project, _plan) = self.load_project(tenant_id, project_id).await?;

        let doc = self
            .db
            .find_document(&project.id, document_id)
            .await?
            .ok_or_else(|| anyhow!("document {document_id} not found"))?;

        let deleted = self.index.delete(&doc).await?;
        if !deleted {
            warn!(document_id, "engine document already absent on delete");
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("UPDATE documents SET active = 0 WHERE id = ?")
            .bind(&doc.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE projects SET vector_count = MAX(0, vector_count - 1) WHERE id = ?")
            .bind(&project.id)
            .execute(&mut *tx)
            .await?;
        decrement_vector_usage(&mut tx, tenant_id, 1).await?;
        tx.commit().await?;

        info!(project_id, document_id, "document deleted");
        Ok(deleted)
    }

    async fn load_project(
        &self,
        tenant_id: &str,
        project_id: &str,
    ) -> Result<(ProjectRow, crate::types::Plan)> {
        let project = self
            .db
            .find_project(tenant_id, project_id)
            .await?
            .ok_or_else(|| anyhow!("project {project_id} not found"))?;
        let plan = self
            .db
            .plan_for_tenant(tenant_id)
            .await?
            .ok_or_else(|| QuotaError::MissingSubscription(tenant_id.to_string()))?;
        Ok((project, plan))
    }

    /// Best-effort reversal of an engine upsert after a local failure.
    async fn cleanup_engine_document(&self, doc: &DocumentRow) {
        if let Err(e) = self.index.delete(doc).await {
            warn!(
                document_id = %doc.id,
                error = %e,
                "failed to clean up engine document after aborted ingest"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use serde_json::Value;

    use super::*;
    use crate::engine::{EmbeddingCodec, EngineError, SearchRequest, TransportEncoding};
    use crate::local::db::tests::{insert_project, seeded_db};

    /// In-memory stand-in for the document engine: stores upserted fields
    /// and answers searches with the project's active documents.
    #[derive(Default)]
    struct FakeEngine {
        docs: Mutex<HashMap<String, Value>>,
        fail_upserts: Mutex<bool>,
        deletes: Mutex<Vec<String>>,
    }

    impl crate::engine::SearchBackend for Arc<FakeEngine> {
        async fn upsert(&self, document_id: &str, fields: Value) -> Result<(), EngineError> {
            if *self.fail_upserts.lock().unwrap() {
                return Err(EngineError::Status {
                    context: "upsert document".to_string(),
                    status: 503,
                    detail: "engine unavailable".to_string(),
                });
            }
            self.docs
                .lock()
                .unwrap()
                .insert(document_id.to_string(), fields);
            Ok(())
        }

        async fn delete(&self, document_id: &str) -> Result<bool, EngineError> {
            self.deletes.lock().unwrap().push(document_id.to_string());
            Ok(self.docs.lock().unwrap().remove(document_id).is_some())
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, EngineError> {
            let docs = self.docs.lock().unwrap();
            let hits = docs
                .values()
                .filter(|fields| {
                    fields["project_id"] == request.project_id.as_str()
                        && fields["active"] == true
                })
                .enumerate()
                .map(|(i, fields)| SearchHit {
                    relevance: 1.0 / (i as f64 + 1.0),
                    fields: fields.as_object().unwrap().clone(),
                })
                .take(request.top_k)
                .collect();
            Ok(hits)
        }
    }

    struct FakeEmbedder;

    impl TextEmbedder for FakeEmbedder {
        async fn embed_document(&self, _title: &str, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 8])
        }

        async fn embed_query(&self, _query: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1; 8])
        }
    }

    fn service(
        db: &LocalDb,
        engine: &Arc<FakeEngine>,
    ) -> DocumentService<Arc<FakeEngine>, FakeEmbedder> {
        let codec = EmbeddingCodec::new(8, TransportEncoding::Float).unwrap();
        DocumentService::new(
            db.clone(),
            DocumentIndex::new(Arc::clone(engine), codec),
            FakeEmbedder,
        )
    }

    fn doc_input(title: &str) -> CreateDocument {
        CreateDocument {
            title: title.to_string(),
            content: format!("{title} body"),
            metadata: serde_json::json!({}),
        }
    }

    async fn ingest_bucket_tokens(db: &LocalDb, tenant: &str) -> f64 {
        sqlx::query_scalar(
            "SELECT tokens FROM rate_limit_buckets WHERE tenant_id = ? AND limit_type = 'ingest'",
        )
        .bind(tenant)
        .fetch_one(db.pool())
        .await
        .unwrap()
    }

    async fn vector_count(db: &LocalDb, project_id: &str) -> i64 {
        sqlx::query_scalar("SELECT vector_count FROM projects WHERE id = ?")
            .bind(project_id)
            .fetch_one(db.pool())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_ingest_query_delete_roundtrip() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let project = insert_project(&db, &tenant, "docs", 0).await;
        let engine = Arc::new(FakeEngine::default());
        let service = service(&db, &engine);

        let doc = service
            .ingest(&tenant, &project.id, doc_input("only match"))
            .await
            .unwrap();

        // One ingest: a token spent, a vector counted.
        assert_eq!(ingest_bucket_tokens(&db, &tenant).await, 4.0);
        assert_eq!(vector_count(&db, &project.id).await, 1);
        let usage: i64 =
            sqlx::query_scalar("SELECT total_vectors FROM usage_counters WHERE tenant_id = ?")
                .bind(&tenant)
                .fetch_one(db.pool())
                .await
                .unwrap();
        assert_eq!(usage, 1);

        // The only match comes back first.
        let results = service
            .query(&tenant, &project.id, "match", None, None)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id.as_deref(), Some(doc.id.as_str()));

        // Delete restores the pre-ingest vector count and hides the doc.
        assert!(service.delete(&tenant, &project.id, &doc.id).await.unwrap());
        assert_eq!(vector_count(&db, &project.id).await, 0);

        let results = service
            .query(&tenant, &project.id, "match", None, None)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_leaves_no_local_trace() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let project = insert_project(&db, &tenant, "docs", 0).await;
        let engine = Arc::new(FakeEngine::default());
        *engine.fail_upserts.lock().unwrap() = true;
        let service = service(&db, &engine);

        let err = service
            .ingest(&tenant, &project.id, doc_input("doomed"))
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<EngineError>().is_some());

        // No row, no vector, no usage. Only the rate-limit token is gone,
        // since admission had already happened.
        assert_eq!(vector_count(&db, &project.id).await, 0);
        let docs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(docs, 0);
    }

    #[tokio::test]
    async fn test_capacity_rejection_precedes_external_io() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        // Seeded plan caps projects at 10k vectors; fill the project.
        let project = insert_project(&db, &tenant, "full", 10_000).await;
        let engine = Arc::new(FakeEngine::default());
        let service = service(&db, &engine);

        let err = service
            .ingest(&tenant, &project.id, doc_input("overflow"))
            .await
            .unwrap_err();
        let quota = err.downcast_ref::<QuotaError>().unwrap();
        assert_eq!(quota.kind(), "vector_capacity_exceeded");

        // Rejected before admission: no token spent, nothing upserted.
        let buckets: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM rate_limit_buckets")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(buckets, 0);
        assert!(engine.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limit_rejection_carries_retry_time() {
        let (db, _dir, tenant) = seeded_db(5, 1).await;
        let project = insert_project(&db, &tenant, "docs", 0).await;
        let engine = Arc::new(FakeEngine::default());
        let service = service(&db, &engine);

        service
            .ingest(&tenant, &project.id, doc_input("first"))
            .await
            .unwrap();

        let err = service
            .ingest(&tenant, &project.id, doc_input("second"))
            .await
            .unwrap_err();
        match err.downcast_ref::<QuotaError>() {
            Some(QuotaError::RateLimitExceeded { .. }) => {}
            other => panic!("expected throttle, got {other:?}"),
        }
        // The second document never reached the engine.
        assert_eq!(engine.docs.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_tolerates_engine_absence() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let project = insert_project(&db, &tenant, "docs", 0).await;
        let engine = Arc::new(FakeEngine::default());
        let service = service(&db, &engine);

        let doc = service
            .ingest(&tenant, &project.id, doc_input("racy"))
            .await
            .unwrap();

        // Simulate a concurrent delete winning the race.
        engine.docs.lock().unwrap().clear();

        let deleted = service.delete(&tenant, &project.id, &doc.id).await.unwrap();
        assert!(!deleted);
        // Local cleanup still happened.
        assert_eq!(vector_count(&db, &project.id).await, 0);
    }

    #[tokio::test]
    async fn test_query_consumes_query_bucket() {
        let (db, _dir, tenant) = seeded_db(2, 5).await;
        let project = insert_project(&db, &tenant, "docs", 0).await;
        let engine = Arc::new(FakeEngine::default());
        let service = service(&db, &engine);

        service
            .query(&tenant, &project.id, "anything", None, None)
            .await
            .unwrap();
        service
            .query(&tenant, &project.id, "anything", None, None)
            .await
            .unwrap();

        let err = service
            .query(&tenant, &project.id, "anything", None, None)
            .await
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<QuotaError>().unwrap().kind(),
            "rate_limit_exceeded"
        );
    }
}
