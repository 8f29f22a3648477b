//! Per-project store façades.
//!
//! These compose the embedding codec, the query builder, and a
//! [`SearchBackend`] into the ingest/delete/search surface the services
//! call. Embedding-dimension mismatches between a project's model and the
//! engine's transport dimension are reconciled by the codec (truncate/pad),
//! never by erroring, so model upgrades don't force a reindex.

use serde_json::json;

use crate::local::models::{DocumentRow, ImageRow};

use super::client::SearchBackend;
use super::codec::EmbeddingCodec;
use super::error::EngineError;
use super::query::{QuerySpec, SearchRequest};
use super::results::SearchHit;

/// Document (text) side of the engine.
pub struct DocumentIndex<B: SearchBackend> {
    backend: B,
    codec: EmbeddingCodec,
}

impl<B: SearchBackend> DocumentIndex<B> {
    pub fn new(backend: B, codec: EmbeddingCodec) -> Self {
        Self { backend, codec }
    }

    /// Push a document and its embedding into the project's partition.
    pub async fn upsert(&self, doc: &DocumentRow, embedding: &[f32]) -> Result<(), EngineError> {
        let encoded = self.codec.encode(embedding);
        let fields = json!({
            "project_id": doc.project_id,
            "document_id": doc.id,
            "title": doc.title,
            "content": doc.content,
            "metadata": doc.metadata,
            "created_at": doc.created_at,
            "active": doc.active,
            "embedding": { "values": encoded.to_json_values() },
        });
        self.backend.upsert(&doc.engine_document_id, fields).await
    }

    /// Remove a document from the engine. False means it was already gone.
    pub async fn delete(&self, doc: &DocumentRow) -> Result<bool, EngineError> {
        self.backend.delete(&doc.engine_document_id).await
    }

    /// Weighted vector+lexical retrieval over one project.
    #[allow(clippy::too_many_arguments)]
    pub async fn hybrid_search(
        &self,
        project_id: &str,
        embedding: &[f32],
        fts_query: Option<&str>,
        top_k: usize,
        vector_k: usize,
        weight_vector: f64,
        weight_text: f64,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let encoded = self.codec.encode(embedding);
        let request = SearchRequest {
            project_id: project_id.to_string(),
            spec: QuerySpec::hybrid(encoded, vector_k, fts_query, weight_vector, weight_text),
            top_k,
        };
        self.backend.search(&request).await
    }
}

/// Image side of the engine. Retrieval is vector-only; there is no lexical
/// branch and no blend weights on this path.
pub struct ImageIndex<B: SearchBackend> {
    backend: B,
    codec: EmbeddingCodec,
}

impl<B: SearchBackend> ImageIndex<B> {
    pub fn new(backend: B, codec: EmbeddingCodec) -> Self {
        Self { backend, codec }
    }

    pub async fn upsert(&self, image: &ImageRow, embedding: &[f32]) -> Result<(), EngineError> {
        let encoded = self.codec.encode(embedding);
        let fields = json!({
            "project_id": image.project_id,
            "image_id": image.id,
            "storage_key": image.storage_key,
            "content_type": image.content_type,
            "metadata": image.metadata,
            "created_at": image.created_at,
            "active": image.active,
            "embedding": { "values": encoded.to_json_values() },
        });
        self.backend.upsert(&image.engine_document_id, fields).await
    }

    pub async fn delete(&self, image: &ImageRow) -> Result<bool, EngineError> {
        self.backend.delete(&image.engine_document_id).await
    }

    pub async fn search(
        &self,
        project_id: &str,
        embedding: &[f32],
        vector_k: usize,
        top_k: usize,
    ) -> Result<Vec<SearchHit>, EngineError> {
        let encoded = self.codec.encode(embedding);
        let request = SearchRequest {
            project_id: project_id.to_string(),
            spec: QuerySpec::vector_only(encoded, vector_k),
            top_k,
        };
        self.backend.search(&request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::Value;

    use super::*;
    use crate::engine::codec::TransportEncoding;
    use crate::engine::query::QuerySpec;

    #[derive(Default)]
    struct RecordingBackend {
        upserts: Mutex<Vec<(String, Value)>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl SearchBackend for &RecordingBackend {
        async fn upsert(&self, document_id: &str, fields: Value) -> Result<(), EngineError> {
            self.upserts
                .lock()
                .unwrap()
                .push((document_id.to_string(), fields));
            Ok(())
        }

        async fn delete(&self, _document_id: &str) -> Result<bool, EngineError> {
            Ok(false)
        }

        async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, EngineError> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(vec![])
        }
    }

    fn doc() -> DocumentRow {
        DocumentRow {
            id: "doc-1".to_string(),
            project_id: "proj-1".to_string(),
            engine_document_id: "proj-1-doc-1".to_string(),
            title: "Title".to_string(),
            content: "Body".to_string(),
            metadata: "{}".to_string(),
            active: true,
            created_at: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_reconciles_embedding_dimension() {
        let backend = RecordingBackend::default();
        let codec = EmbeddingCodec::new(4, TransportEncoding::Float).unwrap();
        let index = DocumentIndex::new(&backend, codec);

        // Oversized embedding is truncated to the transport dimension.
        index.upsert(&doc(), &[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).await.unwrap();

        let upserts = backend.upserts.lock().unwrap();
        let (id, fields) = &upserts[0];
        assert_eq!(id, "proj-1-doc-1");
        assert_eq!(fields["project_id"], "proj-1");
        assert_eq!(
            fields["embedding"]["values"],
            serde_json::json!([0.1_f32, 0.2_f32, 0.3_f32, 0.4_f32])
        );
    }

    #[tokio::test]
    async fn test_hybrid_search_builds_hybrid_spec() {
        let backend = RecordingBackend::default();
        let codec = EmbeddingCodec::new(4, TransportEncoding::Float).unwrap();
        let index = DocumentIndex::new(&backend, codec);

        index
            .hybrid_search("proj-1", &[0.1; 4], Some("query text"), 5, 50, 0.6, 0.4)
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        assert_eq!(requests[0].top_k, 5);
        match &requests[0].spec {
            QuerySpec::Hybrid {
                vector_k,
                text,
                weight_vector,
                weight_text,
                ..
            } => {
                assert_eq!(*vector_k, 50);
                assert_eq!(text.as_deref(), Some("query text"));
                assert_eq!(*weight_vector, 0.6);
                assert_eq!(*weight_text, 0.4);
            }
            other => panic!("expected hybrid spec, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_search_is_vector_only() {
        let backend = RecordingBackend::default();
        let codec = EmbeddingCodec::new(8, TransportEncoding::PackedInt8).unwrap();
        let index = ImageIndex::new(&backend, codec);

        index.search("proj-1", &[1.0; 8], 20, 5).await.unwrap();

        let requests = backend.requests.lock().unwrap();
        assert!(matches!(
            requests[0].spec,
            QuerySpec::VectorOnly { vector_k: 20, .. }
        ));
    }
}
