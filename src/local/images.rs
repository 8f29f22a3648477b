//! Image ingest/query/delete orchestration.
//!
//! Images add one more external system to the pipeline: object storage.
//! Bytes land there before the embedding or the engine write, so every
//! failure path after the upload runs a compensating blob delete keyed by
//! the storage key. Cleanup failures are logged and swallowed; the root
//! cause is what propagates.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::embeddings::ImageEmbedder;
use crate::engine::{ImageIndex, SearchBackend, SearchHit};
use crate::quota::{
    self, QuotaError, decrement_vector_usage, ensure_vector_capacity, increment_usage,
};
use crate::types::LimitType;

use super::blobs::ImageStorage;
use super::config::LocalConfig;
use super::db::LocalDb;
use super::models::{ImageRow, ProjectRow, metadata_to_text};

/// Image pipeline for one deployment.
pub struct ImageService<B: SearchBackend, E: ImageEmbedder, S: ImageStorage> {
    db: LocalDb,
    index: ImageIndex<B>,
    embedder: E,
    storage: S,
    config: LocalConfig,
}

/// An ingested image with its servable URL.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedImage {
    pub image: ImageRow,
    pub url: String,
}

/// One image search result.
#[derive(Debug, Clone, Serialize)]
pub struct ImageResult {
    pub image_id: Option<String>,
    pub storage_key: Option<String>,
    pub url: Option<String>,
    pub content_type: Option<String>,
    pub metadata: Option<String>,
    pub score: f64,
}

impl<B: SearchBackend, E: ImageEmbedder, S: ImageStorage> ImageService<B, E, S> {
    pub fn new(
        db: LocalDb,
        index: ImageIndex<B>,
        embedder: E,
        storage: S,
        config: LocalConfig,
    ) -> Self {
        Self {
            db,
            index,
            embedder,
            storage,
            config,
        }
    }

    /// Ingest one image: validate, quota-check, upload bytes, embed,
    /// engine upsert, then local row and counters in one transaction.
    pub async fn ingest(
        &self,
        tenant_id: &str,
        project_id: &str,
        bytes: &[u8],
        content_type: &str,
        filename: Option<&str>,
        metadata: serde_json::Value,
    ) -> Result<IngestedImage> {
        let (project, plan) = self.load_project(tenant_id, project_id).await?;

        // Everything that can reject without compensation goes first.
        self.config.check_image_payload(bytes, content_type)?;
        ensure_vector_capacity(&plan, 1, Some(&project))?;
        quota::consume(&self.db, tenant_id, LimitType::Ingest, 1.0).await?;

        let image_id = Uuid::new_v4().to_string();
        let stored = self
            .storage
            .upload(&project.id, &image_id, bytes, content_type, filename)
            .await
            .context("image upload failed")?;

        // The object is committed to storage; from here on, failure means
        // compensating deletion before the error propagates.
        let embedding = match self.embedder.embed_image(bytes).await {
            Ok(embedding) => embedding,
            Err(e) => {
                self.cleanup_blob(&stored.storage_key).await;
                return Err(e.context("embedding image failed"));
            }
        };

        let image = ImageRow {
            engine_document_id: format!("{}-img-{}", project.id, image_id),
            id: image_id,
            project_id: project.id.clone(),
            storage_key: stored.storage_key.clone(),
            content_type: content_type.to_string(),
            metadata: metadata_to_text(&metadata),
            active: true,
            created_at: Utc::now().to_rfc3339(),
        };

        if let Err(e) = self.index.upsert(&image, &embedding).await {
            self.cleanup_blob(&stored.storage_key).await;
            return Err(e.into());
        }

        match self.commit_ingest(tenant_id, &project, &image).await {
            Ok(()) => {
                info!(project_id, image_id = %image.id, "image ingested");
                Ok(IngestedImage {
                    url: stored.url,
                    image,
                })
            }
            Err(e) => {
                self.cleanup_engine_image(&image).await;
                self.cleanup_blob(&stored.storage_key).await;
                Err(e)
            }
        }
    }

    async fn commit_ingest(
        &self,
        tenant_id: &str,
        project: &ProjectRow,
        image: &ImageRow,
    ) -> Result<()> {
        let mut tx = self.db.pool().begin().await?;

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
            INSERT INTO images (id, project_id, engine_document_id, storage_key, content_type, metadata, active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 1, ?)
            "#,
        )
        .bind(&image.id)
        .bind(&image.project_id)
        .bind(&image.engine_document_id)
        .bind(&image.storage_key)
        .bind(&image.content_type)
        .bind(&image.metadata)
        .bind(&image.created_at)
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

    /// Search images by text, in the joint embedding space.
    pub async fn query_by_text(
        &self,
        tenant_id: &str,
        project_id: &str,
        query: &str,
        top_k: Option<usize>,
        vector_k: Option<usize>,
    ) -> Result<Vec<ImageResult>> {
        let (project, _plan) = self.load_project(tenant_id, project_id).await?;
        quota::consume(&self.db, tenant_id, LimitType::Query, 1.0).await?;

        let embedding = self
            .embedder
            .embed_text(query)
            .await
            .context("embedding image query failed")?;
        self.search(tenant_id, &project, &embedding, top_k, vector_k)
            .await
    }

    /// Search images by example image.
    pub async fn query_by_image(
        &self,
        tenant_id: &str,
        project_id: &str,
        bytes: &[u8],
        top_k: Option<usize>,
        vector_k: Option<usize>,
    ) -> Result<Vec<ImageResult>> {
        let (project, _plan) = self.load_project(tenant_id, project_id).await?;
        quota::consume(&self.db, tenant_id, LimitType::Query, 1.0).await?;

        let embedding = self
            .embedder
            .embed_image(bytes)
            .await
            .context("embedding query image failed")?;
        self.search(tenant_id, &project, &embedding, top_k, vector_k)
            .await
    }

    async fn search(
        &self,
        tenant_id: &str,
        project: &ProjectRow,
        embedding: &[f32],
        top_k: Option<usize>,
        vector_k: Option<usize>,
    ) -> Result<Vec<ImageResult>> {
        let defaults = project.query_defaults(top_k, vector_k);

        let hits = self
            .index
            .search(&project.id, embedding, defaults.vector_k, defaults.top_k)
            .await?;

        let mut tx = self.db.pool().begin().await?;
        increment_usage(&mut tx, tenant_id, 1, 0, 0).await?;
        tx.commit().await?;

        Ok(hits.iter().map(|hit| self.image_result(hit)).collect())
    }

    fn image_result(&self, hit: &SearchHit) -> ImageResult {
        let storage_key = hit.field_str("storage_key").map(str::to_string);
        ImageResult {
            image_id: hit.field_str("image_id").map(str::to_string),
            url: storage_key.as_deref().map(|k| self.storage.resolve_url(k)),
            storage_key,
            content_type: hit.field_str("content_type").map(str::to_string),
            metadata: hit.field_str("metadata").map(str::to_string),
            score: hit.relevance,
        }
    }

    /// Delete an image. The row is marked inactive and counters come down
    /// even when object storage refuses to delete; engine-side absence is
    /// tolerated as already-deleted.
    pub async fn delete(
        &self,
        tenant_id: &str,
        project_id: &str,
        image_id: &str,
    ) -> Result<bool> {
        let (project, _plan) = self.load_project(tenant_id, project_id).await?;

        let image = self
            .db
            .find_image(&project.id, image_id)
            .await?
            .ok_or_else(|| anyhow!("image {image_id} not found"))?;

        let deleted = self.index.delete(&image).await?;
        if !deleted {
            warn!(image_id, "engine image already absent on delete");
        }

        if let Err(e) = self.storage.delete(&image.storage_key).await {
            warn!(
                storage_key = %image.storage_key,
                error = %e,
                "object storage delete failed; image remains soft-deleted"
            );
        }

        let mut tx = self.db.pool().begin().await?;
        sqlx::query("UPDATE images SET active = 0 WHERE id = ?")
            .bind(&image.id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE projects SET vector_count = MAX(0, vector_count - 1) WHERE id = ?")
            .bind(&project.id)
            .execute(&mut *tx)
            .await?;
        decrement_vector_usage(&mut tx, tenant_id, 1).await?;
        tx.commit().await?;

        info!(project_id, image_id, "image deleted");
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

    async fn cleanup_blob(&self, storage_key: &str) {
        if let Err(e) = self.storage.delete(storage_key).await {
            warn!(
                storage_key,
                error = %e,
                "failed to clean up uploaded image after aborted ingest"
            );
        }
    }

    async fn cleanup_engine_image(&self, image: &ImageRow) {
        if let Err(e) = self.index.delete(image).await {
            warn!(
                image_id = %image.id,
                error = %e,
                "failed to clean up engine image after aborted ingest"
            );
        }
    }
}
