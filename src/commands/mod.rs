//! CLI command implementations.

mod config;
mod image;
mod ingest;
mod init;
mod list;
mod plan;
mod project;
mod query;
mod remove;
mod signup;
mod stats;
mod usage;

pub use config::ConfigCmd;
pub use image::ImageCmd;
pub use ingest::IngestCmd;
pub use init::InitCmd;
pub use list::ListCmd;
pub use plan::PlanCmd;
pub use project::ProjectCmd;
pub use query::QueryCmd;
pub use remove::RemoveCmd;
pub use signup::SignupCmd;
pub use stats::StatsCmd;
pub use usage::UsageCmd;

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::embeddings::HttpEmbedder;
use crate::engine::{DocumentIndex, EngineClient, ImageIndex};
use crate::local::{
    self, BlobStorage, DocumentService, ImageService, LocalConfig, LocalDb,
};
use crate::quota::QuotaError;
use crate::types::Tenant;

/// Locate the state directory or fail with a hint.
pub(crate) fn require_data_dir() -> Result<PathBuf> {
    local::get_data_dir().context("No .corpus directory found. Run `corpus init` first.")
}

pub(crate) async fn open_db() -> Result<LocalDb> {
    let data_dir = require_data_dir()?;
    LocalDb::open(&data_dir.join("state.sqlite")).await
}

pub(crate) async fn resolve_tenant(db: &LocalDb, email: &str) -> Result<Tenant> {
    db.find_tenant_by_email(email)
        .await?
        .with_context(|| format!("no tenant with email {email}. Run `corpus signup` first."))
}

fn require_embedder(config: &LocalConfig) -> Result<HttpEmbedder> {
    let key = config
        .embedding_api_key_secret()
        .context("Embedding API key not configured. Run: corpus config set-key <key>")?;
    Ok(HttpEmbedder::new(
        &config.embedding_base_url,
        &config.embedding_model,
        key,
    ))
}

fn image_embedder(config: &LocalConfig) -> Result<HttpEmbedder> {
    let key = config
        .embedding_api_key_secret()
        .context("Embedding API key not configured. Run: corpus config set-key <key>")?;
    Ok(HttpEmbedder::new(
        &config.embedding_base_url,
        &config.image_embedding_model,
        key,
    ))
}

/// Wire up the document pipeline from config.
pub(crate) fn document_service(
    db: LocalDb,
    config: &LocalConfig,
) -> Result<DocumentService<EngineClient, HttpEmbedder>> {
    let backend = EngineClient::new(
        &config.engine_endpoint,
        &config.engine_namespace,
        &config.engine_document_type,
        &config.engine_rank_profile,
        config.engine_timeout(),
    )?;
    let codec = config.document_codec()?;
    let embedder = require_embedder(config)?;
    Ok(DocumentService::new(
        db,
        DocumentIndex::new(backend, codec),
        embedder,
    ))
}

/// Wire up the image pipeline from config.
pub(crate) async fn image_service(
    db: LocalDb,
    config: &LocalConfig,
) -> Result<ImageService<EngineClient, HttpEmbedder, BlobStorage>> {
    let data_dir = require_data_dir()?;
    let backend = EngineClient::new(
        &config.engine_endpoint,
        &config.engine_namespace,
        &config.engine_image_document_type,
        &config.engine_image_rank_profile,
        config.engine_timeout(),
    )?;
    let codec = config.image_codec()?;
    let embedder = image_embedder(config)?;
    let storage = BlobStorage::new(
        data_dir.join("blobs"),
        config.image_public_base_url.clone(),
    )
    .await?;
    Ok(ImageService::new(
        db,
        ImageIndex::new(backend, codec),
        embedder,
        storage,
        config.clone(),
    ))
}

/// Render a failure for the terminal with its stable kind when one exists.
pub fn render_error(err: &anyhow::Error) -> String {
    if let Some(quota) = err.downcast_ref::<QuotaError>() {
        let mut line = format!("error[{}]: {quota}", quota.kind());
        if let QuotaError::RateLimitExceeded { retry_at, .. } = quota {
            line.push_str(&format!(" (retry after {})", retry_at.to_rfc3339()));
        }
        return line;
    }
    if let Some(engine) = err.downcast_ref::<crate::engine::EngineError>() {
        return format!("error[{}]: {engine}", engine.kind());
    }
    format!("error: {err:#}")
}
