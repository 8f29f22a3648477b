//! Image command - ingest and search images in a project.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::local::LocalConfig;

use super::{image_service, open_db, resolve_tenant};

#[derive(Args)]
pub struct ImageCmd {
    #[command(subcommand)]
    pub command: ImageSubCmd,
}

#[derive(Subcommand)]
pub enum ImageSubCmd {
    /// Ingest an image file
    Add(AddImageCmd),

    /// Search images by text or by example image
    Query(QueryImageCmd),

    /// Delete an image
    Remove(RemoveImageCmd),
}

#[derive(Args)]
pub struct AddImageCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Image file
    pub file: PathBuf,

    /// Content type (default: guessed from extension)
    #[arg(long)]
    pub content_type: Option<String>,

    /// Metadata as a JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

#[derive(Args)]
pub struct QueryImageCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Text query
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// Query by example image
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Max results
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Nearest-neighbor candidate pool
    #[arg(long)]
    pub vector_k: Option<usize>,
}

#[derive(Args)]
pub struct RemoveImageCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Image id
    pub image: String,
}

fn guess_content_type(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg".to_string(),
        Some("png") => "image/png".to_string(),
        Some("webp") => "image/webp".to_string(),
        Some("gif") => "image/gif".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}

impl ImageCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let config = LocalConfig::load()?;

        match &self.command {
            ImageSubCmd::Add(cmd) => {
                let tenant = resolve_tenant(&db, &cmd.tenant).await?;
                let service = image_service(db, &config).await?;

                let bytes = std::fs::read(&cmd.file)
                    .with_context(|| format!("failed to read {}", cmd.file.display()))?;
                let content_type = cmd
                    .content_type
                    .clone()
                    .unwrap_or_else(|| guess_content_type(&cmd.file));
                let metadata = match &cmd.metadata {
                    Some(raw) => serde_json::from_str(raw).context("metadata is not valid JSON")?,
                    None => serde_json::json!({}),
                };
                let filename = cmd.file.file_name().and_then(|n| n.to_str());

                let ingested = service
                    .ingest(&tenant.id, &cmd.project, &bytes, &content_type, filename, metadata)
                    .await?;

                println!("Ingested image {}", ingested.image.id);
                println!("URL: {}", ingested.url);
            }
            ImageSubCmd::Query(cmd) => {
                let tenant = resolve_tenant(&db, &cmd.tenant).await?;
                let service = image_service(db, &config).await?;

                let results = match (&cmd.text, &cmd.file) {
                    (Some(text), _) => {
                        service
                            .query_by_text(&tenant.id, &cmd.project, text, cmd.top_k, cmd.vector_k)
                            .await?
                    }
                    (None, Some(path)) => {
                        let bytes = std::fs::read(path)
                            .with_context(|| format!("failed to read {}", path.display()))?;
                        service
                            .query_by_image(&tenant.id, &cmd.project, &bytes, cmd.top_k, cmd.vector_k)
                            .await?
                    }
                    (None, None) => anyhow::bail!("provide --text or --file"),
                };

                println!("Found {} results\n", results.len());
                for (i, r) in results.iter().enumerate() {
                    println!(
                        "{}. {} (score: {:.3})",
                        i + 1,
                        r.url.as_deref().unwrap_or("(no url)"),
                        r.score
                    );
                }
            }
            ImageSubCmd::Remove(cmd) => {
                let tenant = resolve_tenant(&db, &cmd.tenant).await?;
                let service = image_service(db, &config).await?;

                let deleted = service.delete(&tenant.id, &cmd.project, &cmd.image).await?;
                if deleted {
                    println!("Deleted image {}", cmd.image);
                } else {
                    println!("Image {} was already absent upstream; local state cleaned.", cmd.image);
                }
            }
        }
        Ok(())
    }
}
