//! Ingest command - add a document to a project.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::local::LocalConfig;
use crate::local::models::CreateDocument;

use super::{document_service, open_db, resolve_tenant};

#[derive(Args)]
pub struct IngestCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Document title
    pub title: String,

    /// Inline document text
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,

    /// Read document text from a file
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Metadata as a JSON object
    #[arg(long)]
    pub metadata: Option<String>,
}

impl IngestCmd {
    pub async fn run(&self) -> Result<()> {
        let content = match (&self.text, &self.file) {
            (Some(text), _) => text.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
            (None, None) => anyhow::bail!("provide --text or --file"),
        };

        let metadata = match &self.metadata {
            Some(raw) => serde_json::from_str(raw).context("metadata is not valid JSON")?,
            None => serde_json::json!({}),
        };

        let db = open_db().await?;
        let config = LocalConfig::load()?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;
        let service = document_service(db, &config)?;

        let doc = service
            .ingest(
                &tenant.id,
                &self.project,
                CreateDocument {
                    title: self.title.clone(),
                    content,
                    metadata,
                },
            )
            .await?;

        println!("Ingested document {}", doc.id);
        Ok(())
    }
}
