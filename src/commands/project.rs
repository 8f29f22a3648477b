//! Project command - provision a retrieval namespace.

use anyhow::{Context, Result};
use clap::Args;

use crate::local::models::CreateProject;
use crate::quota::QuotaError;

use super::{open_db, resolve_tenant};

#[derive(Args)]
pub struct ProjectCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project name
    pub name: String,

    /// Embedding dimension for this project's model
    #[arg(long, default_value = "256")]
    pub embedding_dim: i64,

    /// Vector weight for hybrid ranking
    #[arg(long, default_value = "0.5")]
    pub weight_vector: f64,

    /// Text weight for hybrid ranking
    #[arg(long, default_value = "0.5")]
    pub weight_text: f64,

    /// Default result count for queries
    #[arg(long, default_value = "10")]
    pub top_k: i64,

    /// Default nearest-neighbor candidate pool
    #[arg(long, default_value = "50")]
    pub vector_k: i64,
}

impl ProjectCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;

        let plan = db
            .plan_for_tenant(&tenant.id)
            .await?
            .ok_or_else(|| QuotaError::MissingSubscription(tenant.id.clone()))?;

        let project = db
            .create_project(&plan, &CreateProject {
                tenant_id: tenant.id.clone(),
                name: self.name.clone(),
                embedding_dim: self.embedding_dim,
                hybrid_weight_vector: self.weight_vector,
                hybrid_weight_text: self.weight_text,
                top_k_default: self.top_k,
                vector_search_k: self.vector_k,
            })
            .await
            .context("failed to create project")?;

        println!("Created project {} ({})", project.name, project.id);
        Ok(())
    }
}
