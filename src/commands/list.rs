//! List command - show a tenant's projects.

use anyhow::Result;
use clap::Args;

use super::{open_db, resolve_tenant};

#[derive(Args)]
pub struct ListCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,
}

impl ListCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;

        let projects = db.list_projects(&tenant.id).await?;
        if projects.is_empty() {
            println!("No projects.");
            return Ok(());
        }

        for p in projects {
            println!(
                "{}  {:<20} {:>8} vectors  dim={} top_k={}",
                p.id, p.name, p.vector_count, p.embedding_dim, p.top_k_default
            );
        }
        Ok(())
    }
}
