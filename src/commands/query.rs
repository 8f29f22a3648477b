//! Query command - hybrid search over a project.

use anyhow::Result;
use clap::Args;

use crate::local::LocalConfig;

use super::{document_service, open_db, resolve_tenant};

#[derive(Args)]
pub struct QueryCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Natural language query
    pub query: String,

    /// Max results (default: project setting)
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Nearest-neighbor candidate pool (default: project setting)
    #[arg(long)]
    pub vector_k: Option<usize>,
}

impl QueryCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let config = LocalConfig::load()?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;
        let service = document_service(db, &config)?;

        let start = std::time::Instant::now();
        let results = service
            .query(&tenant.id, &self.project, &self.query, self.top_k, self.vector_k)
            .await?;
        let elapsed = start.elapsed().as_millis();

        println!("Found {} results in {}ms\n", results.len(), elapsed);

        for (i, r) in results.iter().enumerate() {
            println!(
                "{}. {} (score: {:.3})",
                i + 1,
                r.title.as_deref().unwrap_or("(untitled)"),
                r.score
            );
            if let Some(content) = &r.content {
                let snippet: String = content.lines().take(3).collect::<Vec<_>>().join("\n   ");
                println!("   {}", snippet);
            }
            println!();
        }

        Ok(())
    }
}
