//! Remove command - delete a document from a project.

use anyhow::Result;
use clap::Args;

use crate::local::LocalConfig;

use super::{document_service, open_db, resolve_tenant};

#[derive(Args)]
pub struct RemoveCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,

    /// Project id
    #[arg(short, long)]
    pub project: String,

    /// Document id
    pub document: String,
}

impl RemoveCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let config = LocalConfig::load()?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;
        let service = document_service(db, &config)?;

        let deleted = service
            .delete(&tenant.id, &self.project, &self.document)
            .await?;

        if deleted {
            println!("Deleted document {}", self.document);
        } else {
            println!("Document {} was already absent upstream; local state cleaned.", self.document);
        }
        Ok(())
    }
}
