//! Signup command - create a tenant with a subscription.

use anyhow::{Context, Result};
use clap::Args;

use super::open_db;

#[derive(Args)]
pub struct SignupCmd {
    /// Tenant email (unique)
    pub email: String,

    /// Plan slug (tinkering, building, scale)
    #[arg(short, long, default_value = "tinkering")]
    pub plan: String,

    /// Display name
    #[arg(short, long)]
    pub name: Option<String>,
}

impl SignupCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;

        let plan = db
            .find_plan_by_slug(&self.plan)
            .await?
            .with_context(|| format!("unknown plan '{}'", self.plan))?;

        if db.find_tenant_by_email(&self.email).await?.is_some() {
            anyhow::bail!("tenant {} already exists", self.email);
        }

        let tenant = db
            .create_tenant(&self.email, self.name.as_deref(), &plan)
            .await?;

        println!("Created tenant {} on plan '{}'", tenant.email, plan.slug);
        Ok(())
    }
}
