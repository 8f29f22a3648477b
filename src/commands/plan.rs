//! Plan command - list plans and move tenants between them.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::quota;

use super::{open_db, resolve_tenant};

#[derive(Args)]
pub struct PlanCmd {
    #[command(subcommand)]
    pub command: PlanSubCmd,
}

#[derive(Subcommand)]
pub enum PlanSubCmd {
    /// List available plans
    List,

    /// Move a tenant to a different plan
    Set(SetPlanCmd),
}

#[derive(Args)]
pub struct SetPlanCmd {
    /// Tenant email
    pub email: String,

    /// Target plan slug
    pub plan: String,
}

impl PlanCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        match &self.command {
            PlanSubCmd::List => {
                for plan in db.list_plans().await? {
                    println!(
                        "{:<10} ${:>6.2}/mo  {:>4} qps query  {:>4} qps ingest",
                        plan.slug,
                        plan.price_cents as f64 / 100.0,
                        plan.query_qps_limit,
                        plan.ingest_qps_limit,
                    );
                }
            }
            PlanSubCmd::Set(cmd) => {
                let tenant = resolve_tenant(&db, &cmd.email).await?;
                let plan = db
                    .find_plan_by_slug(&cmd.plan)
                    .await?
                    .with_context(|| format!("unknown plan '{}'", cmd.plan))?;

                db.set_tenant_plan(&tenant.id, &plan)
                    .await?
                    .context("tenant has no subscription to update")?;

                // Reset live buckets so old limits don't linger.
                quota::apply_plan_limits(&db, &tenant.id, &plan).await?;

                println!("Moved {} to plan '{}'", tenant.email, plan.slug);
            }
        }
        Ok(())
    }
}
