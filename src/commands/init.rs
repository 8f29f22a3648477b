//! Init command - create the state directory and seed plans.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use crate::local::{self, LocalDb};

#[derive(Args)]
pub struct InitCmd {
    /// Directory to create the state in (default: current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,
}

impl InitCmd {
    pub async fn run(&self) -> Result<()> {
        let data_dir =
            local::get_data_dir().unwrap_or_else(|| self.path.join(local::DATA_DIR_NAME));

        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).context("Failed to create .corpus directory")?;
            println!("Created {}", data_dir.display());
        }

        let db = LocalDb::open(&data_dir.join("state.sqlite")).await?;
        let changed = db.seed_plans().await?;

        println!("State: {}", data_dir.display());
        if changed > 0 {
            println!("Seeded {changed} plan(s).");
        }

        println!("\nPlans:");
        for plan in db.list_plans().await? {
            println!(
                "  {:<10} {:>4} qps query / {:>4} qps ingest, {} projects, {} vectors/project",
                plan.slug,
                plan.query_qps_limit,
                plan.ingest_qps_limit,
                plan.max_projects()
                    .map_or("unlimited".to_string(), |v| v.to_string()),
                plan.max_vectors_per_project()
                    .map_or("unlimited".to_string(), |v| v.to_string()),
            );
        }

        Ok(())
    }
}
