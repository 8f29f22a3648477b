//! Stats command - deployment-wide totals.

use anyhow::Result;
use clap::Args;

use super::open_db;

#[derive(Args)]
pub struct StatsCmd {}

impl StatsCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;

        let tenants: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tenants")
            .fetch_one(db.pool())
            .await?;
        let projects: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE active = 1")
                .fetch_one(db.pool())
                .await?;
        let vectors: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(vector_count), 0) FROM projects WHERE active = 1",
        )
        .fetch_one(db.pool())
        .await?;
        let documents: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE active = 1")
                .fetch_one(db.pool())
                .await?;
        let images: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images WHERE active = 1")
            .fetch_one(db.pool())
            .await?;

        println!("Tenants:   {tenants}");
        println!("Projects:  {projects}");
        println!("Vectors:   {vectors}");
        println!("Documents: {documents}");
        println!("Images:    {images}");

        Ok(())
    }
}
