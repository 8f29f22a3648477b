//! Usage command - show a tenant's counters and bucket states.

use anyhow::Result;
use clap::Args;

use crate::local::models::BucketRow;
use crate::quota::get_or_create_usage;

use super::{open_db, resolve_tenant};

#[derive(Args)]
pub struct UsageCmd {
    /// Tenant email
    #[arg(short, long)]
    pub tenant: String,
}

impl UsageCmd {
    pub async fn run(&self) -> Result<()> {
        let db = open_db().await?;
        let tenant = resolve_tenant(&db, &self.tenant).await?;

        let mut conn = db.pool().acquire().await?;
        let usage = get_or_create_usage(&mut conn, &tenant.id).await?;

        println!("Usage for {}", tenant.email);
        println!("  queries:  {}", usage.total_queries);
        println!("  ingests:  {}", usage.total_ingest_requests);
        println!("  vectors:  {}", usage.total_vectors);

        let buckets = sqlx::query_as::<_, BucketRow>(
            "SELECT * FROM rate_limit_buckets WHERE tenant_id = ? ORDER BY limit_type",
        )
        .bind(&tenant.id)
        .fetch_all(&mut *conn)
        .await?;

        if !buckets.is_empty() {
            println!("\nRate limits:");
            for b in buckets {
                if b.max_tokens <= 0 {
                    println!("  {:<8} unlimited", b.limit_type);
                } else {
                    println!("  {:<8} {:.1}/{} tokens", b.limit_type, b.tokens, b.max_tokens);
                }
            }
        }

        Ok(())
    }
}
