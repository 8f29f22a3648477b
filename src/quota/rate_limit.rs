//! Per-tenant token-bucket rate limiting.
//!
//! One bucket per (tenant, limit type). Capacity doubles as the refill
//! rate: a bucket refills completely in one second, so `max_tokens` is the
//! steady-state qps. Buckets are created lazily from the tenant's live plan
//! inside the same transaction that consumes from them, so a plan change
//! can never leave a stale default behind.
//!
//! The whole read-modify-write runs on the pool's single connection inside
//! one transaction; a failed consume rolls back and leaves the row
//! untouched.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::local::db::LocalDb;
use crate::local::models::{BucketRow, parse_timestamp};
use crate::types::{LimitType, Plan};

use super::error::QuotaError;

/// Outcome of a successful consume.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Tokens left after this consume; infinite for unlimited buckets.
    pub remaining: f64,
    pub capacity: i64,
    pub reset_at: DateTime<Utc>,
}

/// Take `cost` tokens from the tenant's bucket, refilling for elapsed time
/// first. Fails with `RateLimitExceeded` when the bucket cannot cover the
/// cost, without mutating the stored balance.
pub async fn consume(
    db: &LocalDb,
    tenant_id: &str,
    limit_type: LimitType,
    cost: f64,
) -> Result<RateLimitDecision, QuotaError> {
    consume_at(db, tenant_id, limit_type, cost, Utc::now()).await
}

/// [`consume`] with an explicit clock, used directly by tests.
pub async fn consume_at(
    db: &LocalDb,
    tenant_id: &str,
    limit_type: LimitType,
    cost: f64,
    now: DateTime<Utc>,
) -> Result<RateLimitDecision, QuotaError> {
    let mut tx = db.pool().begin().await?;

    let bucket = sqlx::query_as::<_, BucketRow>(
        "SELECT * FROM rate_limit_buckets WHERE tenant_id = ? AND limit_type = ?",
    )
    .bind(tenant_id)
    .bind(limit_type.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let mut bucket = match bucket {
        Some(bucket) => bucket,
        None => {
            // Self-healing creation from the live plan, never a cached default.
            let plan = sqlx::query_as::<_, Plan>(
                r#"
                SELECT p.* FROM plans p
                JOIN subscriptions s ON s.plan_id = p.id
                WHERE s.tenant_id = ? AND s.status = 'active'
                "#,
            )
            .bind(tenant_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| {
                QuotaError::MissingSubscription(format!(
                    "tenant {tenant_id} has no active subscription"
                ))
            })?;

            let max_tokens = plan.qps_limit(limit_type);
            debug!(tenant_id, %limit_type, max_tokens, "creating rate limit bucket");

            let bucket = BucketRow {
                id: Uuid::new_v4().to_string(),
                tenant_id: tenant_id.to_string(),
                limit_type: limit_type.as_str().to_string(),
                tokens: max_tokens as f64,
                max_tokens,
                last_refill: now.to_rfc3339(),
            };
            sqlx::query(
                r#"
                INSERT INTO rate_limit_buckets (id, tenant_id, limit_type, tokens, max_tokens, last_refill)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&bucket.id)
            .bind(&bucket.tenant_id)
            .bind(&bucket.limit_type)
            .bind(bucket.tokens)
            .bind(bucket.max_tokens)
            .bind(&bucket.last_refill)
            .execute(&mut *tx)
            .await?;
            bucket
        }
    };

    if bucket.max_tokens <= 0 {
        // Unlimited plan: pin the balance and refresh the clock.
        bucket.tokens = bucket.max_tokens as f64;
        persist(&mut tx, &bucket, now).await?;
        tx.commit().await?;
        return Ok(RateLimitDecision {
            remaining: f64::INFINITY,
            capacity: bucket.max_tokens,
            reset_at: now,
        });
    }

    let last_refill = parse_timestamp(&bucket.last_refill)
        .map_err(|e| QuotaError::Configuration(format!("bucket {}: {e}", bucket.id)))?;
    bucket.tokens = refill(bucket.tokens, bucket.max_tokens, elapsed_seconds(last_refill, now));

    if bucket.tokens < cost {
        // Rolls back on drop; the stored balance stays as it was.
        let deficit = (cost - bucket.tokens) / bucket.max_tokens as f64;
        let retry_at = now + seconds(deficit);
        return Err(QuotaError::RateLimitExceeded {
            detail: format!("{limit_type} rate limit exceeded"),
            retry_at,
        });
    }

    bucket.tokens -= cost;
    persist(&mut tx, &bucket, now).await?;
    tx.commit().await?;

    let reset_at = now + seconds(bucket.tokens / bucket.max_tokens as f64);
    Ok(RateLimitDecision {
        remaining: bucket.tokens,
        capacity: bucket.max_tokens,
        reset_at,
    })
}

/// Reset a tenant's existing buckets to a plan's capacities. Called when a
/// subscription changes tier so old limits never outlive the old plan.
pub async fn apply_plan_limits(db: &LocalDb, tenant_id: &str, plan: &Plan) -> Result<(), QuotaError> {
    let now = Utc::now().to_rfc3339();
    for limit_type in [LimitType::Query, LimitType::Ingest] {
        let max_tokens = plan.qps_limit(limit_type);
        sqlx::query(
            r#"
            UPDATE rate_limit_buckets
            SET tokens = ?, max_tokens = ?, last_refill = ?
            WHERE tenant_id = ? AND limit_type = ?
            "#,
        )
        .bind(max_tokens as f64)
        .bind(max_tokens)
        .bind(&now)
        .bind(tenant_id)
        .bind(limit_type.as_str())
        .execute(db.pool())
        .await?;
    }
    Ok(())
}

/// Continuous refill at `max_tokens` per second, capped at capacity.
fn refill(tokens: f64, max_tokens: i64, elapsed_secs: f64) -> f64 {
    let max = max_tokens as f64;
    (tokens + elapsed_secs * max).min(max)
}

/// Seconds between refills, clamped at zero so a backwards clock step
/// never drains the bucket.
fn elapsed_seconds(last_refill: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - last_refill).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}

fn seconds(secs: f64) -> Duration {
    Duration::milliseconds((secs * 1000.0).ceil() as i64)
}

async fn persist(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    bucket: &BucketRow,
    now: DateTime<Utc>,
) -> Result<(), QuotaError> {
    sqlx::query("UPDATE rate_limit_buckets SET tokens = ?, last_refill = ? WHERE id = ?")
        .bind(bucket.tokens)
        .bind(now.to_rfc3339())
        .bind(&bucket.id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}
