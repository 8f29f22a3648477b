//! Capacity checks and usage counters.
//!
//! These run against the caller's open transaction so a later failure in
//! the guarded ingest/delete rolls the counter change back with it.

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::local::models::{ProjectRow, UsageRow};
use crate::types::Plan;

use super::error::QuotaError;

/// Fail when the tenant already holds the plan's project quota.
pub async fn ensure_project_capacity(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    plan: &Plan,
) -> Result<(), QuotaError> {
    let Some(max_projects) = plan.max_projects() else {
        return Ok(());
    };

    let active: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM projects WHERE tenant_id = ? AND active = 1")
            .bind(tenant_id)
            .fetch_one(&mut *conn)
            .await?;

    if active >= max_projects {
        return Err(QuotaError::ProjectLimitExceeded(format!(
            "plan '{}' allows {max_projects} projects; upgrade to add more",
            plan.slug
        )));
    }
    Ok(())
}

/// Fail when adding `additional` vectors would push the project past the
/// plan's per-project cap. No-op for unlimited plans or when no project is
/// in scope. Pure check against the project row the caller holds; callers
/// re-run it on a fresh row inside their final transaction.
pub fn ensure_vector_capacity(
    plan: &Plan,
    additional: i64,
    project: Option<&ProjectRow>,
) -> Result<(), QuotaError> {
    let (Some(limit), Some(project)) = (plan.max_vectors_per_project(), project) else {
        return Ok(());
    };

    if project.vector_count + additional > limit {
        return Err(QuotaError::VectorCapacityExceeded(format!(
            "project '{}' is at its {limit}-vector limit; upgrade or archive vectors",
            project.name
        )));
    }
    Ok(())
}

/// Bump a tenant's running totals.
pub async fn increment_usage(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    queries: i64,
    ingests: i64,
    vectors: i64,
) -> Result<UsageRow, QuotaError> {
    let mut usage = get_or_create_usage(conn, tenant_id).await?;
    usage.total_queries += queries;
    usage.total_ingest_requests += ingests;
    usage.total_vectors += vectors;
    save_usage(conn, &usage).await?;
    Ok(usage)
}

/// Reduce `total_vectors`, clamping at zero so a double-delete race can
/// never drive the counter negative.
pub async fn decrement_vector_usage(
    conn: &mut SqliteConnection,
    tenant_id: &str,
    vectors: i64,
) -> Result<UsageRow, QuotaError> {
    let mut usage = get_or_create_usage(conn, tenant_id).await?;
    usage.total_vectors = (usage.total_vectors - vectors).max(0);
    save_usage(conn, &usage).await?;
    Ok(usage)
}

/// Fetch the tenant's usage row, creating it on first use.
pub async fn get_or_create_usage(
    conn: &mut SqliteConnection,
    tenant_id: &str,
) -> Result<UsageRow, QuotaError> {
    let existing = sqlx::query_as::<_, UsageRow>(
        "SELECT * FROM usage_counters WHERE tenant_id = ?",
    )
    .bind(tenant_id)
    .fetch_optional(&mut *conn)
    .await?;

    if let Some(usage) = existing {
        return Ok(usage);
    }

    let usage = UsageRow {
        id: Uuid::new_v4().to_string(),
        tenant_id: tenant_id.to_string(),
        total_queries: 0,
        total_ingest_requests: 0,
        total_vectors: 0,
        updated_at: Utc::now().to_rfc3339(),
    };
    sqlx::query(
        r#"
        INSERT INTO usage_counters (id, tenant_id, total_queries, total_ingest_requests, total_vectors, updated_at)
        VALUES (?, ?, 0, 0, 0, ?)
        "#,
    )
    .bind(&usage.id)
    .bind(&usage.tenant_id)
    .bind(&usage.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(usage)
}

async fn save_usage(conn: &mut SqliteConnection, usage: &UsageRow) -> Result<(), QuotaError> {
    sqlx::query(
        r#"
        UPDATE usage_counters
        SET total_queries = ?, total_ingest_requests = ?, total_vectors = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(usage.total_queries)
    .bind(usage.total_ingest_requests)
    .bind(usage.total_vectors)
    .bind(Utc::now().to_rfc3339())
    .bind(&usage.id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::db::tests::{insert_project, seeded_db, test_plan};

    async fn check_projects(db: &crate::local::LocalDb, tenant: &str, plan: &Plan) -> Result<(), QuotaError> {
        let mut conn = db.pool().acquire().await.unwrap();
        ensure_project_capacity(&mut conn, tenant, plan).await
    }

    #[tokio::test]
    async fn test_project_capacity_at_limit() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let plan = test_plan(2, 10_000);

        check_projects(&db, &tenant, &plan).await.unwrap();

        insert_project(&db, &tenant, "one", 0).await;
        check_projects(&db, &tenant, &plan).await.unwrap();

        insert_project(&db, &tenant, "two", 0).await;
        let err = check_projects(&db, &tenant, &plan).await.unwrap_err();
        assert_eq!(err.kind(), "project_limit_exceeded");
    }

    #[tokio::test]
    async fn test_unlimited_projects_never_blocks() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let plan = test_plan(-1, 10_000);

        for i in 0..5 {
            insert_project(&db, &tenant, &format!("p{i}"), 0).await;
        }
        let mut conn = db.pool().acquire().await.unwrap();
        ensure_project_capacity(&mut conn, &tenant, &plan)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_vector_capacity_boundary() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let plan = test_plan(3, 100);

        // One below the limit: the final vector fits.
        let project = insert_project(&db, &tenant, "edge", 99).await;
        ensure_vector_capacity(&plan, 1, Some(&project)).unwrap();

        // At the limit: one more must fail.
        let full = insert_project(&db, &tenant, "full", 100).await;
        let err = ensure_vector_capacity(&plan, 1, Some(&full)).unwrap_err();
        assert_eq!(err.kind(), "vector_capacity_exceeded");
    }

    #[tokio::test]
    async fn test_vector_capacity_noop_cases() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let project = insert_project(&db, &tenant, "p", 1_000_000).await;

        // Unlimited plan, or no project in scope.
        ensure_vector_capacity(&test_plan(3, -1), 1, Some(&project)).unwrap();
        ensure_vector_capacity(&test_plan(3, 100), 1, None).unwrap();
    }

    #[tokio::test]
    async fn test_usage_counters_roundtrip() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let mut conn = db.pool().acquire().await.unwrap();

        let usage = increment_usage(&mut conn, &tenant, 2, 1, 500).await.unwrap();
        assert_eq!(usage.total_queries, 2);
        assert_eq!(usage.total_ingest_requests, 1);
        assert_eq!(usage.total_vectors, 500);

        let usage = increment_usage(&mut conn, &tenant, 1, 0, 0).await.unwrap();
        assert_eq!(usage.total_queries, 3);
        assert_eq!(usage.total_vectors, 500);
    }

    #[tokio::test]
    async fn test_decrement_clamps_at_zero() {
        let (db, _dir, tenant) = seeded_db(5, 5).await;
        let mut conn = db.pool().acquire().await.unwrap();

        increment_usage(&mut conn, &tenant, 0, 0, 3).await.unwrap();

        let usage = decrement_vector_usage(&mut conn, &tenant, 2).await.unwrap();
        assert_eq!(usage.total_vectors, 1);

        // Over-delete twice; the counter stops at zero either way.
        let usage = decrement_vector_usage(&mut conn, &tenant, 5).await.unwrap();
        assert_eq!(usage.total_vectors, 0);
        let usage = decrement_vector_usage(&mut conn, &tenant, 5).await.unwrap();
        assert_eq!(usage.total_vectors, 0);
    }
}
