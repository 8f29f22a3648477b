//! SQLite operations for account, quota, and catalog state.
//!
//! The pool is capped at one connection: every transaction runs on the same
//! writer, which serializes bucket read-modify-write within the process,
//! and SQLite's write lock serializes across processes. Bucket rows are the
//! sole source of truth for throttling; nothing is cached in memory.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::quota::{QuotaError, ensure_project_capacity};
use crate::types::{DEFAULT_PLANS, Plan, Subscription, SubscriptionStatus, Tenant};

use super::models::{
    CreateDocument, CreateProject, DocumentRow, ImageRow, ProjectRow, metadata_to_text,
};

/// Local SQLite database.
#[derive(Clone)]
pub struct LocalDb {
    pool: SqlitePool,
}

impl LocalDb {
    /// Open or create the database at the given path.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to open SQLite database")?;

        let db = Self { pool };
        db.migrate().await?;

        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run database migrations.
    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                price_cents INTEGER NOT NULL DEFAULT 0,
                query_qps_limit INTEGER NOT NULL,
                ingest_qps_limit INTEGER NOT NULL,
                project_limit INTEGER NOT NULL,
                vector_limit INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                name TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL UNIQUE,
                plan_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                FOREIGN KEY (tenant_id) REFERENCES tenants(id),
                FOREIGN KEY (plan_id) REFERENCES plans(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS usage_counters (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL UNIQUE,
                total_queries INTEGER NOT NULL DEFAULT 0,
                total_ingest_requests INTEGER NOT NULL DEFAULT 0,
                total_vectors INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limit_buckets (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                limit_type TEXT NOT NULL,
                tokens REAL NOT NULL,
                max_tokens INTEGER NOT NULL,
                last_refill TEXT NOT NULL,
                UNIQUE(tenant_id, limit_type),
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                embedding_dim INTEGER NOT NULL,
                hybrid_weight_vector REAL NOT NULL DEFAULT 0.5,
                hybrid_weight_text REAL NOT NULL DEFAULT 0.5,
                top_k_default INTEGER NOT NULL DEFAULT 10,
                vector_search_k INTEGER NOT NULL DEFAULT 50,
                vector_count INTEGER NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                last_ingest_at TEXT,
                FOREIGN KEY (tenant_id) REFERENCES tenants(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                engine_document_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS images (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                engine_document_id TEXT NOT NULL UNIQUE,
                storage_key TEXT NOT NULL UNIQUE,
                content_type TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_projects_tenant ON projects(tenant_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_project ON documents(project_id)")
            .execute(&self.pool)
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_images_project ON images(project_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    // ==================== Plan Operations ====================

    /// Ensure the canonical plan definitions exist, updating drifted rows.
    pub async fn seed_plans(&self) -> Result<usize> {
        let mut changed = 0;
        for seed in DEFAULT_PLANS {
            let existing = self.find_plan_by_slug(seed.slug).await?;
            match existing {
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO plans (id, slug, name, price_cents, query_qps_limit, ingest_qps_limit, project_limit, vector_limit)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(Uuid::new_v4().to_string())
                    .bind(seed.slug)
                    .bind(seed.name)
                    .bind(seed.price_cents)
                    .bind(seed.query_qps_limit)
                    .bind(seed.ingest_qps_limit)
                    .bind(seed.project_limit)
                    .bind(seed.vector_limit)
                    .execute(&self.pool)
                    .await?;
                    changed += 1;
                }
                Some(plan)
                    if plan.name != seed.name
                        || plan.price_cents != seed.price_cents
                        || plan.query_qps_limit != seed.query_qps_limit
                        || plan.ingest_qps_limit != seed.ingest_qps_limit
                        || plan.project_limit != seed.project_limit
                        || plan.vector_limit != seed.vector_limit =>
                {
                    sqlx::query(
                        r#"
                        UPDATE plans
                        SET name = ?, price_cents = ?, query_qps_limit = ?, ingest_qps_limit = ?, project_limit = ?, vector_limit = ?
                        WHERE slug = ?
                        "#,
                    )
                    .bind(seed.name)
                    .bind(seed.price_cents)
                    .bind(seed.query_qps_limit)
                    .bind(seed.ingest_qps_limit)
                    .bind(seed.project_limit)
                    .bind(seed.vector_limit)
                    .bind(seed.slug)
                    .execute(&self.pool)
                    .await?;
                    changed += 1;
                }
                Some(_) => {}
            }
        }
        Ok(changed)
    }

    pub async fn find_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(plan)
    }

    pub async fn list_plans(&self) -> Result<Vec<Plan>> {
        let plans = sqlx::query_as::<_, Plan>("SELECT * FROM plans ORDER BY price_cents")
            .fetch_all(&self.pool)
            .await?;
        Ok(plans)
    }

    // ==================== Tenant Operations ====================

    /// Create a tenant with an active subscription to the given plan.
    pub async fn create_tenant(&self, email: &str, name: Option<&str>, plan: &Plan) -> Result<Tenant> {
        let tenant = Tenant {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now().to_rfc3339(),
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT INTO tenants (id, email, name, created_at) VALUES (?, ?, ?, ?)")
            .bind(&tenant.id)
            .bind(&tenant.email)
            .bind(&tenant.name)
            .bind(&tenant.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO subscriptions (id, tenant_id, plan_id, status) VALUES (?, ?, ?, ?)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&tenant.id)
        .bind(&plan.id)
        .bind(SubscriptionStatus::Active.as_str())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(tenant)
    }

    pub async fn find_tenant_by_email(&self, email: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>("SELECT * FROM tenants WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(tenant)
    }

    /// The tenant's plan through their active subscription.
    pub async fn plan_for_tenant(&self, tenant_id: &str) -> Result<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT p.* FROM plans p
            JOIN subscriptions s ON s.plan_id = p.id
            WHERE s.tenant_id = ? AND s.status = 'active'
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(plan)
    }

    /// Move a tenant's subscription to a different plan.
    pub async fn set_tenant_plan(&self, tenant_id: &str, plan: &Plan) -> Result<Option<Subscription>> {
        let subscription = sqlx::query_as::<_, Subscription>(
            "SELECT * FROM subscriptions WHERE tenant_id = ?",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(mut subscription) = subscription else {
            return Ok(None);
        };

        sqlx::query("UPDATE subscriptions SET plan_id = ?, status = 'active' WHERE id = ?")
            .bind(&plan.id)
            .bind(&subscription.id)
            .execute(&self.pool)
            .await?;
        subscription.plan_id = plan.id.clone();
        subscription.status = SubscriptionStatus::Active.as_str().to_string();
        Ok(Some(subscription))
    }

    // ==================== Project Operations ====================

    /// Provision a project. The plan's project-capacity check and the
    /// insert share one transaction.
    pub async fn create_project(
        &self,
        plan: &Plan,
        input: &CreateProject,
    ) -> Result<ProjectRow, QuotaError> {
        let project = ProjectRow {
            id: Uuid::new_v4().to_string(),
            tenant_id: input.tenant_id.clone(),
            name: input.name.clone(),
            embedding_dim: input.embedding_dim,
            hybrid_weight_vector: input.hybrid_weight_vector,
            hybrid_weight_text: input.hybrid_weight_text,
            top_k_default: input.top_k_default,
            vector_search_k: input.vector_search_k,
            vector_count: 0,
            active: true,
            created_at: Utc::now().to_rfc3339(),
            last_ingest_at: None,
        };

        let mut tx = self.pool.begin().await?;
        ensure_project_capacity(&mut tx, &input.tenant_id, plan).await?;

        sqlx::query(
            r#"
            INSERT INTO projects (
                id, tenant_id, name, embedding_dim, hybrid_weight_vector, hybrid_weight_text,
                top_k_default, vector_search_k, vector_count, active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, 1, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project.tenant_id)
        .bind(&project.name)
        .bind(project.embedding_dim)
        .bind(project.hybrid_weight_vector)
        .bind(project.hybrid_weight_text)
        .bind(project.top_k_default)
        .bind(project.vector_search_k)
        .bind(&project.created_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(project)
    }

    /// Find an active project owned by the tenant.
    pub async fn find_project(&self, tenant_id: &str, project_id: &str) -> Result<Option<ProjectRow>> {
        let project = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM projects WHERE id = ? AND tenant_id = ? AND active = 1",
        )
        .bind(project_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(project)
    }

    pub async fn list_projects(&self, tenant_id: &str) -> Result<Vec<ProjectRow>> {
        let projects = sqlx::query_as::<_, ProjectRow>(
            "SELECT * FROM projects WHERE tenant_id = ? AND active = 1 ORDER BY created_at",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(projects)
    }

    // ==================== Document Operations ====================

    pub async fn find_document(&self, project_id: &str, document_id: &str) -> Result<Option<DocumentRow>> {
        let doc = sqlx::query_as::<_, DocumentRow>(
            "SELECT * FROM documents WHERE id = ? AND project_id = ? AND active = 1",
        )
        .bind(document_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    pub async fn find_image(&self, project_id: &str, image_id: &str) -> Result<Option<ImageRow>> {
        let image = sqlx::query_as::<_, ImageRow>(
            "SELECT * FROM images WHERE id = ? AND project_id = ? AND active = 1",
        )
        .bind(image_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    /// Build (but do not insert) a document row for an ingest in flight.
    pub fn new_document(&self, project_id: &str, input: &CreateDocument) -> DocumentRow {
        let id = Uuid::new_v4().to_string();
        DocumentRow {
            engine_document_id: format!("{project_id}-doc-{id}"),
            id,
            project_id: project_id.to_string(),
            title: input.title.clone(),
            content: input.content.clone(),
            metadata: metadata_to_text(&input.metadata),
            active: true,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
