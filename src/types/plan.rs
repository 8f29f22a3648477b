use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A billing tier. Rows are seeded by `corpus init` and treated as
/// read-only by everything else.
///
/// Limit semantics: a qps limit ≤ 0 means unlimited throughput for that
/// operation; `project_limit` ≤ 0 means unlimited projects; `vector_limit`
/// ≤ 0 means unlimited vectors, otherwise it is an absolute cap per project.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub price_cents: i64,
    pub query_qps_limit: i64,
    pub ingest_qps_limit: i64,
    pub project_limit: i64,
    pub vector_limit: i64,
}

impl Plan {
    /// Max active projects, or None for unlimited.
    pub fn max_projects(&self) -> Option<i64> {
        (self.project_limit > 0).then_some(self.project_limit)
    }

    /// Max vectors per project, or None for unlimited.
    pub fn max_vectors_per_project(&self) -> Option<i64> {
        (self.vector_limit > 0).then_some(self.vector_limit)
    }

    /// Bucket capacity for a limit type. May be ≤ 0 (unlimited).
    pub fn qps_limit(&self, limit_type: LimitType) -> i64 {
        match limit_type {
            LimitType::Query => self.query_qps_limit,
            LimitType::Ingest => self.ingest_qps_limit,
        }
    }
}

/// Which operation a rate-limit bucket throttles.
///
/// Each tenant holds at most one bucket per limit type, keyed by
/// `(tenant_id, limit_type)` in storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitType {
    Query,
    Ingest,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitType::Query => "query",
            LimitType::Ingest => "ingest",
        }
    }
}

impl std::fmt::Display for LimitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Seed definition for a canonical plan tier.
pub struct PlanSeed {
    pub slug: &'static str,
    pub name: &'static str,
    pub price_cents: i64,
    pub query_qps_limit: i64,
    pub ingest_qps_limit: i64,
    pub project_limit: i64,
    pub vector_limit: i64,
}

/// The canonical tiers. `init` upserts these; drifted rows are updated
/// in place so the database always matches this table.
pub const DEFAULT_PLANS: &[PlanSeed] = &[
    PlanSeed {
        slug: "tinkering",
        name: "Tinkering",
        price_cents: 500,
        query_qps_limit: 5,
        ingest_qps_limit: 5,
        project_limit: 3,
        vector_limit: 10_000,
    },
    PlanSeed {
        slug: "building",
        name: "Building",
        price_cents: 2_000,
        query_qps_limit: 10,
        ingest_qps_limit: 10,
        project_limit: 20,
        vector_limit: 100_000,
    },
    PlanSeed {
        slug: "scale",
        name: "Scale",
        price_cents: 5_000,
        query_qps_limit: 100,
        ingest_qps_limit: 100,
        project_limit: -1,
        vector_limit: 250_000,
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(project_limit: i64, vector_limit: i64) -> Plan {
        Plan {
            id: "p1".to_string(),
            slug: "test".to_string(),
            name: "Test".to_string(),
            price_cents: 0,
            query_qps_limit: 5,
            ingest_qps_limit: 2,
            project_limit,
            vector_limit,
        }
    }

    #[test]
    fn test_limits_nonpositive_means_unlimited() {
        assert_eq!(plan(-1, 0).max_projects(), None);
        assert_eq!(plan(-1, 0).max_vectors_per_project(), None);
        assert_eq!(plan(3, 10_000).max_projects(), Some(3));
        assert_eq!(plan(3, 10_000).max_vectors_per_project(), Some(10_000));
    }

    #[test]
    fn test_qps_limit_by_type() {
        let p = plan(1, 1);
        assert_eq!(p.qps_limit(LimitType::Query), 5);
        assert_eq!(p.qps_limit(LimitType::Ingest), 2);
    }
}
