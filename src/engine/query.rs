//! Hybrid query construction.
//!
//! Queries scope to one project's partition of the shared document type via
//! a `project_id contains ...` filter plus `active = true`, then retrieve
//! with a nearest-neighbor clause, optionally OR-combined with a lexical
//! `userQuery()` branch. Blend weights ride along as ranking inputs; the
//! boolean clause only gathers candidates.

use super::codec::EncodedEmbedding;

/// The two retrieval shapes we issue.
///
/// Image search is vector-only and never carries blend weights; document
/// search is hybrid with an optional lexical branch.
#[derive(Debug, Clone)]
pub enum QuerySpec {
    VectorOnly {
        embedding: EncodedEmbedding,
        vector_k: usize,
    },
    Hybrid {
        embedding: EncodedEmbedding,
        vector_k: usize,
        /// Lexical text; `None` when the caller's query normalised to blank.
        text: Option<String>,
        weight_vector: f64,
        weight_text: f64,
    },
}

impl QuerySpec {
    pub fn hybrid(
        embedding: EncodedEmbedding,
        vector_k: usize,
        text: Option<&str>,
        weight_vector: f64,
        weight_text: f64,
    ) -> Self {
        QuerySpec::Hybrid {
            embedding,
            vector_k,
            text: text.and_then(normalise_lexical_query),
            weight_vector,
            weight_text,
        }
    }

    pub fn vector_only(embedding: EncodedEmbedding, vector_k: usize) -> Self {
        QuerySpec::VectorOnly {
            embedding,
            vector_k,
        }
    }
}

/// A fully-built search request, ready to POST.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub project_id: String,
    pub spec: QuerySpec,
    pub top_k: usize,
}

impl SearchRequest {
    /// Render the request body for the engine's `/search/` endpoint.
    pub fn to_body(&self, rank_profile: &str) -> serde_json::Value {
        let mut body = serde_json::json!({
            "yql": self.yql(),
            "hits": self.top_k,
            "ranking": { "profile": rank_profile },
            "presentation": { "summary": "default" },
        });
        let fields = body.as_object_mut().expect("body is an object");

        match &self.spec {
            QuerySpec::VectorOnly { embedding, .. } => {
                fields.insert(
                    "input.query(query_embedding)".to_string(),
                    embedding.to_json_values(),
                );
            }
            QuerySpec::Hybrid {
                embedding,
                text,
                weight_vector,
                weight_text,
                ..
            } => {
                fields.insert(
                    "input.query(query_embedding)".to_string(),
                    embedding.to_json_values(),
                );
                fields.insert(
                    "input.query(weight_vector)".to_string(),
                    serde_json::json!(weight_vector),
                );
                fields.insert(
                    "input.query(weight_text)".to_string(),
                    serde_json::json!(weight_text),
                );
                if let Some(text) = text {
                    fields.insert("query".to_string(), serde_json::json!(text));
                }
            }
        }

        body
    }

    /// Build the YQL clause for this request.
    pub fn yql(&self) -> String {
        let project_literal = yql_string_literal(&self.project_id);
        let base = format!("project_id contains {project_literal} AND active = true");

        let (vector_k, lexical) = match &self.spec {
            QuerySpec::VectorOnly { vector_k, .. } => (*vector_k, false),
            QuerySpec::Hybrid {
                vector_k, text, ..
            } => (*vector_k, text.is_some()),
        };

        let vector_clause = format!(
            "{{targetHits:{}}}nearestNeighbor(embedding, query_embedding)",
            vector_k.max(1)
        );
        // Same parenthesised shape with or without the lexical branch.
        let predicate = if lexical {
            format!("({vector_clause} OR userQuery())")
        } else {
            format!("({vector_clause})")
        };

        format!("select * from sources * where {base} AND {predicate}")
    }
}

/// Quote a string for embedding in YQL, doubling backslashes and quotes so
/// tenant-controlled values cannot break out of the literal.
pub fn yql_string_literal(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

/// Collapse whitespace in a user query before it feeds the lexical branch.
/// Returns None when nothing remains.
pub fn normalise_lexical_query(query: &str) -> Option<String> {
    let collapsed = query.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::codec::EncodedEmbedding;

    fn embedding() -> EncodedEmbedding {
        EncodedEmbedding::Float(vec![0.1, -0.2, 0.3])
    }

    #[test]
    fn test_hybrid_yql_includes_lexical_branch() {
        let request = SearchRequest {
            project_id: "019c3671-5951-76ab-87fd-ba0e6045c63c".to_string(),
            spec: QuerySpec::hybrid(embedding(), 20, Some("rust allocator"), 0.7, 0.3),
            top_k: 5,
        };

        let yql = request.yql();
        assert!(yql.contains("project_id contains \"019c3671-5951-76ab-87fd-ba0e6045c63c\""));
        assert!(yql.contains("active = true"));
        assert!(yql.contains("{targetHits:20}nearestNeighbor(embedding, query_embedding)"));
        assert!(yql.contains("OR userQuery()"));
    }

    #[test]
    fn test_blank_text_drops_lexical_branch_but_keeps_shape() {
        let request = SearchRequest {
            project_id: "p1".to_string(),
            spec: QuerySpec::hybrid(embedding(), 10, Some("   "), 0.5, 0.5),
            top_k: 5,
        };

        let yql = request.yql();
        assert!(!yql.contains("userQuery"));
        assert!(yql.contains("AND ({targetHits:10}nearestNeighbor(embedding, query_embedding))"));
    }

    #[test]
    fn test_vector_only_yql_has_no_lexical_branch() {
        let request = SearchRequest {
            project_id: "p1".to_string(),
            spec: QuerySpec::vector_only(embedding(), 10),
            top_k: 5,
        };

        let yql = request.yql();
        assert!(!yql.contains("userQuery"));
        assert!(yql.contains("AND ({targetHits:10}nearestNeighbor(embedding, query_embedding))"));
    }

    #[test]
    fn test_vector_k_clamped_to_one() {
        let request = SearchRequest {
            project_id: "p1".to_string(),
            spec: QuerySpec::vector_only(embedding(), 0),
            top_k: 5,
        };
        assert!(request.yql().contains("{targetHits:1}"));
    }

    #[test]
    fn test_string_literal_escaping() {
        assert_eq!(yql_string_literal("plain"), "\"plain\"");
        assert_eq!(
            yql_string_literal("a\"b\\c"),
            "\"a\\\"b\\\\c\"".to_string()
        );
    }

    #[test]
    fn test_hybrid_body_carries_weights_as_ranking_inputs() {
        let request = SearchRequest {
            project_id: "p1".to_string(),
            spec: QuerySpec::hybrid(embedding(), 20, Some("cats"), 0.7, 0.3),
            top_k: 8,
        };

        let body = request.to_body("hybrid");
        assert_eq!(body["hits"], 8);
        assert_eq!(body["ranking"]["profile"], "hybrid");
        assert_eq!(body["input.query(weight_vector)"], 0.7);
        assert_eq!(body["input.query(weight_text)"], 0.3);
        assert_eq!(body["query"], "cats");
    }

    #[test]
    fn test_vector_only_body_omits_weights_and_query() {
        let request = SearchRequest {
            project_id: "p1".to_string(),
            spec: QuerySpec::vector_only(embedding(), 20),
            top_k: 8,
        };

        let body = request.to_body("image");
        assert!(body.get("input.query(weight_vector)").is_none());
        assert!(body.get("input.query(weight_text)").is_none());
        assert!(body.get("query").is_none());
    }

    #[test]
    fn test_normalise_lexical_query() {
        assert_eq!(
            normalise_lexical_query("  rust \t allocator\n"),
            Some("rust allocator".to_string())
        );
        assert_eq!(normalise_lexical_query("   "), None);
        assert_eq!(normalise_lexical_query(""), None);
    }
}
