//! Search result normalisation.
//!
//! The engine returns hits under `root.children`, each with a `relevance`
//! that may arrive as a number or a string, and a `fields` payload. Hits
//! without fields are dropped; hits whose relevance is missing or
//! unparseable are kept but rank last. Output is ordered by descending
//! relevance with ties kept in engine order.

use serde_json::{Map, Value};

use super::error::EngineError;

/// One normalised search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub relevance: f64,
    pub fields: Map<String, Value>,
}

impl SearchHit {
    /// Convenience accessor for a string field.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

/// Parse a raw engine search response into ordered hits.
pub fn normalise_response(body: &Value) -> Result<Vec<SearchHit>, EngineError> {
    let children = match body.pointer("/root/children") {
        Some(Value::Array(children)) => children.as_slice(),
        // An empty result set omits `children` entirely.
        Some(Value::Null) | None => &[],
        Some(other) => {
            return Err(EngineError::InvalidResponse(format!(
                "root.children is not an array: {other}"
            )));
        }
    };

    let mut hits: Vec<SearchHit> = children
        .iter()
        .filter_map(|hit| {
            let fields = match hit.get("fields") {
                Some(Value::Object(fields)) if !fields.is_empty() => fields.clone(),
                _ => return None,
            };
            Some(SearchHit {
                relevance: coerce_relevance(hit.get("relevance")),
                fields,
            })
        })
        .collect();

    // Stable: equal relevances keep engine order.
    hits.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(hits)
}

/// Coerce a relevance value to f64; missing or malformed ranks last.
fn coerce_relevance(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(f64::NEG_INFINITY),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(f64::NEG_INFINITY),
        _ => f64::NEG_INFINITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(children: Value) -> Value {
        json!({ "root": { "children": children } })
    }

    #[test]
    fn test_sorted_descending_with_string_coercion() {
        let body = response(json!([
            { "relevance": 0.15, "fields": { "id": "a" } },
            { "relevance": 0.95, "fields": { "id": "b" } },
            { "relevance": "0.60", "fields": { "id": "c" } },
        ]));

        let hits = normalise_response(&body).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.field_str("id").unwrap()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(hits[0].relevance, 0.95);
    }

    #[test]
    fn test_ties_keep_engine_order() {
        let body = response(json!([
            { "relevance": 0.5, "fields": { "id": "first" } },
            { "relevance": 0.5, "fields": { "id": "second" } },
            { "relevance": 0.5, "fields": { "id": "third" } },
        ]));

        let hits = normalise_response(&body).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.field_str("id").unwrap()).collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_fieldless_hits_dropped_malformed_relevance_ranks_last() {
        let body = response(json!([
            { "relevance": 0.9 },
            { "relevance": "not-a-number", "fields": { "id": "junk" } },
            { "relevance": 0.1, "fields": { "id": "ok" } },
            { "fields": {} },
        ]));

        let hits = normalise_response(&body).unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.field_str("id").unwrap()).collect();
        assert_eq!(ids, vec!["ok", "junk"]);
        assert_eq!(hits[1].relevance, f64::NEG_INFINITY);
    }

    #[test]
    fn test_empty_and_missing_children() {
        assert!(normalise_response(&json!({ "root": {} })).unwrap().is_empty());
        assert!(
            normalise_response(&json!({ "root": { "children": null } }))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_malformed_children_is_an_error() {
        let err = normalise_response(&json!({ "root": { "children": 42 } })).unwrap_err();
        assert_eq!(err.kind(), "invalid_response");
    }
}
