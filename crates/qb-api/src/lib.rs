use serde_json::Value;

/// Pagination metadata read off page 1 of a listing response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PageMeta {
    pub total_results: u64,
    pub total_pages: u64,
}

/// Checks whether a decoded JSON response body is a valid listing envelope:
/// an object whose `payload` object carries a `resultados` key. Anything
/// else — wrong shape, missing key, not even an object — is not a failure,
/// it's "no results this page".
pub fn is_valid_payload(body: &Value) -> bool {
    body.get("payload")
        .map(|payload| payload.is_object() && payload.get("resultados").is_some())
        .unwrap_or(false)
}

/// Extracts the result array from a listing envelope's `payload.resultados`.
/// Defensive: any shape mismatch degrades to an empty list rather than
/// propagating an error.
pub fn result_list(body: &Value) -> Vec<Value> {
    if !is_valid_payload(body) {
        return Vec::new();
    }
    body.get("payload")
        .and_then(|payload| payload.get("resultados"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Extracts `{total_results, total_pages}` from `payload.resultCount` /
/// `payload.pageCount`. Both default to 0 on any access failure.
pub fn page_meta(body: &Value) -> PageMeta {
    let payload = body.get("payload");
    let total_results = payload
        .and_then(|p| p.get("resultCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let total_pages = payload
        .and_then(|p| p.get("pageCount"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    PageMeta {
        total_results,
        total_pages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_payload_recognizes_nested_resultados_key() {
        let body = json!({ "payload": { "resultados": [] } });
        assert!(is_valid_payload(&body));
    }

    #[test]
    fn invalid_payload_rejects_unwrapped_resultados() {
        // The real upstream never puts `resultados` at the top level; a body
        // shaped like this is the bug this fixture exists to catch.
        let body = json!({ "resultados": [] });
        assert!(!is_valid_payload(&body));
    }

    #[test]
    fn invalid_payload_rejects_missing_payload() {
        let body = json!({ "other": 1 });
        assert!(!is_valid_payload(&body));
    }

    #[test]
    fn invalid_payload_rejects_payload_missing_resultados() {
        let body = json!({ "payload": { "other": 1 } });
        assert!(!is_valid_payload(&body));
    }

    #[test]
    fn invalid_payload_rejects_non_object() {
        let body = json!([1, 2, 3]);
        assert!(!is_valid_payload(&body));
    }

    #[test]
    fn result_list_extracts_nested_array() {
        let body = json!({ "payload": { "resultados": [{"code": "A"}, {"code": "B"}] } });
        let results = result_list(&body);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn result_list_degrades_to_empty_on_bad_shape() {
        let body = json!({ "payload": { "resultados": "not an array" } });
        assert_eq!(result_list(&body), Vec::<Value>::new());
    }

    #[test]
    fn result_list_degrades_to_empty_on_missing_key() {
        let body = json!({});
        assert_eq!(result_list(&body), Vec::<Value>::new());
    }

    #[test]
    fn page_meta_reads_nested_counts() {
        let body = json!({ "payload": { "resultados": [], "resultCount": 42, "pageCount": 3 } });
        let meta = page_meta(&body);
        assert_eq!(meta.total_results, 42);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn page_meta_defaults_to_zero() {
        let body = json!({});
        let meta = page_meta(&body);
        assert_eq!(meta, PageMeta::default());
    }

    #[test]
    fn page_meta_defaults_on_wrong_type() {
        let body = json!({ "payload": { "resultCount": "many", "pageCount": null } });
        let meta = page_meta(&body);
        assert_eq!(meta.total_results, 0);
        assert_eq!(meta.total_pages, 0);
    }

    #[test]
    fn page_meta_ignores_unwrapped_counts() {
        // A top-level resultCount/pageCount (not nested under payload) must
        // not be picked up.
        let body = json!({ "resultCount": 42, "pageCount": 3 });
        let meta = page_meta(&body);
        assert_eq!(meta, PageMeta::default());
    }
}
