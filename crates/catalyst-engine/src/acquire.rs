//! State acquisition helpers: pagination and record matching.

use std::future::Future;

use catalyst_core::Record;
use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;

use crate::error::{EngineError, Result};

/// Stream every item of a paginated list.
///
/// `fetch(offset, limit)` is called with 1-based offsets for successive
/// windows until it returns a page shorter than `page_size`. Items come out
/// in controller order. The stream is finite and cannot be restarted.
pub fn paginate<'a, F, Fut>(page_size: usize, fetch: F) -> impl Stream<Item = Result<Value>> + 'a
where
    F: FnMut(usize, usize) -> Fut + 'a,
    Fut: Future<Output = Result<Vec<Value>>> + 'a,
{
    let page_size = page_size.max(1);
    stream::try_unfold(
        (1_usize, false, fetch),
        move |(offset, exhausted, mut fetch)| async move {
            if exhausted {
                return Ok::<_, EngineError>(None);
            }
            let page = match fetch(offset, page_size).await {
                Ok(page) => page,
                Err(e) => return Err(e),
            };
            let count = page.len();
            tracing::trace!(offset = offset, count = count, "Fetched page");
            let items = stream::iter(page.into_iter().map(Ok::<Value, EngineError>));
            Ok(Some((items, (offset + count, count < page_size, fetch))))
        },
    )
    .try_flatten()
}

/// Collect every item of a paginated list.
///
/// # Errors
///
/// Returns the first page fetch error.
pub async fn collect_pages<F, Fut>(page_size: usize, fetch: F) -> Result<Vec<Value>>
where
    F: FnMut(usize, usize) -> Fut,
    Fut: Future<Output = Result<Vec<Value>>>,
{
    paginate(page_size, fetch).try_collect().await
}

/// Extract the list from a response payload.
///
/// Accepts a bare list, a single object, or nothing.
#[must_use]
pub fn payload_items(payload: &Value) -> Vec<Value> {
    match payload {
        Value::Array(items) => items.clone(),
        Value::Null => Vec::new(),
        Value::Object(map) if map.is_empty() => Vec::new(),
        other => vec![other.clone()],
    }
}

/// Keep only the object items as records.
#[must_use]
pub fn into_records(items: Vec<Value>) -> Vec<Record> {
    items
        .into_iter()
        .filter_map(|item| Record::try_from(item).ok())
        .collect()
}

/// Find the single record matching a natural key.
///
/// # Errors
///
/// Returns `MultipleMatches` if more than one record matches.
pub fn find_unique<P>(resource: &str, candidates: &[Record], mut matches: P) -> Result<Option<Record>>
where
    P: FnMut(&Record) -> bool,
{
    let mut found: Vec<&Record> = candidates.iter().filter(|c| matches(c)).collect();
    match found.len() {
        0 => Ok(None),
        1 => Ok(found.pop().cloned()),
        count => Err(EngineError::MultipleMatches {
            resource: resource.to_string(),
            count,
        }),
    }
}

/// Reconcile an explicit id with a natural-key lookup.
///
/// Both lookups are performed. If only one was requested its result wins.
/// If both were requested they must agree: an id that names a different
/// record than the key, or exists while the key does not (or the reverse),
/// is inconsistent.
///
/// # Errors
///
/// Returns `InconsistentParameters` if the lookups disagree, or
/// `MultipleMatches` if the key is ambiguous.
pub fn resolve_identity<P>(
    resource: &str,
    id_field: &str,
    id: Option<&str>,
    candidates: &[Record],
    key_matches: P,
) -> Result<Option<Record>>
where
    P: FnMut(&Record) -> bool,
{
    let by_key = find_unique(resource, candidates, key_matches)?;
    let Some(id) = id else {
        return Ok(by_key);
    };
    let by_id = candidates
        .iter()
        .find(|c| c.get_str(id_field) == Some(id))
        .cloned();

    match (by_id, by_key) {
        (None, None) => Ok(None),
        (Some(a), Some(b)) if a.get_str(id_field) == b.get_str(id_field) => Ok(Some(a)),
        (Some(_), Some(b)) => Err(EngineError::InconsistentParameters(format!(
            "{resource}: id {id} and key resolve to different records ({})",
            b.get_str(id_field).unwrap_or("?")
        ))),
        (Some(_), None) => Err(EngineError::InconsistentParameters(format!(
            "{resource}: id {id} exists but its key matches nothing"
        ))),
        (None, Some(_)) => Err(EngineError::InconsistentParameters(format!(
            "{resource}: key matches a record but id {id} does not exist"
        ))),
    }
}

/// Normalize a name for loose matching: lowercase ASCII alphanumerics only.
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    fn numbered(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({ "id": i })).collect()
    }

    #[tokio::test]
    async fn pages_until_short_page() {
        let items = numbered(7);
        let requests = Mutex::new(Vec::new());
        let all = collect_pages(3, |offset, limit| {
            requests.lock().push((offset, limit));
            let page: Vec<Value> = items.iter().skip(offset - 1).take(limit).cloned().collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(all, items);
        assert_eq!(*requests.lock(), [(1, 3), (4, 3), (7, 3)]);
    }

    #[tokio::test]
    async fn exact_multiple_needs_one_empty_page() {
        let items = numbered(4);
        let mut calls = 0;
        let all = collect_pages(2, |offset, limit| {
            calls += 1;
            let page: Vec<Value> = items.iter().skip(offset - 1).take(limit).cloned().collect();
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(all.len(), 4);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn page_errors_propagate() {
        let result = collect_pages(2, |_, _| async {
            Err(EngineError::Document("boom".to_string()))
        })
        .await;
        assert!(result.is_err());
    }

    fn records() -> Vec<Record> {
        into_records(vec![
            json!({"id": "a", "name": "Corp"}),
            json!({"id": "b", "name": "Guest"}),
            json!({"id": "c", "name": "Guest"}),
        ])
    }

    #[test]
    fn unique_and_ambiguous_matches() {
        let all = records();
        let corp = find_unique("ssid Corp", &all, |r| r.get_str("name") == Some("Corp")).unwrap();
        assert_eq!(corp.unwrap().get_str("id"), Some("a"));

        let err = find_unique("ssid Guest", &all, |r| r.get_str("name") == Some("Guest"))
            .unwrap_err();
        assert!(matches!(err, EngineError::MultipleMatches { count: 2, .. }));
    }

    #[test]
    fn id_and_key_must_agree() {
        let all = records();
        let by_name = |r: &Record| r.get_str("name") == Some("Corp");

        let found = resolve_identity("x", "id", Some("a"), &all, by_name).unwrap();
        assert_eq!(found.unwrap().get_str("id"), Some("a"));

        let err = resolve_identity("x", "id", Some("b"), &all, by_name).unwrap_err();
        assert!(matches!(err, EngineError::InconsistentParameters(_)));

        let err = resolve_identity("x", "id", Some("zz"), &all, by_name).unwrap_err();
        assert!(matches!(err, EngineError::InconsistentParameters(_)));

        let none = resolve_identity("x", "id", Some("zz"), &all, |r: &Record| {
            r.get_str("name") == Some("Nope")
        })
        .unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn name_normalization() {
        assert_eq!(normalize_name("cpu_utilization_threshold"), "cpuutilizationthreshold");
        assert_eq!(normalize_name("CPU Utilization Threshold"), "cpuutilizationthreshold");
    }
}
