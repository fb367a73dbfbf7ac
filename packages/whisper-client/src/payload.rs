//! Tolerant parsing of service response bodies.
//!
//! The service is not consistent about where the text lives: synchronous
//! responses nest it under `extraction`, retrieve responses put it at top
//! level, and the text key is either `result_text` or `extracted_text`.

use serde_json::{Map, Value};

use crate::error::{Result, WhisperError};
use crate::types::{ExtractionResult, JobHandle, JobStatus, PageMetadata, StatusReport};

const TEXT_KEYS: [&str; 2] = ["result_text", "extracted_text"];

pub(crate) fn parse_json(body: &str) -> Result<Value> {
    serde_json::from_str(body).map_err(|e| {
        WhisperError::Parse(format!("invalid JSON ({}): {}", e, truncate(body, 200)))
    })
}

/// Pull the `whisper_hash` out of a submission acknowledgement.
pub(crate) fn parse_handle(body: &Value) -> Option<JobHandle> {
    body.get("whisper_hash")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(JobHandle::new)
}

pub(crate) fn parse_status(body: Value) -> Result<StatusReport> {
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .ok_or_else(|| WhisperError::Parse("status response has no 'status' field".into()))?;

    Ok(StatusReport {
        status: JobStatus::from_wire(status),
        message: message_of(&body),
        raw: body,
    })
}

/// Build a result from a sync-submit or retrieve payload.
///
/// Missing text or metadata are not errors: they come back empty.
pub(crate) fn parse_result(body: &Value, handle: Option<JobHandle>) -> ExtractionResult {
    let nested = body.get("extraction").and_then(Value::as_object);
    let top = body.as_object();

    let lookup = |key: &str| -> Option<&Value> {
        nested
            .and_then(|n| n.get(key))
            .or_else(|| top.and_then(|t| t.get(key)))
    };

    let result_text = TEXT_KEYS
        .iter()
        .find_map(|key| lookup(key).and_then(Value::as_str))
        .map(str::to_string);
    if result_text.is_none() {
        tracing::warn!(handle = ?handle, "Extraction payload carries no text field");
    }

    let pages = lookup("metadata").map(parse_pages).unwrap_or_default();

    // Retrieve payloads omit the status; they only exist for processed jobs.
    let status = body
        .get("status")
        .and_then(Value::as_str)
        .map(JobStatus::from_wire)
        .unwrap_or(JobStatus::Processed);

    ExtractionResult {
        status,
        result_text: result_text.unwrap_or_default(),
        pages,
        message: message_of(body),
        handle: handle.or_else(|| parse_handle(body)),
    }
}

fn parse_pages(metadata: &Value) -> Vec<PageMetadata> {
    match metadata {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, raw)| PageMetadata {
                index,
                page: None,
                raw: raw.clone(),
            })
            .collect(),
        Value::Object(map) => ordered_entries(map)
            .into_iter()
            .enumerate()
            .map(|(index, (key, raw))| PageMetadata {
                index,
                page: Some(key.clone()),
                raw: raw.clone(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Numeric keys first in numeric order, then the rest lexically.
fn ordered_entries(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|(a, _), (b, _)| {
        match (a.trim().parse::<u64>(), b.trim().parse::<u64>()) {
            (Ok(x), Ok(y)) => x.cmp(&y),
            (Ok(_), Err(_)) => std::cmp::Ordering::Less,
            (Err(_), Ok(_)) => std::cmp::Ordering::Greater,
            (Err(_), Err(_)) => a.cmp(b),
        }
    });
    entries
}

/// The service puts diagnostics in `message`, sometimes as a list in `detail`.
fn message_of(body: &Value) -> Option<String> {
    if let Some(message) = body.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match body.get("detail") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(detail @ (Value::Array(_) | Value::Object(_))) => Some(detail.to_string()),
        _ => None,
    }
}

pub(crate) fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_both_text_keys_give_same_text() {
        let a = parse_result(&json!({"result_text": "hello"}), None);
        let b = parse_result(&json!({"extracted_text": "hello"}), None);
        assert_eq!(a.result_text, "hello");
        assert_eq!(a.result_text, b.result_text);
    }

    #[test]
    fn test_nested_sync_payload() {
        let body = json!({
            "status": "processed",
            "whisper_hash": "abc",
            "extraction": {
                "result_text": "page one",
                "metadata": {"2": {"w": 2}, "1": {"w": 1}, "10": {"w": 10}}
            }
        });
        let result = parse_result(&body, None);
        assert_eq!(result.status, JobStatus::Processed);
        assert_eq!(result.result_text, "page one");
        assert_eq!(result.handle, Some(JobHandle::new("abc")));
        let labels: Vec<_> = result.pages.iter().map(|p| p.page.clone().unwrap()).collect();
        assert_eq!(labels, vec!["1", "2", "10"]);
        assert_eq!(result.pages[2].index, 2);
    }

    #[test]
    fn test_missing_metadata_is_empty() {
        let result = parse_result(&json!({"result_text": "x"}), None);
        assert!(result.pages.is_empty());
        assert_eq!(result.status, JobStatus::Processed);
    }

    #[test]
    fn test_array_metadata_keeps_order() {
        let result = parse_result(&json!({"result_text": "x", "metadata": [{"p": 1}, {"p": 2}]}), None);
        assert_eq!(result.page_count(), 2);
        assert_eq!(result.pages[1].raw, json!({"p": 2}));
    }

    #[test]
    fn test_status_message_from_detail() {
        let report = parse_status(json!({"status": "failed", "detail": ["bad pdf"]})).unwrap();
        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.message.as_deref(), Some("[\"bad pdf\"]"));
    }

    #[test]
    fn test_status_without_field_is_parse_error() {
        assert!(matches!(
            parse_status(json!({"message": "?"})),
            Err(WhisperError::Parse(_))
        ));
    }

    #[test]
    fn test_truncate_respects_chars() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("hi", 10), "hi");
    }
}
