//! Item metadata maps and the conversions backends share.
//!
//! The public surface is a map of lowercase keys to JSON values so that
//! backends can expose typed attributes (a file's inode, a directory flag).
//! Anything a backend persists is string-valued; [`to_string_map`] enforces
//! that before bytes hit storage.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::{Error, Result};

/// Metadata attached to an item.
pub type Metadata = BTreeMap<String, Value>;

/// Persisted, string-only metadata.
pub type Properties = BTreeMap<String, String>;

pub const CONTENT_TYPE: &str = "content-type";
pub const ETAG: &str = "etag";
pub const LAST_MODIFIED: &str = "last-modified";

/// Lowercase every key. When two keys collide after folding, the one that
/// sorts last in the original map wins.
pub fn normalize_keys(metadata: Metadata) -> Metadata {
    metadata
        .into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

/// Convert to the string-only form, rejecting non-string values.
pub fn to_string_map(metadata: &Metadata) -> Result<Properties> {
    metadata
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => Ok((key.to_lowercase(), s.clone())),
            other => Err(Error::InvalidMetadata {
                key: key.clone(),
                reason: format!("expected a string, got {}", value_type(other)),
            }),
        })
        .collect()
}

pub fn from_string_map(properties: Properties) -> Metadata {
    properties
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect()
}

/// Separate the content type from the rest of the metadata, for backends
/// that carry it outside the user metadata block.
pub fn split_content_type(metadata: &Metadata) -> Result<(Option<String>, Properties)> {
    let mut properties = to_string_map(metadata)?;
    let content_type = properties.remove(CONTENT_TYPE);
    Ok((content_type, properties))
}

/// Case-insensitive lookup in persisted metadata.
pub fn lookup<'a>(properties: &'a Properties, key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v.as_str())
}

/// Strip surrounding quotes, escaped quotes and weak markers from an entity
/// tag, leaving the bare value.
pub fn clean_etag(etag: &str) -> String {
    let mut etag = etag;
    loop {
        if etag.starts_with("\\\"") {
            etag = etag.trim_matches(|c| c == '\\' || c == '"');
        } else if etag.starts_with('"') {
            etag = etag.trim_matches('"');
        } else if let Some(rest) = etag.strip_prefix("W/") {
            etag = rest;
        } else {
            return etag.to_string();
        }
    }
}

/// Weak entity tag derived from arbitrary bytes, e.g. a modification time.
pub fn weak_etag(seed: &[u8]) -> String {
    let digest = blake3::hash(seed);
    format!("W/\"{}\"", &digest.to_hex()[..32])
}

/// Parse an HTTP date (`Mon, 02 Jan 2006 15:04:05 GMT`).
pub fn parse_http_date(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidMetadata {
            key: LAST_MODIFIED.into(),
            reason: format!("{value:?} is not an HTTP date: {e}"),
        })
}

/// Format a timestamp as an HTTP date.
pub fn format_http_date(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn keys_are_lowercased() {
        let mut md = Metadata::new();
        md.insert("Content-Type".into(), json!("text/plain"));
        md.insert("X-Owner".into(), json!("ops"));
        let md = normalize_keys(md);
        assert!(md.contains_key("content-type"));
        assert!(md.contains_key("x-owner"));
    }

    #[test]
    fn non_string_values_are_rejected() {
        let mut md = Metadata::new();
        md.insert("size".into(), json!(12));
        let err = to_string_map(&md).unwrap_err();
        assert!(matches!(err, Error::InvalidMetadata { ref key, .. } if key == "size"));
    }

    #[test]
    fn content_type_is_split_out() {
        let mut md = Metadata::new();
        md.insert("content-type".into(), json!("image/png"));
        md.insert("owner".into(), json!("me"));
        let (ct, rest) = split_content_type(&md).unwrap();
        assert_eq!(ct.as_deref(), Some("image/png"));
        assert_eq!(rest.len(), 1);
        assert_eq!(rest["owner"], "me");
    }

    #[test]
    fn lookup_ignores_case() {
        let mut props = Properties::new();
        props.insert("Etag".into(), "abc".into());
        assert_eq!(lookup(&props, ETAG), Some("abc"));
        assert_eq!(lookup(&props, "missing"), None);
    }

    #[test]
    fn clean_etag_strips_wrappers() {
        assert_eq!(clean_etag("\"abc\""), "abc");
        assert_eq!(clean_etag("W/\"abc\""), "abc");
        assert_eq!(clean_etag("\\\"abc\\\""), "abc");
        assert_eq!(clean_etag("\"W/\\\"abc\\\"\""), "abc");
        assert_eq!(clean_etag("abc"), "abc");
        assert_eq!(clean_etag("\"\""), "");
    }

    #[test]
    fn weak_etag_is_deterministic() {
        let a = weak_etag(b"2024-01-01T00:00:00Z");
        let b = weak_etag(b"2024-01-01T00:00:00Z");
        let c = weak_etag(b"2024-01-01T00:00:01Z");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("W/\"") && a.ends_with('"'));
    }

    #[test]
    fn http_date_roundtrip() {
        let at = Utc.with_ymd_and_hms(2006, 1, 2, 15, 4, 5).unwrap();
        let text = format_http_date(&at);
        assert_eq!(text, "Mon, 02 Jan 2006 15:04:05 GMT");
        assert_eq!(parse_http_date(&text).unwrap(), at);
        assert!(parse_http_date("yesterday").is_err());
    }
}
