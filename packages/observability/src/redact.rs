//! Secret redaction for structured log fields.

use serde_json::{Map, Value};

/// Replacement written in place of a secret.
pub const REDACTED: &str = "[REDACTED]";

const DENYLIST_KEYS: &[&str] = &[
    "token",
    "password",
    "authorization",
    "cookie",
    "secret",
    "api_key",
];

/// Redact a single value, recursing into objects and arrays.
pub fn redact_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }

    match value {
        Value::String(s) if looks_like_sensitive_value(s) => Value::String(REDACTED.to_string()),
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.clone(), redact_value(k, v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(|item| redact_value(key, item)).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_ascii_lowercase();
    DENYLIST_KEYS.iter().any(|entry| lower.contains(entry))
}

fn looks_like_sensitive_value(raw: &str) -> bool {
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("bearer ") {
        return true;
    }
    // JWT: header.payload.signature
    if raw.matches('.').count() == 2 && raw.len() > 40 && !raw.contains(' ') {
        return true;
    }
    is_long_base64(raw)
}

fn is_long_base64(value: &str) -> bool {
    value.len() > 48
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=' || c == '_' || c == '-')
}
