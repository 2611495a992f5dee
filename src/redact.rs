//! Field redaction for data that is about to be logged or emitted.

use serde_json::Value;

/// Replacement written over masked values.
pub const REDACTED: &str = "[...REDACTED...]";

/// Field names that hold credentials in action params.
pub const DEFAULT_REDACTED_FIELDS: &[&str] = &[
    "accessToken",
    "uploadToken",
    "newRelicApiKey",
    "privateKey",
    "authorization",
];

/// What happens to a matched field.
pub enum Redaction<'a> {
    /// Replace the value with [`REDACTED`].
    Mask,
    /// Delete the key.
    Remove,
    /// Replace the value with the result of the function.
    With(&'a dyn Fn(&Value) -> Value),
}

/// Redact `fields` anywhere in `value`, walking nested objects and arrays.
///
/// A matched value is handled as a whole; the walk does not descend into it.
pub fn redact(value: &mut Value, fields: &[&str], redaction: &Redaction<'_>) {
    match value {
        Value::Object(map) => {
            if let Redaction::Remove = redaction {
                map.retain(|key, _| !fields.contains(&key.as_str()));
            }
            for (key, child) in map.iter_mut() {
                if fields.contains(&key.as_str()) {
                    match redaction {
                        Redaction::Mask => *child = Value::String(REDACTED.to_string()),
                        Redaction::With(redact_fn) => *child = redact_fn(child),
                        Redaction::Remove => {}
                    }
                } else {
                    redact(child, fields, redaction);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                redact(item, fields, redaction);
            }
        }
        _ => {}
    }
}

/// Redacted copy of `value`, leaving the original untouched.
pub fn redacted(value: &Value, fields: &[&str], redaction: &Redaction<'_>) -> Value {
    let mut copy = value.clone();
    redact(&mut copy, fields, redaction);
    copy
}

/// Strip query string and fragment, which carry presigned URL credentials.
pub fn redact_url(url: &str) -> String {
    let end = url.find(|c: char| c == '?' || c == '#').unwrap_or(url.len());
    url[..end].to_string()
}

/// [`redact_url`] lifted to JSON values; strings and arrays of strings
/// are rewritten, anything else is masked.
pub fn redact_url_value(value: &Value) -> Value {
    match value {
        Value::String(url) => Value::String(redact_url(url)),
        Value::Array(items) => Value::Array(items.iter().map(redact_url_value).collect()),
        _ => Value::String(REDACTED.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params() -> Value {
        json!({
            "accessToken": "secret",
            "source": {"url": "https://bucket/a.jpg?sig=abc", "name": "a.jpg"},
            "renditions": [
                {"fmt": "png", "target": "https://bucket/r.png?sig=def"},
                {"fmt": "jpg", "auth": {"accessToken": "nested"}}
            ],
            "count": 2
        })
    }

    #[test]
    fn masks_nested_fields_and_array_elements() {
        let mut value = params();
        redact(&mut value, DEFAULT_REDACTED_FIELDS, &Redaction::Mask);

        assert_eq!(value["accessToken"], json!(REDACTED));
        assert_eq!(value["renditions"][1]["auth"]["accessToken"], json!(REDACTED));
        assert_eq!(value["source"]["name"], json!("a.jpg"));
        assert_eq!(value["count"], json!(2));
    }

    #[test]
    fn removes_fields() {
        let value = redacted(&params(), &["accessToken", "count"], &Redaction::Remove);

        assert!(value.get("accessToken").is_none());
        assert!(value.get("count").is_none());
        assert!(value["renditions"][1]["auth"].get("accessToken").is_none());
        assert_eq!(params()["accessToken"], json!("secret"));
    }

    #[test]
    fn applies_custom_redaction_function() {
        let mut value = params();
        redact(&mut value, &["url", "target"], &Redaction::With(&redact_url_value));

        assert_eq!(value["source"]["url"], json!("https://bucket/a.jpg"));
        assert_eq!(value["renditions"][0]["target"], json!("https://bucket/r.png"));
    }

    #[test]
    fn strips_query_and_fragment() {
        assert_eq!(redact_url("https://h/p?x=1#frag"), "https://h/p");
        assert_eq!(redact_url("https://h/p#frag"), "https://h/p");
        assert_eq!(redact_url("https://h/p"), "https://h/p");
        assert_eq!(redact_url_value(&json!(5)), json!(REDACTED));
    }
}
