//! Outbound message sanitizer.
//!
//! Last line of defense before a payload leaves the process. Upstream code
//! builds typed messages, but imports, handoffs and future refactors can
//! smuggle loosely-shaped values in; the gateway hard-rejects anything but
//! `{role, content}` string pairs. Lenient mode coerces, strict mode drops.

use serde_json::Value;
use tracing::debug;

use crate::models::chat::{ModelRequestPayload, PayloadMessage, Role};

/// What the sanitizer did to one message list.
#[derive(Debug, Default, Clone)]
pub struct SanitizeReport {
    pub messages: Vec<PayloadMessage>,
    /// True when the output differs from the input in any way.
    pub was_modified: bool,
    /// Entries removed entirely.
    pub dropped: usize,
    pub issues: Vec<String>,
}

fn parse_role(value: Option<&Value>) -> Option<Role> {
    match value.and_then(|v| v.as_str()) {
        Some("system") => Some(Role::System),
        Some("user") => Some(Role::User),
        Some("assistant") => Some(Role::Assistant),
        _ => None,
    }
}

/// Coerce raw message values into the wire shape. In strict mode invalid
/// entries are dropped instead of repaired.
pub fn sanitize(raw: &[Value], strict: bool) -> SanitizeReport {
    let mut report = SanitizeReport::default();

    for (idx, value) in raw.iter().enumerate() {
        let map = match value.as_object() {
            Some(map) => map,
            None => {
                report.issues.push(format!("message {idx}: not an object"));
                report.dropped += 1;
                report.was_modified = true;
                continue;
            }
        };

        let role = match parse_role(map.get("role")) {
            Some(role) => role,
            None if strict => {
                report.issues.push(format!("message {idx}: invalid role"));
                report.dropped += 1;
                report.was_modified = true;
                continue;
            }
            None => {
                report.issues.push(format!("message {idx}: role coerced to user"));
                report.was_modified = true;
                Role::User
            }
        };

        let content = match map.get("content") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None if strict => {
                report.issues.push(format!("message {idx}: missing content"));
                report.dropped += 1;
                report.was_modified = true;
                continue;
            }
            Some(Value::Null) | None => {
                report.issues.push(format!("message {idx}: content defaulted to empty"));
                report.was_modified = true;
                String::new()
            }
            Some(other) if strict => {
                report
                    .issues
                    .push(format!("message {idx}: non-string content ({})", kind_of(other)));
                report.dropped += 1;
                report.was_modified = true;
                continue;
            }
            Some(other) => {
                report.issues.push(format!(
                    "message {idx}: {} content serialized to string",
                    kind_of(other)
                ));
                report.was_modified = true;
                other.to_string()
            }
        };

        if map.keys().any(|k| k != "role" && k != "content") {
            if strict {
                report.issues.push(format!("message {idx}: unexpected fields"));
                report.dropped += 1;
                report.was_modified = true;
                continue;
            }
            report.issues.push(format!("message {idx}: extra fields dropped"));
            report.was_modified = true;
        }

        report.messages.push(PayloadMessage::new(role, content));
    }

    for issue in &report.issues {
        debug!("sanitizer: {}", issue);
    }
    report
}

/// Structural check without repair: every entry must be exactly a
/// `{role, content}` object with a valid role and string content.
pub fn validate(raw: &[Value]) -> bool {
    raw.iter().all(|value| {
        let Some(map) = value.as_object() else {
            return false;
        };
        map.len() == 2
            && parse_role(map.get("role")).is_some()
            && matches!(map.get("content"), Some(Value::String(_)))
    })
}

/// Run the sanitizer over an already-built payload in place. On a clean
/// payload this is a no-op and the report says so; anything else means an
/// upstream bug slipped loosely-shaped data past the builder.
pub fn sanitize_payload(payload: &mut ModelRequestPayload, strict: bool) -> SanitizeReport {
    let raw: Vec<Value> = payload
        .messages
        .iter()
        .filter_map(|m| serde_json::to_value(m).ok())
        .collect();
    let report = sanitize(&raw, strict);
    payload.messages = report.messages.clone();
    report
}

fn kind_of(value: &Value) -> &'static str {
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
    use serde_json::json;

    #[test]
    fn test_valid_list_passes_untouched() {
        let raw = vec![
            json!({"role": "system", "content": "Tu es un assistant."}),
            json!({"role": "user", "content": "salut"}),
        ];
        let report = sanitize(&raw, false);
        assert!(!report.was_modified);
        assert_eq!(report.dropped, 0);
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0].role, Role::System);
    }

    #[test]
    fn test_structured_content_coerced_to_string() {
        let raw = vec![json!({"role": "user", "content": {"type": "text", "text": "hello"}})];
        let report = sanitize(&raw, false);
        assert!(report.was_modified);
        assert_eq!(report.messages.len(), 1);
        assert!(report.messages[0].content.contains("\"text\":\"hello\""));
    }

    #[test]
    fn test_null_content_becomes_empty_string() {
        let raw = vec![json!({"role": "assistant", "content": null})];
        let report = sanitize(&raw, false);
        assert!(report.was_modified);
        assert_eq!(report.messages[0].content, "");
    }

    #[test]
    fn test_invalid_role_coerced_in_lenient_mode() {
        let raw = vec![json!({"role": "robot", "content": "beep"})];
        let report = sanitize(&raw, false);
        assert_eq!(report.messages[0].role, Role::User);
        assert!(report.was_modified);
    }

    #[test]
    fn test_strict_drops_invalid_entries() {
        let raw = vec![
            json!({"role": "robot", "content": "beep"}),
            json!({"role": "user", "content": 42}),
            json!("just a string"),
            json!({"role": "user", "content": "gardé"}),
        ];
        let report = sanitize(&raw, true);
        assert_eq!(report.dropped, 3);
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].content, "gardé");
    }

    #[test]
    fn test_extra_fields_dropped() {
        let raw = vec![json!({"role": "user", "content": "ok", "name": "léa"})];
        let report = sanitize(&raw, false);
        assert!(report.was_modified);
        assert_eq!(report.messages.len(), 1);
        assert!(validate(&[serde_json::to_value(&report.messages[0]).unwrap()]));
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let raw = vec![
            json!({"role": "bad", "content": {"a": 1}}),
            json!({"role": "user", "content": "texte"}),
        ];
        let first = sanitize(&raw, false);
        assert!(first.was_modified);

        let as_values: Vec<Value> = first
            .messages
            .iter()
            .map(|m| serde_json::to_value(m).unwrap())
            .collect();
        let second = sanitize(&as_values, false);
        assert!(!second.was_modified);
        assert_eq!(second.messages, first.messages);
    }

    #[test]
    fn test_validate_rejects_extra_fields() {
        assert!(validate(&[json!({"role": "user", "content": "ok"})]));
        assert!(!validate(&[json!({"role": "user", "content": "ok", "name": "x"})]));
        assert!(!validate(&[json!({"role": "user"})]));
        assert!(!validate(&[json!(12)]));
    }

    #[test]
    fn test_clean_payload_is_a_noop() {
        let mut payload = ModelRequestPayload {
            model: "llama-3.3-70b-versatile".to_string(),
            messages: vec![
                PayloadMessage::new(Role::System, "prompt"),
                PayloadMessage::new(Role::User, "question"),
            ],
            temperature: 0.7,
            max_output_tokens: 512,
            stream: false,
        };
        let before = payload.messages.clone();
        let report = sanitize_payload(&mut payload, false);
        assert!(!report.was_modified);
        assert_eq!(payload.messages, before);
    }
}
