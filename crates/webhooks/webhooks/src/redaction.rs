//! Per-subscriber removal of privileged payload fields.

use serde_json::Value;
use std::collections::BTreeSet;

use crate::endpoint::Capability;

/// Fields stripped from payloads sent to unprivileged subscribers by default.
pub const DEFAULT_REDACTED_FIELDS: &[&str] = &["proof"];

/// Deny-list of top-level payload fields, unlocked by a single capability.
#[derive(Debug, Clone)]
pub struct RedactionPolicy {
    denied_fields: BTreeSet<String>,
    unlocked_by: Capability,
}

impl RedactionPolicy {
    /// Creates a policy stripping `fields` unless `unlocked_by` is granted.
    pub fn new(fields: impl IntoIterator<Item = impl Into<String>>, unlocked_by: Capability) -> Self {
        Self {
            denied_fields: fields.into_iter().map(Into::into).collect(),
            unlocked_by,
        }
    }

    /// The privileged field set.
    pub fn denied_fields(&self) -> impl Iterator<Item = &str> {
        self.denied_fields.iter().map(String::as_str)
    }

    /// The capability that lifts redaction.
    pub fn unlocked_by(&self) -> &Capability {
        &self.unlocked_by
    }

    /// Returns the payload a subscriber with `scope` may see.
    ///
    /// Remaining fields keep their original order. Non-object payloads pass
    /// through unchanged.
    pub fn redact(&self, payload: &Value, scope: &BTreeSet<Capability>) -> Value {
        if scope.contains(&self.unlocked_by) {
            return payload.clone();
        }

        match payload {
            Value::Object(map) => Value::Object(
                map.iter()
                    .filter(|(key, _)| !self.denied_fields.contains(key.as_str()))
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_REDACTED_FIELDS.iter().copied(), Capability::view_privileged())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn privileged() -> BTreeSet<Capability> {
        [Capability::view_privileged()].into_iter().collect()
    }

    #[test]
    fn test_unprivileged_scope_strips_proof() {
        let policy = RedactionPolicy::default();
        let payload = json!({"id": 1, "proof": ["https://cdn.example/a.png"], "userId": "123"});

        let redacted = policy.redact(&payload, &BTreeSet::new());

        assert_eq!(redacted, json!({"id": 1, "userId": "123"}));
        assert_eq!(
            serde_json::to_string(&redacted).unwrap(),
            r#"{"id":1,"userId":"123"}"#
        );
    }

    #[test]
    fn test_privileged_scope_keeps_payload() {
        let policy = RedactionPolicy::default();
        let payload = json!({"id": 1, "proof": ["x", "y"], "userId": "123"});

        assert_eq!(policy.redact(&payload, &privileged()), payload);
    }

    #[test]
    fn test_field_order_is_preserved() {
        let policy = RedactionPolicy::default();
        let payload: Value =
            serde_json::from_str(r#"{"userId":"1","reason":"spam","proof":[],"id":5}"#).unwrap();

        let redacted = policy.redact(&payload, &BTreeSet::new());

        assert_eq!(
            serde_json::to_string(&redacted).unwrap(),
            r#"{"userId":"1","reason":"spam","id":5}"#
        );
    }

    #[test]
    fn test_unrelated_capability_does_not_unlock() {
        let policy = RedactionPolicy::default();
        let scope: BTreeSet<Capability> = [Capability::new("admin")].into_iter().collect();

        let redacted = policy.redact(&json!({"proof": ["x"]}), &scope);
        assert!(redacted.get("proof").is_none());
    }

    #[test]
    fn test_custom_field_set() {
        let policy = RedactionPolicy::new(["proof", "moderatorId"], Capability::view_privileged());
        let redacted = policy.redact(
            &json!({"id": 2, "moderatorId": "9", "proof": []}),
            &BTreeSet::new(),
        );

        assert_eq!(redacted, json!({"id": 2}));
    }

    #[test]
    fn test_delete_payload_without_privileged_fields() {
        let policy = RedactionPolicy::default();
        assert_eq!(policy.redact(&json!({"id": 3}), &BTreeSet::new()), json!({"id": 3}));
        assert_eq!(policy.redact(&json!(3), &BTreeSet::new()), json!(3));
    }
}
