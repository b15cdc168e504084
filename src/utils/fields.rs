use serde_json::{Map, Value};

/// True when every key of `fields` is in `allowed`.
///
/// An empty update is rejected unless nothing is allowed at all, so a `{}`
/// body never passes for an entity with mutable fields.
pub fn only_allowed_keys(fields: &Map<String, Value>, allowed: &[&str]) -> bool {
    if fields.is_empty() {
        return allowed.is_empty();
    }
    fields.keys().all(|key| allowed.contains(&key.as_str()))
}
