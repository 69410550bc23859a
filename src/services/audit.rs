use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::repository::table_service::create_row;

/// Records an admin mutation. Failures are logged and swallowed.
pub async fn write_audit_log(
    pool: Option<&PgPool>,
    actor_user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    before_state: Option<Value>,
    after_state: Option<Value>,
) {
    let Some(pool) = pool else {
        return;
    };
    let payload = audit_payload(
        actor_user_id,
        action,
        entity_type,
        entity_id,
        before_state,
        after_state,
    );
    if let Err(error) = create_row(pool, "audit_logs", &payload).await {
        tracing::warn!(
            action,
            entity_type,
            entity_id = entity_id.unwrap_or_default(),
            error = %error,
            "Could not write audit log"
        );
    }
}

fn audit_payload(
    actor_user_id: Option<&str>,
    action: &str,
    entity_type: &str,
    entity_id: Option<&str>,
    before_state: Option<Value>,
    after_state: Option<Value>,
) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("action".to_string(), Value::String(action.to_string()));
    payload.insert("entity_type".to_string(), Value::String(entity_type.to_string()));
    if let Some(actor) = actor_user_id.filter(|actor| !actor.trim().is_empty()) {
        payload.insert("actor_user_id".to_string(), Value::String(actor.to_string()));
    }
    if let Some(entity_id) = entity_id.filter(|id| !id.trim().is_empty()) {
        payload.insert("entity_id".to_string(), Value::String(entity_id.to_string()));
    }
    if let Some(before) = before_state {
        payload.insert("before_state".to_string(), before);
    }
    if let Some(after) = after_state {
        payload.insert("after_state".to_string(), after);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::audit_payload;
    use serde_json::json;

    #[test]
    fn omits_blank_identifiers() {
        let payload = audit_payload(
            Some(" "),
            "delete",
            "properties",
            Some("p1"),
            Some(json!({ "name": "Old" })),
            None,
        );
        assert!(!payload.contains_key("actor_user_id"));
        assert!(!payload.contains_key("after_state"));
        assert_eq!(payload.get("entity_id"), Some(&json!("p1")));
        assert_eq!(payload.get("before_state"), Some(&json!({ "name": "Old" })));
    }
}
