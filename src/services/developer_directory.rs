use serde_json::{Map, Value};
use sqlx::PgPool;

use crate::{
    error::AppError,
    repository::table_service::{create_row, find_row},
    services::input_format::slugify,
};

const DEVELOPERS_TABLE: &str = "developers";

/// Makes sure a `developers` row exists for the given name. Callers treat
/// failures as secondary and only log them.
pub async fn ensure_developer(pool: &PgPool, developer_name: &str) -> Result<(), AppError> {
    let Some(payload) = developer_payload(developer_name) else {
        return Ok(());
    };
    let slug = payload
        .get("slug")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if find_row(pool, DEVELOPERS_TABLE, "slug", slug).await?.is_some() {
        return Ok(());
    }
    create_row(pool, DEVELOPERS_TABLE, &payload).await?;
    tracing::info!(developer = %developer_name.trim(), "Added developer to directory");
    Ok(())
}

fn developer_payload(developer_name: &str) -> Option<Map<String, Value>> {
    let name = developer_name.trim();
    let slug = slugify(name);
    if slug.is_empty() {
        return None;
    }
    let mut payload = Map::new();
    payload.insert("name".to_string(), Value::String(name.to_string()));
    payload.insert("slug".to_string(), Value::String(slug));
    Some(payload)
}

#[cfg(test)]
mod tests {
    use super::developer_payload;
    use serde_json::json;

    #[test]
    fn keys_developers_by_slug() {
        let payload = developer_payload("  DLF Homes ").expect("named developer");
        assert_eq!(payload.get("name"), Some(&json!("DLF Homes")));
        assert_eq!(payload.get("slug"), Some(&json!("dlf-homes")));
        assert!(developer_payload(" -- ").is_none());
    }
}
