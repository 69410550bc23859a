use serde_json::{Map, Value};
use sqlx::{postgres::PgRow, Postgres, QueryBuilder, Row};

use crate::error::AppError;

const ALLOWED_TABLES: &[&str] = &[
    "admin_users",
    "audit_logs",
    "developers",
    "properties",
    "property_images",
];

pub async fn list_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
    limit: i64,
    offset: i64,
    order_by: &str,
    ascending: bool,
) -> Result<Vec<Value>, AppError> {
    let table_name = validate_table(table)?;
    let order_name = if order_by.trim().is_empty() {
        "created_at"
    } else {
        validate_identifier(order_by)?
    };

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_filters(&mut query, filters)?;

    query.push(" ORDER BY t.").push(order_name);
    query.push(if ascending { " ASC" } else { " DESC" });
    query
        .push(" LIMIT ")
        .push_bind(limit.clamp(1, 1000))
        .push(" OFFSET ")
        .push_bind(offset.max(0));

    let rows = query.build().fetch_all(pool).await.map_err(map_db_error)?;
    Ok(read_rows(rows))
}

pub async fn get_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    find_row(pool, table, id_field, row_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

/// First row whose `field` equals `value`, if any.
pub async fn find_row(
    pool: &sqlx::PgPool,
    table: &str,
    field: &str,
    value: &str,
) -> Result<Option<Value>, AppError> {
    let table_name = validate_table(table)?;
    let field_name = validate_identifier(field)?;
    if !can_match_id(field_name, value) {
        return Ok(None);
    }

    let mut query = QueryBuilder::<Postgres>::new("SELECT row_to_json(t) AS row FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar_filter(
        &mut query,
        field_name,
        FilterOperator::Eq,
        &infer_scalar_filter(field_name, &Value::String(value.to_string())),
    );
    query.push(" LIMIT 1");

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;
    Ok(row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten()))
}

pub async fn create_row(
    pool: &sqlx::PgPool,
    table: &str,
    payload: &Map<String, Value>,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    let mut query = insert_query(table_name, payload)?;

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::Internal(format!("Could not create {table_name} record.")))
}

pub async fn update_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<Value, AppError> {
    let table_name = validate_table(table)?;
    if !can_match_id(id_field, row_id) {
        return Err(AppError::NotFound(format!("{table_name} record not found.")));
    }
    let mut query = update_query(table_name, row_id, payload, id_field)?;

    let row = query
        .build()
        .fetch_optional(pool)
        .await
        .map_err(map_db_error)?;

    row.and_then(|value| value.try_get::<Option<Value>, _>("row").ok().flatten())
        .ok_or_else(|| AppError::NotFound(format!("{table_name} record not found.")))
}

pub async fn delete_row(
    pool: &sqlx::PgPool,
    table: &str,
    row_id: &str,
    id_field: &str,
) -> Result<Value, AppError> {
    let existing = get_row(pool, table, row_id, id_field).await?;
    let table_name = validate_table(table)?;
    let id_name = validate_identifier(id_field)?;

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE ");
    push_scalar_filter(
        &mut query,
        id_name,
        FilterOperator::Eq,
        &infer_scalar_filter(id_name, &Value::String(row_id.to_string())),
    );
    query.build().execute(pool).await.map_err(map_db_error)?;

    Ok(existing)
}

/// Deletes every row matching `filters` and returns the number removed. An
/// empty filter map is rejected so a table is never wiped by accident.
pub async fn delete_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: &Map<String, Value>,
) -> Result<u64, AppError> {
    let table_name = validate_table(table)?;
    if filters.values().all(Value::is_null) {
        return Err(AppError::BadRequest(format!(
            "Refusing to delete {table_name} rows without a filter."
        )));
    }

    let mut query = QueryBuilder::<Postgres>::new("DELETE FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_filters(&mut query, Some(filters))?;

    let result = query.build().execute(pool).await.map_err(map_db_error)?;
    Ok(result.rows_affected())
}

pub async fn count_rows(
    pool: &sqlx::PgPool,
    table: &str,
    filters: Option<&Map<String, Value>>,
) -> Result<i64, AppError> {
    let table_name = validate_table(table)?;

    let mut query = QueryBuilder::<Postgres>::new("SELECT COUNT(*)::bigint AS total FROM ");
    query.push(table_name).push(" t WHERE 1=1");
    push_filters(&mut query, filters)?;

    let row = query.build().fetch_one(pool).await.map_err(map_db_error)?;

    Ok(row.try_get::<i64, _>("total").unwrap_or(0))
}

// Column types (uuid, numeric, jsonb, text[]) are resolved by PostgreSQL from
// the table definition through jsonb_populate_record.
fn insert_query<'a>(
    table_name: &'a str,
    payload: &Map<String, Value>,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    if payload.is_empty() {
        return Err(AppError::BadRequest(format!(
            "Could not create {table_name} record."
        )));
    }
    let keys = sorted_columns(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
    query.push(table_name).push(" (");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
        }
    }
    query.push(") SELECT ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push("r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query
        .push(") r RETURNING row_to_json(")
        .push(table_name)
        .push(".*) AS row");
    Ok(query)
}

fn update_query<'a>(
    table_name: &'a str,
    row_id: &str,
    payload: &Map<String, Value>,
    id_field: &str,
) -> Result<QueryBuilder<'a, Postgres>, AppError> {
    let id_name = validate_identifier(id_field)?;
    if payload.is_empty() {
        return Err(AppError::BadRequest("No fields to update.".to_string()));
    }
    let keys = sorted_columns(payload)?;

    let mut query = QueryBuilder::<Postgres>::new("UPDATE ");
    query.push(table_name).push(" t SET ");
    {
        let mut separated = query.separated(", ");
        for key in &keys {
            separated.push(key.as_str());
            separated.push_unseparated(" = r.");
            separated.push_unseparated(key.as_str());
        }
    }
    query
        .push(" FROM jsonb_populate_record(NULL::")
        .push(table_name)
        .push(", ");
    query.push_bind(Value::Object(payload.clone()));
    query.push(") r WHERE ");
    push_scalar_filter(
        &mut query,
        id_name,
        FilterOperator::Eq,
        &infer_scalar_filter(id_name, &Value::String(row_id.to_string())),
    );
    query.push(" RETURNING row_to_json(t) AS row");
    Ok(query)
}

fn sorted_columns(payload: &Map<String, Value>) -> Result<Vec<String>, AppError> {
    let mut keys = payload.keys().cloned().collect::<Vec<_>>();
    keys.sort_unstable();
    for key in &keys {
        validate_identifier(key)?;
    }
    Ok(keys)
}

fn read_rows(rows: Vec<PgRow>) -> Vec<Value> {
    rows.into_iter()
        .filter_map(|row| row.try_get::<Option<Value>, _>("row").ok().flatten())
        .collect()
}

fn validate_table(table: &str) -> Result<&str, AppError> {
    let normalized = validate_identifier(table)?;
    if ALLOWED_TABLES.contains(&normalized) {
        return Ok(normalized);
    }
    Err(AppError::Forbidden(format!(
        "Table '{normalized}' is not allowed."
    )))
}

fn validate_identifier(identifier: &str) -> Result<&str, AppError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Identifier cannot be empty.".to_string(),
        ));
    }
    let well_formed = trimmed.chars().all(|character| {
        character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
    }) && !trimmed
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_digit());
    if !well_formed {
        return Err(AppError::BadRequest(format!(
            "Invalid identifier '{trimmed}'."
        )));
    }
    Ok(trimmed)
}

#[derive(Debug, Clone, PartialEq)]
enum ScalarFilter {
    Text(String),
    Uuid(uuid::Uuid),
    Bool(bool),
    I64(i64),
    F64(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum ArrayFilter {
    Text(Vec<String>),
    Uuid(Vec<uuid::Uuid>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FilterOperator {
    Eq,
    Gte,
    Lte,
    ILike,
    IsNull,
}

/// `column`, `column__gte`, `column__lte`, `column__ilike`, `column__is_null`
/// or `column__in`.
fn parse_filter_key(filter_key: &str) -> Result<(&str, FilterOperator), AppError> {
    let (column, operator) = match filter_key.rsplit_once("__") {
        Some((column, "gte")) => (column, FilterOperator::Gte),
        Some((column, "lte")) => (column, FilterOperator::Lte),
        Some((column, "ilike")) => (column, FilterOperator::ILike),
        Some((column, "is_null")) => (column, FilterOperator::IsNull),
        Some((column, "in")) => (column, FilterOperator::Eq),
        _ => (filter_key, FilterOperator::Eq),
    };
    Ok((validate_identifier(column)?, operator))
}

fn push_filters(
    query: &mut QueryBuilder<Postgres>,
    filters: Option<&Map<String, Value>>,
) -> Result<(), AppError> {
    if let Some(filter_map) = filters {
        for (key, value) in filter_map {
            push_filter_clause(query, key, value)?;
        }
    }
    Ok(())
}

fn push_filter_clause(
    query: &mut QueryBuilder<Postgres>,
    filter_key: &str,
    value: &Value,
) -> Result<(), AppError> {
    let (column, operator) = parse_filter_key(filter_key)?;

    if operator == FilterOperator::IsNull {
        query.push(" AND t.").push(column);
        if value.as_bool().unwrap_or(true) {
            query.push(" IS NULL");
        } else {
            query.push(" IS NOT NULL");
        }
        return Ok(());
    }

    match value {
        Value::Null => Ok(()),
        Value::Array(items) => {
            if operator != FilterOperator::Eq {
                return Err(AppError::BadRequest(format!(
                    "Filter '{filter_key}' does not support array values."
                )));
            }
            let filter = infer_array_filter(column, items);
            let empty = match &filter {
                ArrayFilter::Text(values) => values.is_empty(),
                ArrayFilter::Uuid(values) => values.is_empty(),
            };
            if empty {
                // nothing can match an empty set
                query.push(" AND FALSE");
                return Ok(());
            }
            query.push(" AND ");
            push_array_filter(query, column, &filter);
            Ok(())
        }
        _ => {
            query.push(" AND ");
            let filter = infer_scalar_filter(column, value);
            push_scalar_filter(query, column, operator, &filter);
            Ok(())
        }
    }
}

fn push_scalar_filter(
    query: &mut QueryBuilder<Postgres>,
    column: &str,
    operator: FilterOperator,
    value: &ScalarFilter,
) {
    query.push("t.").push(column);
    let sql_operator = match operator {
        FilterOperator::Eq => " = ",
        FilterOperator::Gte => " >= ",
        FilterOperator::Lte => " <= ",
        FilterOperator::ILike => {
            let pattern = match value {
                ScalarFilter::Text(text) => text.clone(),
                ScalarFilter::Uuid(id) => id.to_string(),
                ScalarFilter::Bool(flag) => flag.to_string(),
                ScalarFilter::I64(number) => number.to_string(),
                ScalarFilter::F64(number) => number.to_string(),
            };
            query.push("::text ILIKE ").push_bind(pattern);
            return;
        }
        // handled by push_filter_clause
        FilterOperator::IsNull => return,
    };
    match value {
        ScalarFilter::Text(text) => {
            query.push("::text").push(sql_operator).push_bind(text.clone());
        }
        ScalarFilter::Uuid(id) => {
            query.push(sql_operator).push_bind(*id);
        }
        ScalarFilter::Bool(flag) => {
            query.push(sql_operator).push_bind(*flag);
        }
        ScalarFilter::I64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
        ScalarFilter::F64(number) => {
            query.push(sql_operator).push_bind(*number);
        }
    }
}

fn push_array_filter(query: &mut QueryBuilder<Postgres>, column: &str, value: &ArrayFilter) {
    query.push("t.").push(column);
    match value {
        ArrayFilter::Text(values) => {
            query
                .push("::text = ANY(")
                .push_bind(values.clone())
                .push(")");
        }
        ArrayFilter::Uuid(values) => {
            query.push(" = ANY(").push_bind(values.clone()).push(")");
        }
    }
}

fn infer_scalar_filter(filter_key: &str, value: &Value) -> ScalarFilter {
    match value {
        Value::Bool(flag) => ScalarFilter::Bool(*flag),
        Value::Number(number) => {
            if let Some(as_i64) = number.as_i64() {
                return ScalarFilter::I64(as_i64);
            }
            if let Some(as_f64) = number.as_f64() {
                return ScalarFilter::F64(as_f64);
            }
            ScalarFilter::Text(number.to_string())
        }
        Value::String(text) => {
            if is_uuid_identifier(filter_key) {
                if let Ok(parsed) = uuid::Uuid::parse_str(text.trim()) {
                    return ScalarFilter::Uuid(parsed);
                }
            }
            ScalarFilter::Text(text.clone())
        }
        other => ScalarFilter::Text(other.to_string()),
    }
}

fn infer_array_filter(filter_key: &str, values: &[Value]) -> ArrayFilter {
    if is_uuid_identifier(filter_key) {
        let parsed = values
            .iter()
            .map(|value| {
                value
                    .as_str()
                    .and_then(|text| uuid::Uuid::parse_str(text.trim()).ok())
            })
            .collect::<Option<Vec<_>>>();
        if let Some(ids) = parsed {
            return ArrayFilter::Uuid(ids);
        }
    }
    ArrayFilter::Text(
        values
            .iter()
            .map(|value| match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .collect(),
    )
}

fn is_uuid_identifier(identifier: &str) -> bool {
    let normalized = identifier.trim();
    normalized == "id" || normalized.ends_with("_id")
}

fn is_uuid_formatted(value: &str) -> bool {
    uuid::Uuid::try_parse(value.trim()).is_ok()
}

/// Text that is not a uuid compared with a uuid column is a Postgres error,
/// not a miss.
fn can_match_id(field: &str, value: &str) -> bool {
    !is_uuid_identifier(field) || is_uuid_formatted(value)
}

fn map_db_error(error: sqlx::Error) -> AppError {
    let message = error.to_string();
    tracing::error!(db_error = %message, "Database query failed");

    if message.contains("23505")
        || message
            .to_ascii_lowercase()
            .contains("duplicate key value violates unique constraint")
    {
        return AppError::Conflict("Duplicate value violates a unique constraint.".to_string());
    }
    AppError::Dependency("Database operation failed.".to_string())
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Map, Value};
    use sqlx::{Postgres, QueryBuilder};

    use super::{
        can_match_id, infer_array_filter, insert_query, is_uuid_formatted, parse_filter_key,
        push_filters,
        update_query, validate_table, ArrayFilter, FilterOperator,
    };

    fn payload(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn uuid_detection() {
        assert!(is_uuid_formatted("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_uuid_formatted("550E8400-E29B-41D4-A716-446655440000"));
        assert!(!is_uuid_formatted("not-a-uuid"));
        assert!(!is_uuid_formatted(""));
    }

    #[test]
    fn malformed_ids_never_reach_uuid_columns() {
        assert!(can_match_id("id", "550e8400-e29b-41d4-a716-446655440000"));
        assert!(!can_match_id("id", "p1"));
        assert!(!can_match_id("property_id", "not-a-uuid"));
        assert!(can_match_id("slug", "godrej-sora"));
    }

    #[test]
    fn only_property_tables_are_allowed() {
        assert!(validate_table("properties").is_ok());
        assert!(validate_table("property_images").is_ok());
        assert!(validate_table("reservations").is_err());
        assert!(validate_table("Properties; DROP").is_err());
    }

    #[test]
    fn parses_filter_suffixes() {
        assert_eq!(
            parse_filter_key("lowest_price__gte").ok(),
            Some(("lowest_price", FilterOperator::Gte))
        );
        assert_eq!(
            parse_filter_key("image_url__in").ok(),
            Some(("image_url", FilterOperator::Eq))
        );
        assert_eq!(
            parse_filter_key("property_type").ok(),
            Some(("property_type", FilterOperator::Eq))
        );
        assert!(parse_filter_key("bad-column").is_err());
    }

    #[test]
    fn insert_sql_uses_jsonb_populate_record() {
        let row = payload(json!({
            "slug": "godrej-sora",
            "name": "Godrej Sora",
            "configurations": [{ "tower_number": 1 }]
        }));
        let query = insert_query("properties", &row).expect("query builds");
        let sql = query.sql();
        assert!(
            sql.contains("jsonb_populate_record(NULL::properties"),
            "Expected jsonb_populate_record in SQL but got: {sql}"
        );
        assert!(
            sql.contains("SELECT r.configurations, r.name, r.slug"),
            "Expected r.col references in SQL but got: {sql}"
        );
        assert!(insert_query("properties", &Map::new()).is_err());
    }

    #[test]
    fn update_sql_uses_jsonb_populate_record() {
        let row = payload(json!({ "status": "Ready", "lowest_price": 2.5 }));
        let query = update_query(
            "properties",
            "550e8400-e29b-41d4-a716-446655440000",
            &row,
            "id",
        )
        .expect("query builds");
        let sql = query.sql();
        assert!(
            sql.contains("lowest_price = r.lowest_price, status = r.status"),
            "Expected col = r.col pattern in SQL but got: {sql}"
        );
        assert!(sql.contains("WHERE t.id = $2"), "unexpected SQL: {sql}");
    }

    #[test]
    fn filters_render_operators() {
        let filters = payload(json!({
            "property_id": "550e8400-e29b-41d4-a716-446655440000",
            "image_url__in": ["a", "b"],
            "deleted_at__is_null": true,
            "skip": null
        }));
        let mut query = QueryBuilder::<Postgres>::new("DELETE FROM property_images t WHERE 1=1");
        push_filters(&mut query, Some(&filters)).expect("filters render");
        let sql = query.sql();
        assert!(sql.contains("t.image_url::text = ANY($1)"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.property_id = $2"), "unexpected SQL: {sql}");
        assert!(sql.contains("t.deleted_at IS NULL"), "unexpected SQL: {sql}");
        assert!(!sql.contains("skip"));
    }

    #[test]
    fn infers_uuid_arrays() {
        let ids = [json!("550e8400-e29b-41d4-a716-446655440000")];
        assert!(matches!(infer_array_filter("property_id", &ids), ArrayFilter::Uuid(_)));
        assert!(matches!(
            infer_array_filter("property_id", &[json!("nope")]),
            ArrayFilter::Text(_)
        ));
    }
}
