use std::cmp::Ordering;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde_json::{json, Map, Value};

use crate::{
    auth::require_admin,
    error::{AppError, AppResult},
    repository::{
        property_store::{gallery_urls, IMAGES_TABLE, PROPERTIES_TABLE},
        table_service::{count_rows, delete_row, delete_rows, find_row, list_rows},
    },
    schemas::{
        clamp_limit_in_range, validate_input, AdminPropertiesQuery, PropertyPath,
        PropertySlugPath, PublicPropertiesQuery, PublicSort,
    },
    services::{
        audit::write_audit_log,
        config_normalizer::record_from_row,
        input_format::bhk_tokens,
        property_config::{ConfigList, PropertyKind, PropertyRecord},
        property_metrics::{summarize, PropertySummary},
    },
    state::AppState,
};

// Public filters run on derived figures, so the candidate set is loaded
// whole and narrowed in memory.
const PUBLIC_SCAN_LIMIT: i64 = 1000;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/public/properties",
            axum::routing::get(list_public_properties),
        )
        .route(
            "/public/properties/{slug}",
            axum::routing::get(get_public_property),
        )
        .route("/admin/properties", axum::routing::get(list_admin_properties))
        .route(
            "/admin/properties/{property_id}",
            axum::routing::delete(delete_property),
        )
}

async fn list_public_properties(
    State(state): State<AppState>,
    Query(query): Query<PublicPropertiesQuery>,
) -> AppResult<Json<Value>> {
    validate_input(&query)?;

    let cache_key = public_properties_cache_key(&query);
    if let Some(cached) = state.public_listings_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let key_lock = state.public_listings_cache.key_lock(&cache_key).await;
    let _guard = key_lock.lock().await;

    if let Some(cached) = state.public_listings_cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let pool = db_pool(&state)?;
    let mut filters = Map::new();
    if let Some(kind) = non_empty_opt(query.kind.as_deref()) {
        let kind = PropertyKind::parse(&kind)
            .ok_or_else(|| AppError::BadRequest(format!("Unknown property kind '{kind}'.")))?;
        filters.insert(
            "property_type".to_string(),
            Value::String(kind.as_str().to_string()),
        );
    }
    let rows = list_rows(
        pool,
        PROPERTIES_TABLE,
        Some(&filters),
        PUBLIC_SCAN_LIMIT,
        0,
        "created_at",
        false,
    )
    .await?;

    let mut listed = rows
        .iter()
        .filter_map(|row| record_from_row(row, Vec::new()))
        .map(|record| {
            let summary = summarize(&record);
            (record, summary)
        })
        .filter(|(record, summary)| matches_public_query(&query, record, summary))
        .collect::<Vec<_>>();
    sort_listed(&mut listed, query.sort);
    listed.truncate(clamp_limit_in_range(query.limit, 1, 200) as usize);

    let data = listed
        .iter()
        .map(|(record, summary)| public_item(record, summary))
        .collect::<Vec<_>>();
    let response = json!({ "data": data, "count": data.len() });
    state
        .public_listings_cache
        .put(cache_key, response.clone())
        .await;
    Ok(Json(response))
}

async fn get_public_property(
    State(state): State<AppState>,
    Path(path): Path<PropertySlugPath>,
) -> AppResult<Json<Value>> {
    let pool = db_pool(&state)?;
    let slug = path.slug.trim().to_ascii_lowercase();
    let row = find_row(pool, PROPERTIES_TABLE, "slug", &slug)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found.".to_string()))?;
    let property_id = value_str(&row, "id");
    let gallery = gallery_urls(pool, &property_id).await?;
    let record = record_from_row(&row, gallery)
        .ok_or_else(|| AppError::NotFound("Property not found.".to_string()))?;
    let summary = summarize(&record);
    Ok(Json(public_item(&record, &summary)))
}

async fn list_admin_properties(
    State(state): State<AppState>,
    Query(query): Query<AdminPropertiesQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let mut filters = Map::new();
    if let Some(kind) = non_empty_opt(query.kind.as_deref()) {
        filters.insert(
            "property_type".to_string(),
            Value::String(kind.to_ascii_lowercase()),
        );
    }
    let rows = list_rows(
        pool,
        PROPERTIES_TABLE,
        Some(&filters),
        clamp_limit_in_range(query.limit, 1, 500),
        query.offset,
        "created_at",
        false,
    )
    .await?;
    let total = count_rows(pool, PROPERTIES_TABLE, Some(&filters)).await?;

    let data = rows
        .into_iter()
        .map(|row| {
            let summary = record_from_row(&row, Vec::new()).map(|record| summarize(&record));
            let mut item = match row {
                Value::Object(map) => map,
                _ => Map::new(),
            };
            item.insert("summary".to_string(), json!(summary));
            Value::Object(item)
        })
        .collect::<Vec<_>>();
    Ok(Json(json!({ "data": data, "total": total })))
}

async fn delete_property(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let admin = require_admin(&state, &headers).await?;
    let pool = db_pool(&state)?;

    let row = find_row(pool, PROPERTIES_TABLE, "id", &path.property_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Property not found.".to_string()))?;
    let gallery = gallery_urls(pool, &path.property_id).await?;
    let asset_urls = stored_asset_urls(&row, &gallery);

    let filters = json_map(&[("property_id", Value::String(path.property_id.clone()))]);
    let removed_images = delete_rows(pool, IMAGES_TABLE, &filters).await?;

    if let Some(storage) = state.asset_storage.as_ref() {
        for url in &asset_urls {
            if let Err(error) = storage.delete(url).await {
                tracing::warn!(url = %url, error = %error, "Could not delete property asset");
            }
        }
    }

    let deleted = delete_row(pool, PROPERTIES_TABLE, &path.property_id, "id").await?;
    write_audit_log(
        state.db_pool.as_ref(),
        Some(&admin.user_id),
        "delete",
        PROPERTIES_TABLE,
        Some(&path.property_id),
        Some(deleted),
        None,
    )
    .await;
    state.public_listings_cache.clear().await;

    tracing::info!(
        property_id = %path.property_id,
        removed_images,
        "Property deleted"
    );
    Ok(Json(json!({
        "ok": true,
        "property_id": path.property_id,
        "removed_gallery_images": removed_images,
    })))
}

fn public_properties_cache_key(query: &PublicPropertiesQuery) -> String {
    serde_json::to_string(query).unwrap_or_else(|_| "default".to_string())
}

fn matches_public_query(
    query: &PublicPropertiesQuery,
    record: &PropertyRecord,
    summary: &PropertySummary,
) -> bool {
    if let Some(location) = non_empty_opt(query.location.as_deref()) {
        if !contains_ignore_case(&record.location, &location) {
            return false;
        }
    }
    if let Some(needle) = non_empty_opt(query.q.as_deref()) {
        let developer = record.developer.as_deref().unwrap_or_default();
        if !contains_ignore_case(&record.name, &needle)
            && !contains_ignore_case(&record.location, &needle)
            && !contains_ignore_case(developer, &needle)
        {
            return false;
        }
    }
    if let Some(bhk) = non_empty_opt(query.bhk.as_deref()) {
        let wanted = bhk_tokens(&bhk);
        if !summary.bhk_labels.iter().any(|label| {
            wanted
                .iter()
                .any(|token| token.eq_ignore_ascii_case(label))
        }) {
            return false;
        }
    }
    if query.min_price.is_some() || query.max_price.is_some() {
        let Some(price) = summary.lowest_price else {
            return false;
        };
        if query.min_price.is_some_and(|min| price < min) {
            return false;
        }
        if query.max_price.is_some_and(|max| price > max) {
            return false;
        }
    }
    true
}

/// Priced records first in the requested order; unpriced ones keep their
/// newest-first position at the end.
fn sort_listed(listed: &mut [(PropertyRecord, PropertySummary)], sort: PublicSort) {
    let descending = match sort {
        PublicSort::Newest => return,
        PublicSort::PriceAsc => false,
        PublicSort::PriceDesc => true,
    };
    listed.sort_by(|(_, left), (_, right)| {
        match (left.lowest_price, right.lowest_price) {
            (Some(left), Some(right)) => {
                let ordering = left.partial_cmp(&right).unwrap_or(Ordering::Equal);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

fn public_item(record: &PropertyRecord, summary: &PropertySummary) -> Value {
    let mut item = match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    item.insert("lowest_price".to_string(), json!(summary.lowest_price));
    item.insert(
        "area_range_label".to_string(),
        json!(summary.area_range_label),
    );
    item.insert("bhk_labels".to_string(), json!(summary.bhk_labels));
    Value::Object(item)
}

/// Every storage object a property row points at.
fn stored_asset_urls(row: &Value, gallery: &[String]) -> Vec<String> {
    let mut urls = Vec::new();
    for key in ["cover_image_url", "brochure_url"] {
        let url = value_str(row, key);
        if !url.is_empty() {
            urls.push(url);
        }
    }
    urls.extend(gallery.iter().cloned());
    if let Some(record) = record_from_row(row, Vec::new()) {
        if let ConfigList::Buildings(buildings) = &record.configs {
            urls.extend(
                buildings
                    .iter()
                    .filter_map(|building| building.brochure_url.clone())
                    .filter(|url| !url.trim().is_empty()),
            );
        }
    }
    urls
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn json_map(entries: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    for (key, value) in entries {
        map.insert((*key).to_string(), value.clone());
    }
    map
}

fn db_pool(state: &AppState) -> AppResult<&sqlx::PgPool> {
    state.db_pool.as_ref().ok_or_else(|| {
        AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
    })
}

fn value_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{matches_public_query, sort_listed, stored_asset_urls};
    use crate::{
        schemas::{PublicPropertiesQuery, PublicSort},
        services::{
            config_normalizer::record_from_row,
            property_config::PropertyRecord,
            property_metrics::{summarize, PropertySummary},
        },
    };
    use serde_json::{json, Value};

    fn query(value: Value) -> PublicPropertiesQuery {
        serde_json::from_value(value).expect("query parses")
    }

    fn listed(rows: &[Value]) -> Vec<(PropertyRecord, PropertySummary)> {
        rows.iter()
            .filter_map(|row| record_from_row(row, Vec::new()))
            .map(|record| {
                let summary = summarize(&record);
                (record, summary)
            })
            .collect()
    }

    fn apartment(name: &str, price: &str) -> Value {
        json!({
            "id": name,
            "name": name,
            "property_type": "apartment",
            "location": "Sector 53, Gurugram",
            "developer": "Godrej",
            "price": price,
            "configurations": [{ "tower_number": 1, "bhk": "3BHK", "area_sqft": "1800" }]
        })
    }

    #[test]
    fn filters_on_derived_figures() {
        let items = listed(&[apartment("Sora", "2.5 Cr"), apartment("Aria", "")]);
        let (sora, sora_summary) = &items[0];
        let (aria, aria_summary) = &items[1];

        let by_price = query(json!({ "min_price": 2.0 }));
        assert!(matches_public_query(&by_price, sora, sora_summary));
        assert!(!matches_public_query(&by_price, aria, aria_summary));

        let by_location = query(json!({ "location": "gurugram", "bhk": "3" }));
        assert!(matches_public_query(&by_location, sora, sora_summary));

        let by_text = query(json!({ "q": "dlf" }));
        assert!(!matches_public_query(&by_text, sora, sora_summary));
    }

    #[test]
    fn unpriced_records_sort_last_both_ways() {
        let mut items = listed(&[
            apartment("Unpriced", ""),
            apartment("Cheap", "1.2 Cr"),
            apartment("Dear", "4 Cr"),
        ]);
        sort_listed(&mut items, PublicSort::PriceAsc);
        let names = items.iter().map(|(record, _)| record.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Cheap", "Dear", "Unpriced"]);

        sort_listed(&mut items, PublicSort::PriceDesc);
        let names = items.iter().map(|(record, _)| record.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["Dear", "Cheap", "Unpriced"]);
    }

    #[test]
    fn collects_every_stored_asset() {
        let row = json!({
            "id": "p1",
            "property_type": "builder_floor",
            "cover_image_url": "https://cdn/cover.jpg",
            "brochure_url": "",
            "configurations": [
                { "building_number": 1, "brochure_url": "https://cdn/b1.pdf" },
                { "building_number": 2 }
            ]
        });
        let urls = stored_asset_urls(&row, &["https://cdn/g1.jpg".to_string()]);
        assert_eq!(
            urls,
            vec!["https://cdn/cover.jpg", "https://cdn/g1.jpg", "https://cdn/b1.pdf"]
        );
    }
}
