use async_trait::async_trait;
use serde_json::{json, Map, Value};
use sqlx::PgPool;

use crate::{
    error::AppError,
    repository::table_service::{
        create_row, delete_rows, get_row, list_rows, update_row,
    },
    services::{
        config_normalizer::record_from_row, developer_directory, property_config::PropertyRecord,
    },
};

pub const PROPERTIES_TABLE: &str = "properties";
pub const IMAGES_TABLE: &str = "property_images";

/// Record write contract used by the submit pipeline.
#[async_trait]
pub trait PropertyStore: Send + Sync {
    async fn create_property(&self, payload: &Map<String, Value>) -> Result<Value, AppError>;

    async fn update_property(
        &self,
        property_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<Value, AppError>;

    async fn delete_gallery_images(
        &self,
        property_id: &str,
        image_urls: &[String],
    ) -> Result<u64, AppError>;

    /// Inserts one gallery row per URL, ordered after the highest
    /// `sort_order` the property already has.
    async fn append_gallery_images(
        &self,
        property_id: &str,
        image_urls: &[String],
    ) -> Result<(), AppError>;

    async fn sync_developer(&self, developer_name: &str) -> Result<(), AppError>;
}

pub struct PgPropertyStore {
    pool: PgPool,
}

impl PgPropertyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PropertyStore for PgPropertyStore {
    async fn create_property(&self, payload: &Map<String, Value>) -> Result<Value, AppError> {
        create_row(&self.pool, PROPERTIES_TABLE, payload).await
    }

    async fn update_property(
        &self,
        property_id: &str,
        payload: &Map<String, Value>,
    ) -> Result<Value, AppError> {
        update_row(&self.pool, PROPERTIES_TABLE, property_id, payload, "id").await
    }

    async fn delete_gallery_images(
        &self,
        property_id: &str,
        image_urls: &[String],
    ) -> Result<u64, AppError> {
        if image_urls.is_empty() {
            return Ok(0);
        }
        let mut filters = Map::new();
        filters.insert("property_id".to_string(), Value::String(property_id.to_string()));
        filters.insert(
            "image_url__in".to_string(),
            Value::Array(image_urls.iter().cloned().map(Value::String).collect()),
        );
        delete_rows(&self.pool, IMAGES_TABLE, &filters).await
    }

    async fn append_gallery_images(
        &self,
        property_id: &str,
        image_urls: &[String],
    ) -> Result<(), AppError> {
        let mut filters = Map::new();
        filters.insert("property_id".to_string(), Value::String(property_id.to_string()));
        let existing =
            list_rows(&self.pool, IMAGES_TABLE, Some(&filters), 1000, 0, "sort_order", true)
                .await?;
        let start_order = next_sort_order(&existing);
        for (offset, image_url) in image_urls.iter().enumerate() {
            let row = gallery_row(property_id, image_url, start_order + offset);
            create_row(&self.pool, IMAGES_TABLE, &row).await?;
        }
        Ok(())
    }

    async fn sync_developer(&self, developer_name: &str) -> Result<(), AppError> {
        developer_directory::ensure_developer(&self.pool, developer_name).await
    }
}

/// One past the highest `sort_order` among `rows`, or 0 when there are none.
fn next_sort_order(rows: &[Value]) -> usize {
    rows.iter()
        .filter_map(|row| match row.get("sort_order") {
            Some(Value::Number(number)) => number.as_u64(),
            Some(Value::String(text)) => text.trim().parse::<u64>().ok(),
            _ => None,
        })
        .max()
        .map_or(0, |highest| highest as usize + 1)
}

fn gallery_row(property_id: &str, image_url: &str, sort_order: usize) -> Map<String, Value> {
    let mut row = Map::new();
    row.insert("property_id".to_string(), Value::String(property_id.to_string()));
    row.insert("image_url".to_string(), Value::String(image_url.to_string()));
    row.insert("sort_order".to_string(), json!(sort_order));
    row
}

pub async fn gallery_urls(pool: &PgPool, property_id: &str) -> Result<Vec<String>, AppError> {
    let mut filters = Map::new();
    filters.insert("property_id".to_string(), Value::String(property_id.to_string()));
    let rows = list_rows(pool, IMAGES_TABLE, Some(&filters), 200, 0, "sort_order", true).await?;
    Ok(rows
        .iter()
        .filter_map(|row| row.get("image_url").and_then(Value::as_str))
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(ToOwned::to_owned)
        .collect())
}

/// Loads a property row with its gallery and normalizes it into a record.
pub async fn load_property(pool: &PgPool, property_id: &str) -> Result<PropertyRecord, AppError> {
    let row = get_row(pool, PROPERTIES_TABLE, property_id, "id").await?;
    let gallery = gallery_urls(pool, property_id).await?;
    record_from_row(&row, gallery).ok_or_else(|| {
        AppError::UnprocessableEntity("Property has an unsupported property_type.".to_string())
    })
}
