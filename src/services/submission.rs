use serde::Serialize;
use serde_json::{Map, Value};

use crate::{
    error::AppError,
    repository::property_store::PropertyStore,
    services::{
        asset_reconciliation::{AssetSession, PendingFile},
        input_format::slugify,
        property_config::{ConfigList, PropertyRecord},
        property_metrics::{summarize, PropertySummary},
        storage::{build_asset_path, AssetStorage, StorageError},
        wizard::WizardFlow,
    },
};

const ASSET_ENTITY_TYPE: &str = "properties";
const ROUND_TRIP_FIELDS: &[&str] = &["status", "price", "lowest_price"];

/// Failure of one submit attempt. Each variant carries the single message the
/// admin sees.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SubmitError {
    #[error("{0}")]
    Validation(String),
    #[error("Upload failed: {0}")]
    Upload(#[from] StorageError),
    #[error("Could not save property: {0}")]
    Persistence(String),
}

impl From<SubmitError> for AppError {
    fn from(error: SubmitError) -> Self {
        match error {
            SubmitError::Validation(_) => AppError::UnprocessableEntity(error.to_string()),
            SubmitError::Upload(_) | SubmitError::Persistence(_) => {
                AppError::Dependency(error.to_string())
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub property_id: String,
    pub slug: String,
    pub property: Value,
    pub gallery_image_urls: Vec<String>,
    pub summary: PropertySummary,
    pub uploaded_files: usize,
    pub removed_gallery_images: usize,
}

/// Materializes a wizard draft: uploads staged files in order, writes the
/// record, verifies the write and then reconciles gallery rows. The first
/// upload or write failure aborts everything after it.
#[tracing::instrument(skip_all, fields(flow = ?flow))]
pub async fn submit_property(
    storage: &dyn AssetStorage,
    store: &dyn PropertyStore,
    flow: WizardFlow,
    mut record: PropertyRecord,
    assets: &AssetSession,
    timestamp_millis: i64,
) -> Result<SubmitOutcome, SubmitError> {
    let existing_id = match flow {
        WizardFlow::Create => None,
        WizardFlow::Edit => Some(record.id.clone().ok_or_else(|| {
            SubmitError::Validation("Property id is missing for an edit.".to_string())
        })?),
    };
    if flow == WizardFlow::Create || record.slug.trim().is_empty() {
        record.slug = slugify(&record.name);
    }
    if record.slug.is_empty() {
        return Err(SubmitError::Validation(
            "Property name must contain letters or digits.".to_string(),
        ));
    }

    let uploader = Uploader {
        storage,
        slug: &record.slug,
        timestamp_millis,
    };
    let mut uploaded_files = 0;

    record.cover_image_url = match assets.cover.replacement() {
        Some(file) => {
            uploaded_files += 1;
            Some(uploader.upload(file, "cover", None).await?)
        }
        None => assets.cover.existing().map(ToOwned::to_owned),
    };

    // sequential so gallery order matches staging order
    let mut uploaded_gallery = Vec::with_capacity(assets.gallery.to_add().len());
    for (index, file) in assets.gallery.to_add().iter().enumerate() {
        uploaded_gallery.push(uploader.upload(file, "gallery", Some(index)).await?);
        uploaded_files += 1;
    }

    record.brochure_url = match assets.brochure.replacement() {
        Some(file) => {
            uploaded_files += 1;
            Some(uploader.upload(file, "brochure", None).await?)
        }
        None => assets.brochure.existing().map(ToOwned::to_owned),
    };

    for (number, file) in &assets.building_brochures {
        let ConfigList::Buildings(buildings) = &mut record.configs else {
            tracing::warn!(building = number, "Dropping building brochure staged for a non builder-floor draft");
            continue;
        };
        let Some(building) = buildings
            .iter_mut()
            .find(|building| building.building_number == *number)
        else {
            tracing::warn!(building = number, "Dropping brochure of a removed building");
            continue;
        };
        let role = format!("building-{number}-brochure");
        building.brochure_url = Some(uploader.upload(file, &role, None).await?);
        uploaded_files += 1;
    }

    let gallery_image_urls = assets.gallery.final_list(&uploaded_gallery);
    record.gallery_image_urls = gallery_image_urls.clone();

    let summary = summarize(&record);
    let payload = record.to_write_payload(&summary);
    let persisted = match &existing_id {
        None => store.create_property(&payload).await,
        Some(property_id) => store.update_property(property_id, &payload).await,
    }
    .map_err(|error| SubmitError::Persistence(error.to_string()))?;
    verify_round_trip(&payload, &persisted)?;

    let property_id = existing_id.unwrap_or_else(|| value_str(&persisted, "id"));
    if property_id.is_empty() {
        return Err(SubmitError::Persistence(
            "The saved property has no id.".to_string(),
        ));
    }

    if let Some(developer) = record.developer.as_deref() {
        if let Err(error) = store.sync_developer(developer).await {
            tracing::warn!(developer, error = %error, "Developer directory sync failed");
        }
    }

    let removed_gallery_images = store
        .delete_gallery_images(&property_id, assets.gallery.to_remove())
        .await
        .map_err(|error| SubmitError::Persistence(error.to_string()))?;
    for url in assets.gallery.to_remove() {
        if let Err(error) = storage.delete(url).await {
            tracing::warn!(url = %url, error = %error, "Could not delete removed gallery image");
        }
    }

    if !uploaded_gallery.is_empty() {
        store
            .append_gallery_images(&property_id, &uploaded_gallery)
            .await
            .map_err(|error| SubmitError::Persistence(error.to_string()))?;
    }

    tracing::info!(
        property_id = %property_id,
        slug = %record.slug,
        uploaded_files,
        removed_gallery_images,
        "Property submitted"
    );

    Ok(SubmitOutcome {
        property_id,
        slug: record.slug,
        property: persisted,
        gallery_image_urls,
        summary,
        uploaded_files,
        removed_gallery_images: removed_gallery_images as usize,
    })
}

struct Uploader<'a> {
    storage: &'a dyn AssetStorage,
    slug: &'a str,
    timestamp_millis: i64,
}

impl Uploader<'_> {
    async fn upload(
        &self,
        file: &PendingFile,
        role: &str,
        index: Option<usize>,
    ) -> Result<String, StorageError> {
        let path = build_asset_path(
            ASSET_ENTITY_TYPE,
            self.slug,
            role,
            self.timestamp_millis,
            index,
            &file.extension(),
        );
        self.storage.upload(file, &path).await
    }
}

/// The persisted row must echo the headline fields exactly as sent.
fn verify_round_trip(sent: &Map<String, Value>, persisted: &Value) -> Result<(), SubmitError> {
    for field in ROUND_TRIP_FIELDS {
        let expected = sent.get(*field).unwrap_or(&Value::Null);
        let actual = persisted.get(*field).unwrap_or(&Value::Null);
        if !same_value(expected, actual) {
            tracing::error!(field, expected = %expected, actual = %actual, "Saved property does not match submitted values");
            return Err(SubmitError::Persistence(format!(
                "Saved '{field}' does not match the submitted value."
            )));
        }
    }
    Ok(())
}

fn same_value(expected: &Value, actual: &Value) -> bool {
    match (expected, actual) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (numeric(expected), numeric(actual)) {
                (Some(left), Some(right)) => (left - right).abs() < 1e-9,
                _ => false,
            }
        }
        _ => expected == actual,
    }
}

// numeric columns may come back as strings through row_to_json
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn value_str(row: &Value, key: &str) -> String {
    row.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string()
}
