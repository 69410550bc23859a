use serde::Deserialize;
use serde_json::Value;
use validator::Validate;

use crate::error::AppError;

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::UnprocessableEntity(format!("Validation failed: {errors}")))
}

pub fn clamp_limit_in_range(limit: i64, minimum: i64, maximum: i64) -> i64 {
    limit.clamp(minimum, maximum)
}

fn default_limit_60() -> i64 {
    60
}

fn default_limit_200() -> i64 {
    200
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublicSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct PublicPropertiesQuery {
    pub kind: Option<String>,
    #[validate(length(max = 120))]
    pub location: Option<String>,
    #[validate(length(max = 120))]
    pub q: Option<String>,
    #[validate(length(max = 20))]
    pub bhk: Option<String>,
    #[validate(range(min = 0.0))]
    pub min_price: Option<f64>,
    #[validate(range(min = 0.0))]
    pub max_price: Option<f64>,
    #[serde(default)]
    pub sort: PublicSort,
    #[serde(default = "default_limit_60")]
    pub limit: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AdminPropertiesQuery {
    pub kind: Option<String>,
    #[serde(default = "default_limit_200")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertySlugPath {
    pub slug: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct PropertyPath {
    pub property_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct WizardPath {
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct WizardIndexPath {
    pub session_id: String,
    pub index: usize,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct StartWizardInput {
    #[validate(length(min = 1, max = 64))]
    pub property_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct SetKindInput {
    #[validate(length(min = 1, max = 32))]
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct FieldUpdateInput {
    #[validate(length(min = 1, max = 64))]
    pub field: String,
    #[serde(default)]
    pub value: Value,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize, Validate)]
pub struct RemoveGalleryImageInput {
    #[validate(length(min = 1, max = 2048))]
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::{
        clamp_limit_in_range, validate_input, FieldUpdateInput, PublicPropertiesQuery, PublicSort,
    };
    use serde_json::json;

    #[test]
    fn public_query_defaults() {
        let query: PublicPropertiesQuery =
            serde_json::from_value(json!({ "kind": "apartment" })).expect("query parses");
        assert_eq!(query.sort, PublicSort::Newest);
        assert_eq!(query.limit, 60);

        let sorted: PublicPropertiesQuery =
            serde_json::from_value(json!({ "sort": "price_asc", "min_price": -1.0 }))
                .expect("query parses");
        assert_eq!(sorted.sort, PublicSort::PriceAsc);
        assert!(validate_input(&sorted).is_err());
    }

    #[test]
    fn field_updates_need_a_field_name() {
        let input: FieldUpdateInput =
            serde_json::from_value(json!({ "field": "" })).expect("input parses");
        assert!(validate_input(&input).is_err());
        assert_eq!(clamp_limit_in_range(5000, 1, 200), 200);
    }
}
