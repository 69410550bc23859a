use serde_json::{Map, Value};

use crate::services::property_config::{
    count_from_value, flag_from_value, parse_lenient_enum, price_from_value, text_from_value,
    BuildingConfig, ConfigList, PropertyKind, PropertyRecord, TowerConfig,
};

/// Column holding the structured sub-unit list.
pub const CONFIG_COLUMN: &str = "configurations";

const LEGACY_PRICE_COLUMNS: &[&str] = &["price_top", "price_mid1", "price_mid2", "price_ug"];

/// Flat, pre-list columns still read as a fallback by the metrics calculator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyFlatFields {
    pub plot_size: Option<String>,
    pub prices: Vec<f64>,
}

/// Returns the structured config list of a persisted row, or synthesizes a
/// one-element list from the legacy flat columns when the structured column is
/// absent, empty or unparseable. Never returns an empty list.
pub fn normalize(kind: PropertyKind, raw: &Value) -> ConfigList {
    if let Some(list) = structured_configs(kind, raw) {
        return list;
    }
    synthesize_from_flat_fields(kind, raw)
}

fn structured_configs(kind: PropertyKind, raw: &Value) -> Option<ConfigList> {
    let column = raw.get(CONFIG_COLUMN)?;
    let decoded;
    let items = match column {
        Value::Array(_) => column,
        Value::String(text) if !text.trim().is_empty() => {
            decoded = match serde_json::from_str::<Value>(text) {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(error = %error, "Config column is not valid JSON, using flat columns");
                    return None;
                }
            };
            &decoded
        }
        _ => return None,
    };

    if !items.as_array().is_some_and(|entries| !entries.is_empty()) {
        return None;
    }

    match ConfigList::from_value(kind, items) {
        Ok(list) => Some(list.with_positional_numbers()),
        Err(error) => {
            tracing::debug!(error = %error, kind = kind.as_str(), "Config column has an unexpected shape, using flat columns");
            None
        }
    }
}

fn synthesize_from_flat_fields(kind: PropertyKind, raw: &Value) -> ConfigList {
    let empty = Map::new();
    let row = raw.as_object().unwrap_or(&empty);
    let text = |key: &str| row.get(key).map(text_from_value).unwrap_or_default();
    let count = |key: &str| row.get(key).and_then(count_from_value);
    let flag = |key: &str| row.get(key).is_some_and(flag_from_value);
    let price = |key: &str| row.get(key).and_then(price_from_value);

    match kind {
        PropertyKind::Apartment => ConfigList::Towers(vec![TowerConfig {
            tower_number: 1,
            bhk: legacy_bhk_text(row.get("bhk_config")),
            area_sqft: text("area_sqft"),
            flats_per_floor: count("flats_per_floor"),
            floors_in_tower: text("floors"),
            lifts: count("lifts"),
            penthouse: flag("penthouse"),
            parking_per_floor: count("parking_per_floor"),
            no_of_basements: count("no_of_basements"),
        }]),
        PropertyKind::BuilderFloor => ConfigList::Buildings(vec![BuildingConfig {
            building_number: 1,
            plot_size: text("plot_size"),
            facing: row
                .get("facing")
                .and_then(Value::as_str)
                .and_then(parse_lenient_enum),
            floors_count: count("floors_count").filter(|floors| *floors > 0),
            roof_rights: row
                .get("roof_rights")
                .and_then(Value::as_str)
                .and_then(parse_lenient_enum),
            condition: enum_or_default(row.get("condition")),
            status: enum_or_default(row.get("status")),
            category: enum_or_default(row.get("category")),
            possession_date: text("possession_date"),
            owner_name: text("owner_name"),
            comments: text("comments"),
            brochure_url: None,
            price_top: price("price_top"),
            price_mid1: price("price_mid1"),
            price_mid2: price("price_mid2"),
            price_ug: price("price_ug"),
            has_basement: flag("has_basement"),
            is_triplex: flag("is_triplex"),
            is_gated: flag("is_gated"),
        }]),
    }
}

fn enum_or_default<T: serde::de::DeserializeOwned + Default>(value: Option<&Value>) -> T {
    value
        .and_then(Value::as_str)
        .and_then(parse_lenient_enum)
        .unwrap_or_default()
}

/// `bhk_config` was stored either as a text array or as a single string.
fn legacy_bhk_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(text_from_value)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => text_from_value(other),
        None => String::new(),
    }
}

pub fn legacy_flat_fields(raw: &Value) -> LegacyFlatFields {
    let plot_size = raw
        .get("plot_size")
        .map(text_from_value)
        .filter(|value| !value.is_empty());
    let prices = LEGACY_PRICE_COLUMNS
        .iter()
        .filter_map(|column| raw.get(*column).and_then(price_from_value))
        .collect();
    LegacyFlatFields { plot_size, prices }
}

/// Builds a typed record from a persisted `properties` row. Rows with an
/// unrecognized `property_type` yield `None`.
pub fn record_from_row(row: &Value, gallery_image_urls: Vec<String>) -> Option<PropertyRecord> {
    let kind = row
        .get("property_type")
        .and_then(Value::as_str)
        .and_then(PropertyKind::parse);
    let Some(kind) = kind else {
        tracing::warn!(
            property_id = %text_field(row, "id"),
            "Skipping property row with unknown property_type"
        );
        return None;
    };

    let mut record = PropertyRecord::new(kind);
    record.id = Some(text_field(row, "id")).filter(|value| !value.is_empty());
    record.slug = text_field(row, "slug");
    record.name = text_field(row, "name");
    record.location = text_field(row, "location");
    record.developer = Some(text_field(row, "developer")).filter(|value| !value.is_empty());
    record.description = text_field(row, "description");
    record.status = text_field(row, "status");
    record.cover_image_url =
        Some(text_field(row, "cover_image_url")).filter(|value| !value.is_empty());
    record.brochure_url = Some(text_field(row, "brochure_url")).filter(|value| !value.is_empty());
    record.gallery_image_urls = gallery_image_urls;
    record.configs = normalize(kind, row);
    record.legacy = legacy_flat_fields(row);

    match kind {
        PropertyKind::Apartment => {
            record.price = text_field(row, "price");
            record.total_area = text_field(row, "total_area");
            record.amenities = row
                .get("amenities")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(text_from_value)
                        .filter(|item| !item.is_empty())
                        .collect()
                })
                .unwrap_or_default();
        }
        PropertyKind::BuilderFloor => {
            record.facing = row
                .get("facing")
                .and_then(Value::as_str)
                .and_then(parse_lenient_enum);
        }
    }
    Some(record)
}

fn text_field(row: &Value, key: &str) -> String {
    row.get(key).map(text_from_value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{legacy_flat_fields, normalize, record_from_row, CONFIG_COLUMN};
    use crate::services::property_config::{
        BuildingConfig, ConfigList, Facing, PropertyKind, RoofRights, TowerConfig,
    };
    use serde_json::{json, Value};

    fn wrap(list: &ConfigList) -> Value {
        json!({ CONFIG_COLUMN: list.to_value() })
    }

    #[test]
    fn returns_structured_list_verbatim() {
        let list = ConfigList::Buildings(vec![
            BuildingConfig {
                plot_size: "263 sqyd".to_string(),
                price_top: Some(4.5),
                ..BuildingConfig::numbered(1)
            },
            BuildingConfig {
                plot_size: "300 sqyd".to_string(),
                ..BuildingConfig::numbered(3)
            },
        ]);
        assert_eq!(normalize(PropertyKind::BuilderFloor, &wrap(&list)), list);
    }

    #[test]
    fn normalizing_is_idempotent() {
        let raw = json!({
            "plot_size": "180 sqyd",
            "facing": "East",
            "roof_rights": "1/4",
            "price_mid1": "2.1",
            "is_gated": true
        });
        let once = normalize(PropertyKind::BuilderFloor, &raw);
        let twice = normalize(PropertyKind::BuilderFloor, &wrap(&once));
        assert_eq!(once, twice);

        let apartment = normalize(PropertyKind::Apartment, &json!({ "bhk_config": ["2BHK"] }));
        assert_eq!(normalize(PropertyKind::Apartment, &wrap(&apartment)), apartment);
    }

    #[test]
    fn parses_string_encoded_column() {
        let encoded = json!({
            CONFIG_COLUMN: "[{\"tower_number\":1,\"bhk\":\"3BHK\"},{\"bhk\":\"4BHK\"}]"
        });
        let ConfigList::Towers(towers) = normalize(PropertyKind::Apartment, &encoded) else {
            panic!("expected towers");
        };
        assert_eq!(towers.len(), 2);
        assert_eq!(towers[1].tower_number, 2);
        assert_eq!(towers[1].bhk, "4BHK");
    }

    #[test]
    fn falls_back_to_flat_columns_on_parse_failure() {
        let raw = json!({
            CONFIG_COLUMN: "[{not json",
            "plot_size": "263 sqyd",
            "facing": "north-east",
            "floors_count": "4",
            "roof_rights": "full",
            "price_top": 5.5,
            "price_ug": ""
        });
        let ConfigList::Buildings(buildings) = normalize(PropertyKind::BuilderFloor, &raw) else {
            panic!("expected buildings");
        };
        assert_eq!(buildings.len(), 1);
        assert_eq!(buildings[0].building_number, 1);
        assert_eq!(buildings[0].plot_size, "263 sqyd");
        assert_eq!(buildings[0].facing, Some(Facing::NorthEast));
        assert_eq!(buildings[0].floors_count, Some(4));
        assert_eq!(buildings[0].roof_rights, Some(RoofRights::Full));
        assert_eq!(buildings[0].price_top, Some(5.5));
        assert_eq!(buildings[0].price_ug, None);
    }

    #[test]
    fn empty_structured_list_counts_as_absent() {
        let raw = json!({ CONFIG_COLUMN: [], "bhk_config": ["2BHK", "3BHK"], "floors": "G+14" });
        assert_eq!(
            normalize(PropertyKind::Apartment, &raw),
            ConfigList::Towers(vec![TowerConfig {
                bhk: "2BHK, 3BHK".to_string(),
                floors_in_tower: "G+14".to_string(),
                ..TowerConfig::numbered(1)
            }])
        );
    }

    #[test]
    fn collects_legacy_prices_skipping_blanks() {
        let legacy = legacy_flat_fields(&json!({
            "plot_size": "  ",
            "price_top": "3.4",
            "price_mid1": "",
            "price_mid2": null,
            "price_ug": 2.2
        }));
        assert_eq!(legacy.plot_size, None);
        assert_eq!(legacy.prices, vec![3.4, 2.2]);
    }

    #[test]
    fn builds_record_from_row() {
        let row = json!({
            "id": "550e8400-e29b-41d4-a716-446655440000",
            "slug": "dlf-floors",
            "name": "DLF Floors",
            "property_type": "builder_floor",
            "location": "Gurgaon",
            "developer": "",
            "facing": "west",
            "amenities": ["Gym"],
            "configurations": [{ "building_number": 1, "plot_size": "300 sqyd" }]
        });
        let record = record_from_row(&row, vec!["https://cdn/x.jpg".to_string()])
            .expect("known kind");
        assert_eq!(record.kind, PropertyKind::BuilderFloor);
        assert_eq!(record.developer, None);
        assert_eq!(record.facing, Some(Facing::West));
        assert!(record.amenities.is_empty());
        assert_eq!(record.gallery_image_urls.len(), 1);
        assert_eq!(record.configs.len(), 1);

        assert!(record_from_row(&json!({ "property_type": "villa" }), Vec::new()).is_none());
    }
}
