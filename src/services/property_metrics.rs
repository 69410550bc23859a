use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::services::{
    config_normalizer::LegacyFlatFields,
    input_format::bhk_tokens,
    property_config::{BuildingConfig, ConfigList, PropertyRecord, TowerConfig},
};

static FIRST_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(\.\d+)?").expect("valid number pattern"));

/// Figures shown on cards and used for filtering and sorting. Computed once
/// per record and handed to every reader.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PropertySummary {
    pub lowest_price: Option<f64>,
    pub area_range_label: Option<String>,
    pub bhk_labels: Vec<String>,
}

pub fn summarize(record: &PropertyRecord) -> PropertySummary {
    PropertySummary {
        lowest_price: lowest_price(record),
        area_range_label: area_range_label(record),
        bhk_labels: bhk_labels(&record.configs),
    }
}

pub fn lowest_price(record: &PropertyRecord) -> Option<f64> {
    match &record.configs {
        ConfigList::Buildings(buildings) => {
            lowest_building_price(buildings, &record.legacy)
        }
        ConfigList::Towers(_) => leading_number(&record.price),
    }
}

/// Minimum over every filled price tier of every building, falling back to
/// the legacy flat tier columns when no building has a price.
pub fn lowest_building_price(
    buildings: &[BuildingConfig],
    legacy: &LegacyFlatFields,
) -> Option<f64> {
    let structured = buildings
        .iter()
        .flat_map(BuildingConfig::price_tiers)
        .flatten();
    minimum(structured).or_else(|| minimum(legacy.prices.iter().copied()))
}

pub fn area_range_label(record: &PropertyRecord) -> Option<String> {
    match &record.configs {
        ConfigList::Buildings(buildings) => {
            plot_area_label(buildings, record.legacy.plot_size.as_deref())
        }
        ConfigList::Towers(_) => {
            let acres = record.total_area.trim();
            if acres.is_empty() {
                None
            } else {
                Some(format!("{acres} acres"))
            }
        }
    }
}

/// `"{v} sqyd"` for a single distinct plot size, `"{min}-{max} sqyd"` otherwise.
pub fn plot_area_label(buildings: &[BuildingConfig], legacy_plot_size: Option<&str>) -> Option<String> {
    let mut areas = buildings
        .iter()
        .filter_map(|building| leading_number(&building.plot_size))
        .collect::<Vec<_>>();
    if areas.is_empty() {
        areas.extend(legacy_plot_size.and_then(leading_number));
    }
    if areas.is_empty() {
        return None;
    }

    areas.sort_by(f64::total_cmp);
    areas.dedup();
    let min = areas[0];
    let max = areas[areas.len() - 1];
    if areas.len() == 1 {
        Some(format!("{min} sqyd"))
    } else {
        Some(format!("{min}-{max} sqyd"))
    }
}

/// Flattened BHK labels across towers, first appearance wins.
pub fn bhk_labels(configs: &ConfigList) -> Vec<String> {
    let ConfigList::Towers(towers) = configs else {
        return Vec::new();
    };
    let mut labels: Vec<String> = Vec::new();
    for label in towers.iter().flat_map(|tower: &TowerConfig| bhk_tokens(&tower.bhk)) {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

fn leading_number(text: &str) -> Option<f64> {
    FIRST_NUMBER
        .find(text)
        .and_then(|found| found.as_str().parse::<f64>().ok())
        .filter(|value| value.is_finite())
}

fn minimum(values: impl Iterator<Item = f64>) -> Option<f64> {
    values.fold(None, |lowest, value| match lowest {
        Some(current) if current <= value => Some(current),
        _ => Some(value),
    })
}

#[cfg(test)]
mod tests {
    use super::{bhk_labels, lowest_building_price, plot_area_label, summarize};
    use crate::services::{
        config_normalizer::LegacyFlatFields,
        property_config::{BuildingConfig, ConfigList, PropertyKind, PropertyRecord, TowerConfig},
    };

    fn building(plot_size: &str, tiers: [Option<f64>; 4]) -> BuildingConfig {
        BuildingConfig {
            plot_size: plot_size.to_string(),
            price_top: tiers[0],
            price_mid1: tiers[1],
            price_mid2: tiers[2],
            price_ug: tiers[3],
            ..BuildingConfig::default()
        }
    }

    #[test]
    fn lowest_price_spans_all_buildings_and_tiers() {
        let buildings = vec![
            building("", [Some(5.0), Some(4.2), None, Some(3.9)]),
            building("", [None, Some(3.1), None, None]),
        ];
        let legacy = LegacyFlatFields {
            plot_size: None,
            prices: vec![1.0],
        };
        assert_eq!(lowest_building_price(&buildings, &legacy), Some(3.1));
    }

    #[test]
    fn lowest_price_falls_back_to_legacy_columns() {
        let buildings = vec![building("", [None; 4]), building("", [None; 4])];
        let legacy = LegacyFlatFields {
            plot_size: None,
            prices: vec![2.7, 2.4],
        };
        assert_eq!(lowest_building_price(&buildings, &legacy), Some(2.4));
        assert_eq!(
            lowest_building_price(&buildings, &LegacyFlatFields::default()),
            None
        );
    }

    #[test]
    fn formats_area_ranges() {
        assert_eq!(
            plot_area_label(&[building("263 sqyd", [None; 4])], None),
            Some("263 sqyd".to_string())
        );
        assert_eq!(
            plot_area_label(
                &[building("200 sqyd", [None; 4]), building("100 sqyd", [None; 4])],
                None
            ),
            Some("100-200 sqyd".to_string())
        );
        assert_eq!(
            plot_area_label(
                &[building("150 sqyd", [None; 4]), building("150", [None; 4])],
                None
            ),
            Some("150 sqyd".to_string())
        );
        assert_eq!(
            plot_area_label(&[building("", [None; 4])], Some("180.5 sqyd")),
            Some("180.5 sqyd".to_string())
        );
        assert_eq!(plot_area_label(&[building("", [None; 4])], None), None);
    }

    #[test]
    fn collects_bhk_labels_in_order() {
        let configs = ConfigList::Towers(vec![
            TowerConfig {
                bhk: "2BHK, 3BHK".to_string(),
                ..TowerConfig::numbered(1)
            },
            TowerConfig {
                bhk: "3, 4BHK".to_string(),
                ..TowerConfig::numbered(2)
            },
            TowerConfig::numbered(3),
        ]);
        assert_eq!(bhk_labels(&configs), vec!["2BHK", "3BHK", "4BHK"]);
        assert!(bhk_labels(&ConfigList::default_for(PropertyKind::BuilderFloor)).is_empty());
    }

    #[test]
    fn summarizes_apartments_from_scalar_fields() {
        let mut record = PropertyRecord::new(PropertyKind::Apartment);
        record.price = "2.75 Cr".to_string();
        record.total_area = "12".to_string();
        let summary = summarize(&record);
        assert_eq!(summary.lowest_price, Some(2.75));
        assert_eq!(summary.area_range_label.as_deref(), Some("12 acres"));

        record.price = String::new();
        record.total_area = " ".to_string();
        let empty = summarize(&record);
        assert_eq!(empty.lowest_price, None);
        assert_eq!(empty.area_range_label, None);
    }
}
