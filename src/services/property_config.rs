use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Apartment,
    BuilderFloor,
}

impl PropertyKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw
            .trim()
            .to_ascii_lowercase()
            .replace(['-', ' '], "_")
            .as_str()
        {
            "apartment" | "apartments" => Some(Self::Apartment),
            "builder_floor" | "builder_floors" | "builderfloor" => Some(Self::BuilderFloor),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apartment => "apartment",
            Self::BuilderFloor => "builder_floor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Facing {
    North,
    South,
    East,
    West,
    NorthEast,
    NorthWest,
    SouthEast,
    SouthWest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoofRights {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "half")]
    Half,
    #[serde(rename = "1-3")]
    OneThird,
    #[serde(rename = "1-4")]
    OneFourth,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildingCondition {
    #[default]
    New,
    Old,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConstructionStatus {
    #[default]
    ReadyToMove,
    UnderConstruction,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BuildingCategory {
    Deendayal,
    #[default]
    Regular,
}

/// One tower of an apartment project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TowerConfig {
    #[serde(deserialize_with = "de_number")]
    pub tower_number: u32,
    #[serde(deserialize_with = "de_text")]
    pub bhk: String,
    #[serde(deserialize_with = "de_text")]
    pub area_sqft: String,
    #[serde(deserialize_with = "de_opt_count")]
    pub flats_per_floor: Option<u32>,
    #[serde(deserialize_with = "de_text")]
    pub floors_in_tower: String,
    #[serde(deserialize_with = "de_opt_count")]
    pub lifts: Option<u32>,
    #[serde(deserialize_with = "de_flag")]
    pub penthouse: bool,
    #[serde(deserialize_with = "de_opt_count")]
    pub parking_per_floor: Option<u32>,
    #[serde(deserialize_with = "de_opt_count")]
    pub no_of_basements: Option<u32>,
}

impl TowerConfig {
    pub fn numbered(tower_number: u32) -> Self {
        Self {
            tower_number,
            ..Self::default()
        }
    }
}

/// One building on a builder-floor plot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildingConfig {
    #[serde(deserialize_with = "de_number")]
    pub building_number: u32,
    #[serde(deserialize_with = "de_text")]
    pub plot_size: String,
    #[serde(deserialize_with = "de_opt_enum")]
    pub facing: Option<Facing>,
    #[serde(deserialize_with = "de_opt_positive")]
    pub floors_count: Option<u32>,
    #[serde(deserialize_with = "de_opt_enum")]
    pub roof_rights: Option<RoofRights>,
    #[serde(deserialize_with = "de_enum_or_default")]
    pub condition: BuildingCondition,
    #[serde(deserialize_with = "de_enum_or_default")]
    pub status: ConstructionStatus,
    #[serde(deserialize_with = "de_enum_or_default")]
    pub category: BuildingCategory,
    #[serde(deserialize_with = "de_text")]
    pub possession_date: String,
    #[serde(deserialize_with = "de_text")]
    pub owner_name: String,
    #[serde(deserialize_with = "de_text")]
    pub comments: String,
    #[serde(deserialize_with = "de_opt_text")]
    pub brochure_url: Option<String>,
    #[serde(deserialize_with = "de_opt_price")]
    pub price_top: Option<f64>,
    #[serde(deserialize_with = "de_opt_price")]
    pub price_mid1: Option<f64>,
    #[serde(deserialize_with = "de_opt_price")]
    pub price_mid2: Option<f64>,
    #[serde(deserialize_with = "de_opt_price")]
    pub price_ug: Option<f64>,
    #[serde(deserialize_with = "de_flag")]
    pub has_basement: bool,
    #[serde(deserialize_with = "de_flag")]
    pub is_triplex: bool,
    #[serde(deserialize_with = "de_flag")]
    pub is_gated: bool,
}

impl BuildingConfig {
    pub fn numbered(building_number: u32) -> Self {
        Self {
            building_number,
            ..Self::default()
        }
    }

    pub fn price_tiers(&self) -> [Option<f64>; 4] {
        [self.price_top, self.price_mid1, self.price_mid2, self.price_ug]
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigListError {
    #[error("A property must keep at least one sub-unit.")]
    LastSubUnit,
    #[error("Sub-unit index {index} is out of range (list has {len} entries).")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Unknown sub-unit field '{0}'.")]
    UnknownField(String),
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("Sub-unit number {0} is already in use.")]
    DuplicateNumber(u32),
}

/// The per-property list of sub-units. The variant always matches the owning
/// record's kind.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigList {
    Towers(Vec<TowerConfig>),
    Buildings(Vec<BuildingConfig>),
}

impl ConfigList {
    /// A fresh list holding a single sub-unit numbered 1.
    pub fn default_for(kind: PropertyKind) -> Self {
        match kind {
            PropertyKind::Apartment => Self::Towers(vec![TowerConfig::numbered(1)]),
            PropertyKind::BuilderFloor => Self::Buildings(vec![BuildingConfig::numbered(1)]),
        }
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Towers(_) => PropertyKind::Apartment,
            Self::Buildings(_) => PropertyKind::BuilderFloor,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Towers(items) => items.len(),
            Self::Buildings(items) => items.len(),
        }
    }

    fn number_field(&self) -> &'static str {
        match self {
            Self::Towers(_) => "tower_number",
            Self::Buildings(_) => "building_number",
        }
    }

    pub fn numbers(&self) -> Vec<u32> {
        match self {
            Self::Towers(items) => items.iter().map(|item| item.tower_number).collect(),
            Self::Buildings(items) => items.iter().map(|item| item.building_number).collect(),
        }
    }

    pub fn number_at(&self, index: usize) -> Option<u32> {
        self.numbers().get(index).copied()
    }

    pub fn next_number(&self) -> u32 {
        self.numbers().into_iter().max().unwrap_or(0) + 1
    }

    /// Parses a persisted JSON array into the list shape for `kind`.
    pub fn from_value(kind: PropertyKind, value: &Value) -> Result<Self, serde_json::Error> {
        match kind {
            PropertyKind::Apartment => {
                Vec::<TowerConfig>::deserialize(value).map(Self::Towers)
            }
            PropertyKind::BuilderFloor => {
                Vec::<BuildingConfig>::deserialize(value).map(Self::Buildings)
            }
        }
    }

    pub fn to_value(&self) -> Value {
        let serialized = match self {
            Self::Towers(items) => serde_json::to_value(items),
            Self::Buildings(items) => serde_json::to_value(items),
        };
        serialized.unwrap_or_else(|_| Value::Array(Vec::new()))
    }

    /// Fills unset (zero) sub-unit numbers from list position. Explicit numbers
    /// are left alone, including gaps left by earlier removals.
    pub fn with_positional_numbers(mut self) -> Self {
        match &mut self {
            Self::Towers(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    if item.tower_number == 0 {
                        item.tower_number = index as u32 + 1;
                    }
                }
            }
            Self::Buildings(items) => {
                for (index, item) in items.iter_mut().enumerate() {
                    if item.building_number == 0 {
                        item.building_number = index as u32 + 1;
                    }
                }
            }
        }
        self
    }

    pub fn appended(&self) -> Self {
        let number = self.next_number();
        let mut next = self.clone();
        match &mut next {
            Self::Towers(items) => items.push(TowerConfig::numbered(number)),
            Self::Buildings(items) => items.push(BuildingConfig::numbered(number)),
        }
        next
    }

    /// Removes the entry at `index`. Remaining entries keep their numbers.
    pub fn removed(&self, index: usize) -> Result<Self, ConfigListError> {
        let len = self.len();
        if index >= len {
            return Err(ConfigListError::IndexOutOfRange { index, len });
        }
        if len <= 1 {
            return Err(ConfigListError::LastSubUnit);
        }
        let mut next = self.clone();
        match &mut next {
            Self::Towers(items) => {
                items.remove(index);
            }
            Self::Buildings(items) => {
                items.remove(index);
            }
        }
        Ok(next)
    }

    /// Returns a copy of the list with one field of one entry replaced.
    pub fn with_field(
        &self,
        index: usize,
        field: &str,
        value: Value,
    ) -> Result<Self, ConfigListError> {
        let len = self.len();
        if index >= len {
            return Err(ConfigListError::IndexOutOfRange { index, len });
        }
        if field == self.number_field() {
            let number = count_from_value(&value).filter(|number| *number > 0);
            if number.is_none() {
                return Err(ConfigListError::InvalidValue {
                    field: field.to_string(),
                    message: format!("'{}' is not a positive whole number", text_from_value(&value)),
                });
            }
        }
        let mut next = self.clone();
        match &mut next {
            Self::Towers(items) => {
                let updated = replace_field(&items[index], field, value)?;
                items[index] = updated;
            }
            Self::Buildings(items) => {
                let updated = replace_field(&items[index], field, value)?;
                items[index] = updated;
            }
        }
        if let Some(duplicate) = first_duplicate(&next.numbers()) {
            return Err(ConfigListError::DuplicateNumber(duplicate));
        }
        Ok(next)
    }
}

impl Serialize for ConfigList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Towers(items) => items.serialize(serializer),
            Self::Buildings(items) => items.serialize(serializer),
        }
    }
}

fn replace_field<T>(entry: &T, field: &str, value: Value) -> Result<T, ConfigListError>
where
    T: Serialize + DeserializeOwned,
{
    let mut object = match serde_json::to_value(entry) {
        Ok(Value::Object(object)) => object,
        _ => Map::new(),
    };
    if !object.contains_key(field) {
        return Err(ConfigListError::UnknownField(field.to_string()));
    }
    object.insert(field.to_string(), value);
    serde_json::from_value(Value::Object(object)).map_err(|error| {
        ConfigListError::InvalidValue {
            field: field.to_string(),
            message: error.to_string(),
        }
    })
}

fn first_duplicate(numbers: &[u32]) -> Option<u32> {
    let mut seen = std::collections::HashSet::new();
    numbers.iter().copied().find(|number| !seen.insert(*number))
}

/// Top-level property record, as edited by the wizard and shown on public pages.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyRecord {
    pub id: Option<String>,
    pub slug: String,
    pub name: String,
    pub kind: PropertyKind,
    pub location: String,
    pub developer: Option<String>,
    pub description: String,
    pub status: String,
    /// Apartment headline price text, e.g. `"2.5 Cr"`.
    pub price: String,
    /// Apartment project size in acres.
    pub total_area: String,
    pub facing: Option<Facing>,
    pub amenities: Vec<String>,
    #[serde(rename = "configurations")]
    pub configs: ConfigList,
    pub cover_image_url: Option<String>,
    pub gallery_image_urls: Vec<String>,
    pub brochure_url: Option<String>,
    #[serde(skip)]
    pub legacy: crate::services::config_normalizer::LegacyFlatFields,
}

impl PropertyRecord {
    pub fn new(kind: PropertyKind) -> Self {
        Self {
            id: None,
            slug: String::new(),
            name: String::new(),
            kind,
            location: String::new(),
            developer: None,
            description: String::new(),
            status: String::new(),
            price: String::new(),
            total_area: String::new(),
            facing: None,
            amenities: Vec::new(),
            configs: ConfigList::default_for(kind),
            cover_image_url: None,
            gallery_image_urls: Vec::new(),
            brochure_url: None,
            legacy: Default::default(),
        }
    }

    /// Switches kind, dropping every field that only means something for the
    /// previous kind. The config list is reseeded with one default sub-unit.
    pub fn switch_kind(&mut self, kind: PropertyKind) {
        if self.kind == kind {
            return;
        }
        self.kind = kind;
        self.configs = ConfigList::default_for(kind);
        self.legacy = Default::default();
        match kind {
            PropertyKind::Apartment => {
                self.facing = None;
            }
            PropertyKind::BuilderFloor => {
                self.amenities.clear();
                self.price.clear();
                self.total_area.clear();
            }
        }
    }

    /// Flattened payload for the record write contract. Kind-exclusive fields
    /// of the other kind are written as null.
    pub fn to_write_payload(
        &self,
        summary: &crate::services::property_metrics::PropertySummary,
    ) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(self.name.trim().to_string()));
        payload.insert("slug".to_string(), Value::String(self.slug.clone()));
        payload.insert(
            "property_type".to_string(),
            Value::String(self.kind.as_str().to_string()),
        );
        payload.insert(
            "location".to_string(),
            Value::String(self.location.trim().to_string()),
        );
        payload.insert("developer".to_string(), optional_text(self.developer.as_deref()));
        payload.insert("description".to_string(), optional_text(Some(&self.description)));
        payload.insert("status".to_string(), optional_text(Some(&self.status)));
        payload.insert("configurations".to_string(), self.configs.to_value());
        payload.insert(
            "cover_image_url".to_string(),
            optional_text(self.cover_image_url.as_deref()),
        );
        payload.insert(
            "brochure_url".to_string(),
            optional_text(self.brochure_url.as_deref()),
        );
        payload.insert(
            "lowest_price".to_string(),
            summary
                .lowest_price
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
        );
        payload.insert(
            "bhk_config".to_string(),
            Value::Array(
                summary
                    .bhk_labels
                    .iter()
                    .cloned()
                    .map(Value::String)
                    .collect(),
            ),
        );

        match self.kind {
            PropertyKind::Apartment => {
                payload.insert("price".to_string(), optional_text(Some(&self.price)));
                payload.insert("total_area".to_string(), optional_text(Some(&self.total_area)));
                payload.insert(
                    "amenities".to_string(),
                    Value::Array(self.amenities.iter().cloned().map(Value::String).collect()),
                );
                payload.insert("facing".to_string(), Value::Null);
            }
            PropertyKind::BuilderFloor => {
                payload.insert("price".to_string(), Value::Null);
                payload.insert("total_area".to_string(), Value::Null);
                payload.insert("amenities".to_string(), Value::Array(Vec::new()));
                payload.insert(
                    "facing".to_string(),
                    self.facing
                        .and_then(|facing| serde_json::to_value(facing).ok())
                        .unwrap_or(Value::Null),
                );
            }
        }
        payload
    }
}

fn optional_text(value: Option<&str>) -> Value {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(|text| Value::String(text.to_string()))
        .unwrap_or(Value::Null)
}

/// Parses a loosely written enum value (`"North East"`, `"north_east"`,
/// `"1/3"`) into its canonical kebab-case form.
pub fn parse_lenient_enum<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let canonical = raw
        .trim()
        .to_ascii_lowercase()
        .replace(['_', ' ', '/'], "-");
    if canonical.is_empty() {
        return None;
    }
    serde_json::from_value(Value::String(canonical)).ok()
}

/// Reads a finite, non-negative price from a JSON number or numeric string.
/// Empty strings and anything unparseable read as no value.
pub fn price_from_value(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => {
            let trimmed = text.trim().replace(',', "");
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|amount| amount.is_finite() && *amount >= 0.0)
}

pub fn count_from_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| {
                number
                    .as_f64()
                    .filter(|float| float.fract() == 0.0 && *float >= 0.0)
                    .map(|float| float as u64)
            })
            .and_then(|count| u32::try_from(count).ok()),
        Value::String(text) => text.trim().parse::<u32>().ok(),
        _ => None,
    }
}

pub fn text_from_value(value: &Value) -> String {
    match value {
        Value::String(text) => text.trim().to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        _ => String::new(),
    }
}

pub fn flag_from_value(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_i64().is_some_and(|parsed| parsed != 0),
        Value::String(text) => matches!(
            text.trim().to_ascii_lowercase().as_str(),
            "true" | "1" | "yes" | "y" | "on"
        ),
        _ => false,
    }
}

fn de_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(text_from_value(&Value::deserialize(deserializer)?))
}

fn de_opt_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let text = text_from_value(&Value::deserialize(deserializer)?);
    Ok(Some(text).filter(|value| !value.is_empty()))
}

fn de_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    Ok(count_from_value(&Value::deserialize(deserializer)?).unwrap_or(0))
}

fn de_opt_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(count_from_value(&Value::deserialize(deserializer)?))
}

fn de_opt_positive<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    Ok(count_from_value(&Value::deserialize(deserializer)?).filter(|count| *count > 0))
}

fn de_opt_price<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(price_from_value(&Value::deserialize(deserializer)?))
}

fn de_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(flag_from_value(&Value::deserialize(deserializer)?))
}

fn de_opt_enum<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value.as_str().and_then(parse_lenient_enum))
}

fn de_enum_or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value
        .as_str()
        .and_then(parse_lenient_enum)
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{
        parse_lenient_enum, BuildingConfig, ConfigList, ConfigListError, ConstructionStatus,
        Facing, PropertyKind, PropertyRecord, RoofRights, TowerConfig,
    };
    use serde_json::{json, Value};

    #[test]
    fn parses_kind_aliases() {
        assert_eq!(PropertyKind::parse("Builder Floor"), Some(PropertyKind::BuilderFloor));
        assert_eq!(PropertyKind::parse("builder-floor"), Some(PropertyKind::BuilderFloor));
        assert_eq!(PropertyKind::parse("apartment"), Some(PropertyKind::Apartment));
        assert_eq!(PropertyKind::parse("villa"), None);
    }

    #[test]
    fn parses_enum_values_leniently() {
        assert_eq!(parse_lenient_enum::<Facing>("North East"), Some(Facing::NorthEast));
        assert_eq!(parse_lenient_enum::<Facing>("south_west"), Some(Facing::SouthWest));
        assert_eq!(parse_lenient_enum::<RoofRights>("1/3"), Some(RoofRights::OneThird));
        assert_eq!(parse_lenient_enum::<Facing>(""), None);
        assert_eq!(parse_lenient_enum::<Facing>("up"), None);
    }

    #[test]
    fn building_fields_collapse_blank_values() {
        let parsed: BuildingConfig = serde_json::from_value(json!({
            "building_number": "2",
            "plot_size": "263 sqyd",
            "facing": "",
            "floors_count": 0,
            "status": "Under Construction",
            "price_top": "",
            "price_mid1": "3.25",
            "price_mid2": null,
            "price_ug": -4,
            "is_gated": "true"
        }))
        .expect("building parses");

        assert_eq!(parsed.building_number, 2);
        assert_eq!(parsed.facing, None);
        assert_eq!(parsed.floors_count, None);
        assert_eq!(parsed.status, ConstructionStatus::UnderConstruction);
        assert_eq!(parsed.price_tiers(), [None, Some(3.25), None, None]);
        assert!(parsed.is_gated);
        assert!(!parsed.has_basement);
    }

    #[test]
    fn appends_with_next_sequential_number() {
        let list = ConfigList::default_for(PropertyKind::BuilderFloor).appended();
        assert_eq!(list.numbers(), vec![1, 2]);

        let gapped = list.appended().removed(1).expect("remove middle");
        assert_eq!(gapped.numbers(), vec![1, 3]);
        assert_eq!(gapped.appended().numbers(), vec![1, 3, 4]);
    }

    #[test]
    fn rejects_removing_last_sub_unit() {
        let list = ConfigList::default_for(PropertyKind::Apartment);
        assert_eq!(list.removed(0), Err(ConfigListError::LastSubUnit));
        assert_eq!(list.len(), 1);
        assert_eq!(
            list.removed(3),
            Err(ConfigListError::IndexOutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn field_update_leaves_siblings_untouched() {
        let list = ConfigList::Towers(vec![
            TowerConfig {
                bhk: "2BHK".to_string(),
                ..TowerConfig::numbered(1)
            },
            TowerConfig {
                bhk: "3BHK".to_string(),
                ..TowerConfig::numbered(2)
            },
        ]);
        let updated = list
            .with_field(1, "lifts", json!("4"))
            .expect("update lifts");

        let ConfigList::Towers(towers) = &updated else {
            panic!("expected towers");
        };
        assert_eq!(towers[1].lifts, Some(4));
        assert_eq!(towers[1].bhk, "3BHK");
        assert_eq!(towers[0], TowerConfig {
            bhk: "2BHK".to_string(),
            ..TowerConfig::numbered(1)
        });
        // the source list is not mutated
        assert_ne!(list, updated);
    }

    #[test]
    fn field_update_rejects_unknown_fields_and_duplicate_numbers() {
        let list = ConfigList::default_for(PropertyKind::BuilderFloor).appended();
        assert_eq!(
            list.with_field(0, "bhk", json!("2")),
            Err(ConfigListError::UnknownField("bhk".to_string()))
        );
        assert_eq!(
            list.with_field(1, "building_number", json!(1)),
            Err(ConfigListError::DuplicateNumber(1))
        );
    }

    #[test]
    fn field_update_rejects_non_positive_numbers() {
        let list = ConfigList::default_for(PropertyKind::BuilderFloor);
        for bad in [json!("abc"), json!(0), json!("0"), json!(-2), json!(null)] {
            assert!(matches!(
                list.with_field(0, "building_number", bad),
                Err(ConfigListError::InvalidValue { .. })
            ));
        }
        assert_eq!(list.numbers(), vec![1]);

        let towers = ConfigList::default_for(PropertyKind::Apartment);
        let renumbered = towers
            .with_field(0, "tower_number", json!("7"))
            .expect("positive number accepted");
        assert_eq!(renumbered.numbers(), vec![7]);
    }

    #[test]
    fn switching_kind_clears_exclusive_fields() {
        let mut record = PropertyRecord::new(PropertyKind::BuilderFloor);
        record.facing = Some(Facing::East);
        record.switch_kind(PropertyKind::Apartment);
        assert_eq!(record.facing, None);
        assert_eq!(record.configs.kind(), PropertyKind::Apartment);

        record.amenities = vec!["Pool".to_string()];
        record.price = "2 Cr".to_string();
        record.switch_kind(PropertyKind::BuilderFloor);
        assert!(record.amenities.is_empty());
        assert!(record.price.is_empty());
        assert_eq!(record.configs, ConfigList::default_for(PropertyKind::BuilderFloor));
    }

    #[test]
    fn write_payload_nulls_other_kind_fields() {
        let mut record = PropertyRecord::new(PropertyKind::BuilderFloor);
        record.name = " Sushant Lok ".to_string();
        record.facing = Some(Facing::NorthEast);
        record.price = "stale".to_string();
        let payload = record.to_write_payload(&Default::default());

        assert_eq!(payload.get("name").and_then(Value::as_str), Some("Sushant Lok"));
        assert_eq!(payload.get("facing").and_then(Value::as_str), Some("north-east"));
        assert_eq!(payload.get("price"), Some(&Value::Null));
        assert_eq!(
            payload.get("property_type").and_then(Value::as_str),
            Some("builder_floor")
        );
        assert!(payload
            .get("configurations")
            .and_then(Value::as_array)
            .is_some_and(|items| items.len() == 1));
    }
}
