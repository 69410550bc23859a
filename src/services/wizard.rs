use serde::Serialize;
use serde_json::Value;

use crate::{
    error::AppError,
    services::{
        asset_reconciliation::{AssetError, AssetSession, AssetSessionView, PendingFile},
        input_format::{accept_area_input, format_bhk_input, format_price_input},
        property_config::{
            parse_lenient_enum, text_from_value, ConfigList, ConfigListError, PropertyKind,
            PropertyRecord,
        },
        property_metrics::{summarize, PropertySummary},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardFlow {
    Create,
    Edit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    ChooseKind,
    BasicInfo,
    Configuration,
    Details,
    Pricing,
    Images,
    Review,
}

impl WizardStep {
    pub fn title(self) -> &'static str {
        match self {
            Self::ChooseKind => "Property type",
            Self::BasicInfo => "Basic information",
            Self::Configuration => "Configuration",
            Self::Details => "Additional details",
            Self::Pricing => "Pricing",
            Self::Images => "Images",
            Self::Review => "Review and submit",
        }
    }
}

/// Ordered steps for a flow. The create flow opens with the kind picker,
/// numbered 0, so both flows number their shared steps 1 through 5.
pub fn step_sequence(flow: WizardFlow, kind: PropertyKind) -> Vec<WizardStep> {
    let mut steps = Vec::with_capacity(6);
    if flow == WizardFlow::Create {
        steps.push(WizardStep::ChooseKind);
    }
    steps.push(WizardStep::BasicInfo);
    steps.push(WizardStep::Configuration);
    steps.push(match kind {
        PropertyKind::Apartment => WizardStep::Details,
        PropertyKind::BuilderFloor => WizardStep::Pricing,
    });
    steps.push(WizardStep::Images);
    steps.push(WizardStep::Review);
    steps
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WizardError {
    #[error("{0}")]
    StepIncomplete(String),
    #[error(transparent)]
    Config(#[from] ConfigListError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("Unknown property field '{0}'.")]
    UnknownField(String),
    #[error("'{field}' does not apply to {kind} properties.")]
    NotApplicable { field: String, kind: &'static str },
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
    #[error("'{value}' is not a valid entry for '{field}'.")]
    InputRejected { field: String, value: String },
    #[error("'{0}' is set by the brochure upload and cannot be edited directly.")]
    ReadOnlyField(String),
    #[error("The property type cannot be changed while editing.")]
    KindLocked,
    #[error("Already at the last step.")]
    AtFinalStep,
    #[error("Submit is only available from the review step.")]
    NotFinalStep,
    #[error("This property is already being saved.")]
    AlreadySaving,
}

impl From<WizardError> for AppError {
    fn from(error: WizardError) -> Self {
        match error {
            WizardError::AlreadySaving => AppError::Conflict(error.to_string()),
            other => AppError::UnprocessableEntity(other.to_string()),
        }
    }
}

/// State of one admin editing session: where the user is in the step
/// sequence, the draft record and the pending asset changes.
#[derive(Debug, Clone)]
pub struct WizardState {
    flow: WizardFlow,
    kind_chosen: bool,
    position: usize,
    record: PropertyRecord,
    assets: AssetSession,
    saving: bool,
}

impl WizardState {
    pub fn for_create() -> Self {
        Self {
            flow: WizardFlow::Create,
            kind_chosen: false,
            position: 0,
            record: PropertyRecord::new(PropertyKind::Apartment),
            assets: AssetSession::default(),
            saving: false,
        }
    }

    pub fn for_edit(record: PropertyRecord) -> Self {
        let assets = AssetSession::from_existing(
            record.cover_image_url.clone(),
            record.gallery_image_urls.clone(),
            record.brochure_url.clone(),
        );
        Self {
            flow: WizardFlow::Edit,
            kind_chosen: true,
            position: 0,
            record,
            assets,
            saving: false,
        }
    }

    pub fn flow(&self) -> WizardFlow {
        self.flow
    }

    pub fn record(&self) -> &PropertyRecord {
        &self.record
    }

    pub fn assets(&self) -> &AssetSession {
        &self.assets
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn steps(&self) -> Vec<WizardStep> {
        step_sequence(self.flow, self.record.kind)
    }

    pub fn current_step(&self) -> WizardStep {
        let steps = self.steps();
        steps[self.position.min(steps.len() - 1)]
    }

    pub fn step_number(&self, step: WizardStep) -> Option<usize> {
        let offset = match self.flow {
            WizardFlow::Create => 0,
            WizardFlow::Edit => 1,
        };
        self.steps()
            .iter()
            .position(|candidate| *candidate == step)
            .map(|index| index + offset)
    }

    fn is_final_step(&self) -> bool {
        self.position + 1 >= self.steps().len()
    }

    pub fn validate_step(&self, step: WizardStep) -> Result<(), WizardError> {
        match step {
            WizardStep::ChooseKind | WizardStep::BasicInfo if !self.kind_chosen => Err(
                WizardError::StepIncomplete("Choose a property type first.".to_string()),
            ),
            WizardStep::BasicInfo => {
                if self.record.name.trim().is_empty() {
                    return Err(WizardError::StepIncomplete(
                        "Property name is required.".to_string(),
                    ));
                }
                if self.record.location.trim().is_empty() {
                    return Err(WizardError::StepIncomplete(
                        "Location is required.".to_string(),
                    ));
                }
                Ok(())
            }
            WizardStep::Images
                if self.flow == WizardFlow::Create && !self.assets.cover.is_present() =>
            {
                Err(WizardError::StepIncomplete(
                    "A cover image is required.".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn next(&mut self) -> Result<WizardStep, WizardError> {
        self.validate_step(self.current_step())?;
        if self.is_final_step() {
            return Err(WizardError::AtFinalStep);
        }
        self.position += 1;
        Ok(self.current_step())
    }

    /// Moves back one step without validating. A no-op on the first step.
    pub fn prev(&mut self) -> WizardStep {
        self.position = self.position.saturating_sub(1);
        self.current_step()
    }

    pub fn set_kind(&mut self, kind: PropertyKind) -> Result<(), WizardError> {
        if self.flow == WizardFlow::Edit && kind != self.record.kind {
            return Err(WizardError::KindLocked);
        }
        if kind != self.record.kind {
            self.record.switch_kind(kind);
            self.assets.building_brochures.clear();
        }
        self.kind_chosen = true;
        Ok(())
    }

    /// Updates one top-level draft field. Free-text price and area input go
    /// through the same formatting and keystroke gates as the form.
    pub fn update_field(&mut self, field: &str, value: &Value) -> Result<(), WizardError> {
        let kind = self.record.kind;
        match field {
            "name" => self.record.name = raw_text(value),
            "location" => self.record.location = raw_text(value),
            "description" => self.record.description = raw_text(value),
            "status" => self.record.status = raw_text(value),
            "developer" => {
                self.record.developer = Some(raw_text(value)).filter(|name| !name.trim().is_empty())
            }
            "price" => {
                self.require_kind(field, PropertyKind::Apartment)?;
                self.record.price = format_price_input(&raw_text(value));
            }
            "total_area" => {
                self.require_kind(field, PropertyKind::Apartment)?;
                let raw = raw_text(value);
                if !accept_area_input(&raw) {
                    return Err(WizardError::InputRejected {
                        field: field.to_string(),
                        value: raw,
                    });
                }
                self.record.total_area = raw;
            }
            "amenities" => {
                self.require_kind(field, PropertyKind::Apartment)?;
                self.record.amenities = amenity_list(value);
            }
            "facing" => {
                self.require_kind(field, PropertyKind::BuilderFloor)?;
                let raw = text_from_value(value);
                self.record.facing = if raw.is_empty() {
                    None
                } else {
                    Some(parse_lenient_enum(&raw).ok_or_else(|| WizardError::InvalidValue {
                        field: field.to_string(),
                        message: format!("'{raw}' is not a compass direction"),
                    })?)
                };
            }
            "slug" | "cover_image_url" | "gallery_image_urls" | "brochure_url" => {
                return Err(WizardError::ReadOnlyField(field.to_string()));
            }
            _ => return Err(WizardError::UnknownField(field.to_string())),
        }
        tracing::debug!(field, kind = kind.as_str(), "Draft field updated");
        Ok(())
    }

    fn require_kind(&self, field: &str, kind: PropertyKind) -> Result<(), WizardError> {
        if self.record.kind == kind {
            return Ok(());
        }
        Err(WizardError::NotApplicable {
            field: field.to_string(),
            kind: self.record.kind.as_str(),
        })
    }

    /// Appends a default sub-unit and returns its number.
    pub fn append_sub_unit(&mut self) -> u32 {
        self.record.configs = self.record.configs.appended();
        self.record.configs.next_number() - 1
    }

    pub fn remove_sub_unit(&mut self, index: usize) -> Result<(), WizardError> {
        let number = self.record.configs.number_at(index);
        self.record.configs = self.record.configs.removed(index)?;
        if let Some(number) = number {
            self.assets.building_brochures.remove(&number);
        }
        Ok(())
    }

    pub fn update_sub_unit(
        &mut self,
        index: usize,
        field: &str,
        value: &Value,
    ) -> Result<(), WizardError> {
        let value = match (&self.record.configs, field) {
            (_, "brochure_url") => return Err(WizardError::ReadOnlyField(field.to_string())),
            (ConfigList::Towers(_), "bhk") => Value::String(format_bhk_input(&raw_text(value))),
            (ConfigList::Towers(_), "area_sqft") => {
                let raw = raw_text(value);
                if !accept_area_input(&raw) {
                    return Err(WizardError::InputRejected {
                        field: field.to_string(),
                        value: raw,
                    });
                }
                Value::String(raw)
            }
            _ => value.clone(),
        };

        let previous_number = self.record.configs.number_at(index);
        self.record.configs = self.record.configs.with_field(index, field, value)?;

        // a staged brochure follows its building when the number changes
        let current_number = self.record.configs.number_at(index);
        if let (Some(previous), Some(current)) = (previous_number, current_number) {
            if previous != current {
                if let Some(file) = self.assets.building_brochures.remove(&previous) {
                    self.assets.building_brochures.insert(current, file);
                }
            }
        }
        Ok(())
    }

    pub fn stage_cover(&mut self, file: PendingFile) -> Result<(), WizardError> {
        Ok(self.assets.stage_cover(file)?)
    }

    pub fn stage_gallery_image(&mut self, file: PendingFile) -> Result<(), WizardError> {
        Ok(self.assets.stage_gallery(file)?)
    }

    pub fn unstage_gallery_image(&mut self, index: usize) -> Result<(), WizardError> {
        self.assets.gallery.unstage(index)?;
        Ok(())
    }

    pub fn remove_gallery_image(&mut self, url: &str) -> Result<(), WizardError> {
        Ok(self.assets.gallery.mark_removed(url)?)
    }

    pub fn stage_brochure(&mut self, file: PendingFile) -> Result<(), WizardError> {
        Ok(self.assets.stage_brochure(file)?)
    }

    pub fn stage_building_brochure(
        &mut self,
        index: usize,
        file: PendingFile,
    ) -> Result<(), WizardError> {
        self.require_kind("brochure", PropertyKind::BuilderFloor)?;
        let len = self.record.configs.len();
        let number = self
            .record
            .configs
            .number_at(index)
            .ok_or(ConfigListError::IndexOutOfRange { index, len })?;
        Ok(self.assets.stage_building_brochure(number, file)?)
    }

    /// Marks the session as saving and hands out the draft to submit. Every
    /// step gate is re-checked so a draft can never skip the cover image.
    pub fn begin_submit(&mut self) -> Result<(PropertyRecord, AssetSession), WizardError> {
        if self.saving {
            return Err(WizardError::AlreadySaving);
        }
        if !self.is_final_step() {
            return Err(WizardError::NotFinalStep);
        }
        for step in self.steps() {
            self.validate_step(step)?;
        }
        self.saving = true;
        Ok((self.record.clone(), self.assets.clone()))
    }

    pub fn finish_submit(&mut self) {
        self.saving = false;
    }

    pub fn view(&self) -> WizardView {
        let steps = self
            .steps()
            .into_iter()
            .map(|step| StepView {
                step,
                title: step.title(),
                number: self.step_number(step).unwrap_or_default(),
                complete: self.validate_step(step).is_ok(),
            })
            .collect::<Vec<_>>();
        let current = self.current_step();
        WizardView {
            flow: self.flow,
            kind_chosen: self.kind_chosen,
            step: current,
            step_number: self.step_number(current).unwrap_or_default(),
            total_steps: 5,
            steps,
            can_submit: self.is_final_step() && !self.saving,
            saving: self.saving,
            draft: self.record.clone(),
            assets: self.assets.view(),
            summary: summarize(&self.record),
        }
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => text_from_value(other),
    }
}

fn amenity_list(value: &Value) -> Vec<String> {
    let items = match value {
        Value::Array(items) => items.iter().map(text_from_value).collect::<Vec<_>>(),
        Value::String(text) => text.split(',').map(|item| item.trim().to_string()).collect(),
        _ => Vec::new(),
    };
    let mut amenities: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !amenities.contains(&item) {
            amenities.push(item);
        }
    }
    amenities
}

#[derive(Debug, Clone, Serialize)]
pub struct StepView {
    pub step: WizardStep,
    pub title: &'static str,
    pub number: usize,
    pub complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WizardView {
    pub flow: WizardFlow,
    pub kind_chosen: bool,
    pub step: WizardStep,
    pub step_number: usize,
    pub total_steps: usize,
    pub steps: Vec<StepView>,
    pub can_submit: bool,
    pub saving: bool,
    pub draft: PropertyRecord,
    pub assets: AssetSessionView,
    pub summary: PropertySummary,
}

#[cfg(test)]
mod tests {
    use super::{step_sequence, WizardError, WizardFlow, WizardState, WizardStep};
    use crate::services::{
        asset_reconciliation::pending,
        property_config::{
            ConfigList, ConfigListError, Facing, PropertyKind, PropertyRecord, TowerConfig,
        },
    };
    use serde_json::json;

    fn apartment_draft() -> WizardState {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::Apartment).expect("kind");
        wizard.update_field("name", &json!("Godrej Sora")).expect("name");
        wizard.update_field("location", &json!("Sector 53")).expect("location");
        wizard
    }

    fn walk_to(wizard: &mut WizardState, step: WizardStep) {
        while wizard.current_step() != step {
            wizard.next().expect("step advances");
        }
    }

    #[test]
    fn numbers_steps_per_flow() {
        let create = WizardState::for_create();
        assert_eq!(create.current_step(), WizardStep::ChooseKind);
        assert_eq!(create.step_number(WizardStep::ChooseKind), Some(0));
        assert_eq!(create.step_number(WizardStep::Review), Some(5));

        let edit = WizardState::for_edit(PropertyRecord::new(PropertyKind::BuilderFloor));
        assert_eq!(edit.current_step(), WizardStep::BasicInfo);
        assert_eq!(edit.step_number(WizardStep::BasicInfo), Some(1));
        assert_eq!(edit.step_number(WizardStep::Pricing), Some(3));
        assert_eq!(edit.step_number(WizardStep::ChooseKind), None);

        assert_eq!(
            step_sequence(WizardFlow::Edit, PropertyKind::Apartment),
            vec![
                WizardStep::BasicInfo,
                WizardStep::Configuration,
                WizardStep::Details,
                WizardStep::Images,
                WizardStep::Review,
            ]
        );
    }

    #[test]
    fn kind_must_be_chosen_before_advancing() {
        let mut wizard = WizardState::for_create();
        assert!(matches!(wizard.next(), Err(WizardError::StepIncomplete(_))));
        wizard.set_kind(PropertyKind::BuilderFloor).expect("kind");
        assert_eq!(wizard.next(), Ok(WizardStep::BasicInfo));
    }

    #[test]
    fn basic_info_requires_name_and_location() {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::Apartment).expect("kind");
        wizard.next().expect("leave kind picker");

        assert!(wizard.validate_step(WizardStep::BasicInfo).is_err());
        wizard.update_field("name", &json!("Godrej Sora")).expect("name");
        assert!(wizard.validate_step(WizardStep::BasicInfo).is_err());
        wizard.update_field("location", &json!("  ")).expect("location");
        assert!(wizard.next().is_err());
        assert_eq!(wizard.current_step(), WizardStep::BasicInfo);

        wizard.update_field("location", &json!("Sector 53")).expect("location");
        assert_eq!(wizard.next(), Ok(WizardStep::Configuration));
    }

    #[test]
    fn images_step_requires_cover_on_create() {
        let mut wizard = apartment_draft();
        walk_to(&mut wizard, WizardStep::Images);
        assert!(matches!(wizard.next(), Err(WizardError::StepIncomplete(_))));

        wizard
            .stage_cover(pending("cover.jpg", "image/jpeg", 8))
            .expect("cover staged");
        assert_eq!(wizard.next(), Ok(WizardStep::Review));
        assert_eq!(wizard.next(), Err(WizardError::AtFinalStep));

        let mut record = PropertyRecord::new(PropertyKind::Apartment);
        record.name = "Old".to_string();
        record.location = "Gurgaon".to_string();
        let mut edit = WizardState::for_edit(record);
        walk_to(&mut edit, WizardStep::Review);
    }

    #[test]
    fn prev_never_validates_and_stops_at_first_step() {
        let mut wizard = apartment_draft();
        walk_to(&mut wizard, WizardStep::Configuration);
        wizard.update_field("name", &json!("")).expect("clear name");
        assert_eq!(wizard.prev(), WizardStep::BasicInfo);
        assert_eq!(wizard.prev(), WizardStep::ChooseKind);
        assert_eq!(wizard.prev(), WizardStep::ChooseKind);
    }

    #[test]
    fn kind_switch_clears_stale_fields() {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::BuilderFloor).expect("kind");
        wizard.update_field("facing", &json!("North East")).expect("facing");
        assert_eq!(wizard.record().facing, Some(Facing::NorthEast));
        wizard
            .stage_building_brochure(0, pending("b1.pdf", "application/pdf", 4))
            .expect("brochure staged");

        wizard.set_kind(PropertyKind::Apartment).expect("switch");
        assert_eq!(wizard.record().facing, None);
        assert!(wizard.assets().building_brochures.is_empty());
        assert_eq!(
            wizard.update_field("facing", &json!("east")),
            Err(WizardError::NotApplicable {
                field: "facing".to_string(),
                kind: "apartment",
            })
        );
    }

    #[test]
    fn edit_flow_locks_kind() {
        let mut wizard = WizardState::for_edit(PropertyRecord::new(PropertyKind::Apartment));
        assert_eq!(
            wizard.set_kind(PropertyKind::BuilderFloor),
            Err(WizardError::KindLocked)
        );
        assert!(wizard.set_kind(PropertyKind::Apartment).is_ok());
    }

    #[test]
    fn formats_price_and_gates_area_input() {
        let mut wizard = apartment_draft();
        wizard.update_field("price", &json!("2.5")).expect("price");
        assert_eq!(wizard.record().price, "2.5 Cr");
        wizard.update_field("price", &json!("2.")).expect("partial price");
        assert_eq!(wizard.record().price, "2.");

        wizard.update_field("total_area", &json!("12.5")).expect("area");
        assert!(matches!(
            wizard.update_field("total_area", &json!("12a")),
            Err(WizardError::InputRejected { .. })
        ));
        assert_eq!(wizard.record().total_area, "12.5");

        wizard
            .update_field("amenities", &json!("Pool, Gym, Pool"))
            .expect("amenities");
        assert_eq!(wizard.record().amenities, vec!["Pool", "Gym"]);
        assert!(matches!(
            wizard.update_field("cover_image_url", &json!("x")),
            Err(WizardError::ReadOnlyField(_))
        ));
    }

    #[test]
    fn sub_unit_updates_format_bhk_and_reject_bad_area() {
        let mut wizard = apartment_draft();
        assert_eq!(wizard.append_sub_unit(), 2);
        wizard.update_sub_unit(1, "bhk", &json!("2, 3")).expect("bhk");
        assert!(matches!(
            wizard.update_sub_unit(1, "area_sqft", &json!("12x")),
            Err(WizardError::InputRejected { .. })
        ));
        wizard.update_sub_unit(1, "area_sqft", &json!("1200-1500")).expect("area");

        assert_eq!(
            wizard.record().configs,
            ConfigList::Towers(vec![
                TowerConfig::numbered(1),
                TowerConfig {
                    bhk: "2BHK, 3BHK".to_string(),
                    area_sqft: "1200-1500".to_string(),
                    ..TowerConfig::numbered(2)
                },
            ])
        );
        assert_eq!(
            wizard.view().summary.bhk_labels,
            vec!["2BHK".to_string(), "3BHK".to_string()]
        );
    }

    #[test]
    fn sub_unit_numbers_must_stay_positive() {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::BuilderFloor).expect("kind");
        for bad in [json!("abc"), json!(0)] {
            assert!(matches!(
                wizard.update_sub_unit(0, "building_number", &bad),
                Err(WizardError::Config(ConfigListError::InvalidValue { .. }))
            ));
        }
        assert_eq!(wizard.record().configs.numbers(), vec![1]);
    }

    #[test]
    fn removing_a_building_drops_its_staged_brochure() {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::BuilderFloor).expect("kind");
        wizard.append_sub_unit();
        wizard
            .stage_building_brochure(1, pending("b2.pdf", "application/pdf", 4))
            .expect("brochure staged");
        assert!(wizard.assets().building_brochures.contains_key(&2));

        wizard.remove_sub_unit(1).expect("remove");
        assert!(wizard.assets().building_brochures.is_empty());
        assert_eq!(
            wizard.remove_sub_unit(0),
            Err(WizardError::Config(ConfigListError::LastSubUnit))
        );
        assert_eq!(wizard.record().configs.len(), 1);
    }

    #[test]
    fn renumbering_a_building_moves_its_brochure() {
        let mut wizard = WizardState::for_create();
        wizard.set_kind(PropertyKind::BuilderFloor).expect("kind");
        wizard
            .stage_building_brochure(0, pending("b1.pdf", "application/pdf", 4))
            .expect("brochure staged");
        wizard
            .update_sub_unit(0, "building_number", &json!(7))
            .expect("renumber");
        assert!(wizard.assets().building_brochures.contains_key(&7));
        assert!(matches!(
            wizard.update_sub_unit(0, "brochure_url", &json!("x")),
            Err(WizardError::ReadOnlyField(_))
        ));
    }

    #[test]
    fn submit_is_guarded() {
        let mut wizard = apartment_draft();
        assert_eq!(wizard.begin_submit().err(), Some(WizardError::NotFinalStep));

        wizard
            .stage_cover(pending("cover.jpg", "image/jpeg", 8))
            .expect("cover staged");
        walk_to(&mut wizard, WizardStep::Review);
        let (record, assets) = wizard.begin_submit().expect("first submit");
        assert_eq!(record.name, "Godrej Sora");
        assert_eq!(assets.pending_upload_count(), 1);
        assert!(!wizard.view().can_submit);
        assert_eq!(wizard.begin_submit().err(), Some(WizardError::AlreadySaving));

        wizard.finish_submit();
        assert!(wizard.begin_submit().is_ok());
    }
}
