//! Medicine drafts and stored records.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DraftError;

/// Colors offered by the add-medicine form.
pub const COLOR_PALETTE: [&str; 5] = ["#E8F5E8", "#FFE8E8", "#E8F4FF", "#FFF3E0", "#F3E5F5"];

pub const DEFAULT_COLOR: &str = COLOR_PALETTE[0];
pub const DEFAULT_FREQUENCY: u32 = 1;
pub const DEFAULT_PROGRAM_WEEKS: u32 = 4;

const DAYS_PER_WEEK: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shape {
    #[default]
    Pill,
    Capsule,
    Syrup,
    Injection,
    Tablet,
}

impl Shape {
    pub const ALL: [Shape; 5] = [
        Shape::Pill,
        Shape::Capsule,
        Shape::Syrup,
        Shape::Injection,
        Shape::Tablet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pill => "pill",
            Self::Capsule => "capsule",
            Self::Syrup => "syrup",
            Self::Injection => "injection",
            Self::Tablet => "tablet",
        }
    }
}

impl FromStr for Shape {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Shape::ALL
            .into_iter()
            .find(|shape| shape.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| s.to_string())
    }
}

/// Unpersisted medicine entered in the form or recovered from a tag.
///
/// Field order is the wire order of the tag payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineDraft {
    pub name: String,
    pub dose: String,
    #[serde(default)]
    pub shape: Shape,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    #[serde(default = "default_program_weeks")]
    pub program_duration: u32,
    #[serde(default)]
    pub times: Vec<String>,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_frequency() -> u32 {
    DEFAULT_FREQUENCY
}

fn default_program_weeks() -> u32 {
    DEFAULT_PROGRAM_WEEKS
}

impl MedicineDraft {
    /// Creates a draft with the form defaults for everything but name and dose.
    pub fn new(name: impl Into<String>, dose: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            dose: dose.into(),
            shape: Shape::default(),
            color: default_color(),
            frequency: DEFAULT_FREQUENCY,
            program_duration: DEFAULT_PROGRAM_WEEKS,
            times: Vec::new(),
        }
    }

    /// Checks the invariants that must hold before a write or save.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.name.trim().is_empty() {
            return Err(DraftError::MissingName);
        }
        if self.dose.trim().is_empty() {
            return Err(DraftError::MissingDose);
        }
        if self.frequency == 0 {
            return Err(DraftError::ZeroFrequency);
        }
        if self.program_duration == 0 {
            return Err(DraftError::ZeroDuration);
        }
        Ok(())
    }

    /// Doses needed for the whole program.
    pub fn total_quantity(&self) -> u32 {
        self.program_duration
            .saturating_mul(self.frequency)
            .saturating_mul(DAYS_PER_WEEK)
    }
}

/// A draft accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicineRecord {
    pub id: u64,
    #[serde(flatten)]
    pub draft: MedicineDraft,
    pub taken: bool,
    pub total_quantity: u32,
    pub remaining_quantity: u32,
}

impl MedicineRecord {
    pub(crate) fn from_draft(id: u64, draft: MedicineDraft) -> Self {
        let total = draft.total_quantity();
        Self {
            id,
            draft,
            taken: false,
            total_quantity: total,
            remaining_quantity: total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(MedicineDraft::new("Lexapro", "10 mg").validate().is_ok());
        assert_eq!(
            MedicineDraft::new("  ", "10 mg").validate(),
            Err(DraftError::MissingName)
        );
        assert_eq!(
            MedicineDraft::new("Lexapro", "").validate(),
            Err(DraftError::MissingDose)
        );

        let mut draft = MedicineDraft::new("Lexapro", "10 mg");
        draft.frequency = 0;
        assert_eq!(draft.validate(), Err(DraftError::ZeroFrequency));
    }

    #[test]
    fn test_quantities() {
        let mut draft = MedicineDraft::new("Gabapentin", "300 mg");
        draft.shape = Shape::Capsule;
        draft.frequency = 3;
        draft.program_duration = 8;

        let record = MedicineRecord::from_draft(2, draft);
        assert_eq!(record.total_quantity, 168);
        assert_eq!(record.remaining_quantity, 168);
        assert!(!record.taken);
    }

    #[test]
    fn test_shape_parse() {
        assert_eq!("Capsule".parse::<Shape>(), Ok(Shape::Capsule));
        assert!("gummy".parse::<Shape>().is_err());
    }

    #[test]
    fn test_draft_defaults_from_json() {
        let draft: MedicineDraft =
            serde_json::from_str(r#"{"name":"Ibuprofen","dose":"400 mg"}"#).unwrap();
        assert_eq!(draft, MedicineDraft::new("Ibuprofen", "400 mg"));
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = MedicineRecord::from_draft(1, MedicineDraft::new("Aspirin", "100 mg"));
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["name"], "Aspirin");
        assert_eq!(value["programDuration"], 4);
        assert_eq!(value["totalQuantity"], 28);
    }
}
