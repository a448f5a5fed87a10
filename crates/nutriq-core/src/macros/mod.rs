//! Macro reconciliation engine.
//!
//! Pure computation, no I/O: extracts calorie/macro fields from
//! heterogeneous, partially-specified meal data, merges the sources,
//! validates the result, and recomputes whatever can be derived. A plan may
//! only be published when the engine yields a *complete* macro set;
//! anything less is reported as insufficient, never as a best-effort
//! partial result.

pub mod aliases;
pub mod estimate;
pub mod extract;
pub mod reconcile;

use serde::{Deserialize, Serialize};

use aliases::Field;

pub use estimate::{BodyMetrics, estimate_targets};
pub use reconcile::{reconcile_meals, reconcile_plan};

/// Calories per gram of protein.
pub const KCAL_PER_G_PROTEIN: f64 = 4.0;
/// Calories per gram of carbohydrate.
pub const KCAL_PER_G_CARBS: f64 = 4.0;
/// Calories per gram of fat.
pub const KCAL_PER_G_FAT: f64 = 9.0;
/// Calories per gram of fiber.
pub const KCAL_PER_G_FIBER: f64 = 2.0;

/// Default fiber when wholly unspecified: grams per 1000 kcal.
pub const DEFAULT_FIBER_G_PER_1000_KCAL: f64 = 14.0;

/// Relative tolerance for the stated-vs-derived calorie consistency check.
pub const CALORIE_TOLERANCE: f64 = 0.05;

/// Calories plus macronutrient grams and percentages.
///
/// All fields are optional during extraction and merging; after
/// reconciliation the calorie value is integral and every percent field is
/// integral (rounded to the nearest whole percent).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MacroSet {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_grams: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_percent: Option<f64>,
}

impl MacroSet {
    /// Read a field by its canonical name.
    pub fn get(&self, field: Field) -> Option<f64> {
        match field {
            Field::Calories => self.calories,
            Field::ProteinGrams => self.protein_grams,
            Field::CarbsGrams => self.carbs_grams,
            Field::FatGrams => self.fat_grams,
            Field::FiberGrams => self.fiber_grams,
            Field::ProteinPercent => self.protein_percent,
            Field::CarbsPercent => self.carbs_percent,
            Field::FatPercent => self.fat_percent,
            Field::FiberPercent => self.fiber_percent,
        }
    }

    /// Write a field by its canonical name.
    pub fn set(&mut self, field: Field, value: f64) {
        let slot = match field {
            Field::Calories => &mut self.calories,
            Field::ProteinGrams => &mut self.protein_grams,
            Field::CarbsGrams => &mut self.carbs_grams,
            Field::FatGrams => &mut self.fat_grams,
            Field::FiberGrams => &mut self.fiber_grams,
            Field::ProteinPercent => &mut self.protein_percent,
            Field::CarbsPercent => &mut self.carbs_percent,
            Field::FatPercent => &mut self.fat_percent,
            Field::FiberPercent => &mut self.fiber_percent,
        };
        *slot = Some(value);
    }

    /// Fill any absent field from `other`. Present fields always win, so
    /// direct sources take priority over indexed ones.
    pub fn fill_missing_from(&mut self, other: &MacroSet) {
        for field in Field::ALL {
            if self.get(field).is_none() {
                if let Some(value) = other.get(field) {
                    self.set(field, value);
                }
            }
        }
    }

    /// A macro set is complete iff calories and all three core
    /// macronutrient gram fields are present and positive.
    pub fn is_complete(&self) -> bool {
        self.missing_core_fields().is_empty()
    }

    /// Names of the absent (or non-positive) completeness-gate fields.
    pub fn missing_core_fields(&self) -> Vec<String> {
        let mut missing = Vec::new();
        let core = [
            ("calories", self.calories),
            ("protein_grams", self.protein_grams),
            ("carbs_grams", self.carbs_grams),
            ("fat_grams", self.fat_grams),
        ];
        for (name, value) in core {
            if !value.is_some_and(|v| v > 0.0) {
                missing.push(name.to_string());
            }
        }
        missing
    }

    /// True when no field at all carries a value.
    pub fn is_empty(&self) -> bool {
        Field::ALL.iter().all(|f| self.get(*f).is_none())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completeness_requires_all_four_core_fields() {
        let mut set = MacroSet {
            calories: Some(2000.0),
            protein_grams: Some(150.0),
            carbs_grams: Some(200.0),
            fat_grams: Some(60.0),
            ..Default::default()
        };
        assert!(set.is_complete());

        set.fat_grams = None;
        assert!(!set.is_complete());
        assert_eq!(set.missing_core_fields(), vec!["fat_grams"]);

        // Present but non-positive does not count.
        set.fat_grams = Some(0.0);
        assert!(!set.is_complete());
    }

    #[test]
    fn fill_missing_prefers_existing_values() {
        let mut direct = MacroSet {
            protein_grams: Some(20.0),
            ..Default::default()
        };
        let indexed = MacroSet {
            protein_grams: Some(99.0),
            carbs_grams: Some(30.0),
            ..Default::default()
        };
        direct.fill_missing_from(&indexed);
        assert_eq!(direct.protein_grams, Some(20.0));
        assert_eq!(direct.carbs_grams, Some(30.0));
    }

    #[test]
    fn serde_skips_absent_fields() {
        let set = MacroSet {
            calories: Some(290.0),
            ..Default::default()
        };
        assert_eq!(serde_json::to_string(&set).unwrap(), r#"{"calories":290.0}"#);
    }
}
