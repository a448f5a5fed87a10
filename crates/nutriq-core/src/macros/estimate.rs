//! Deterministic fallback macro estimation from body metrics.
//!
//! Used when upstream analysis and generation yield no usable macros at
//! all. The path fails closed: weight, height, and age must all be present
//! and positive, otherwise the caller gets the exact list of missing
//! fields (plus instructions) instead of a guess.

use serde_json::Value;

use crate::error::CoordinatorError;

use super::extract::numeric;
use super::reconcile::complete_totals;
use super::{KCAL_PER_G_CARBS, KCAL_PER_G_FAT, KCAL_PER_G_PROTEIN, MacroSet};

/// Calorie split used for estimated targets: protein / carbs / fat.
pub const PROTEIN_CALORIE_SHARE: f64 = 0.30;
pub const CARBS_CALORIE_SHARE: f64 = 0.40;
pub const FAT_CALORIE_SHARE: f64 = 0.30;

/// Body metrics pulled from a user profile. All optional; the estimator
/// decides what it can work with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyMetrics {
    pub weight_kg: Option<f64>,
    pub height_cm: Option<f64>,
    pub age_years: Option<f64>,
    pub sex: Option<String>,
    pub activity_level: Option<String>,
}

impl BodyMetrics {
    /// Pull metrics out of a raw profile object, tolerating the usual
    /// spelling variants.
    pub fn from_profile(profile: &Value) -> Self {
        let field = |names: &[&str]| {
            let obj = profile.as_object()?;
            names.iter().find_map(|n| obj.get(*n).and_then(numeric))
        };
        let text = |names: &[&str]| {
            let obj = profile.as_object()?;
            names
                .iter()
                .find_map(|n| obj.get(*n).and_then(Value::as_str))
                .map(|s| s.to_string())
        };
        Self {
            weight_kg: field(&["weight_kg", "weightKg", "weight"]),
            height_cm: field(&["height_cm", "heightCm", "height"]),
            age_years: field(&["age_years", "age"]),
            sex: text(&["sex", "gender"]),
            activity_level: text(&["activity_level", "activityLevel", "activity"]),
        }
    }
}

/// Activity multiplier applied to the basal rate. Unknown or absent levels
/// get the lightly-active default.
fn activity_multiplier(level: Option<&str>) -> f64 {
    match level.map(|l| l.trim().to_ascii_lowercase()).as_deref() {
        Some("sedentary") => 1.2,
        Some("light") | Some("lightly_active") => 1.375,
        Some("moderate") | Some("moderately_active") => 1.55,
        Some("active") | Some("very_active") => 1.725,
        Some("athlete") | Some("extra_active") => 1.9,
        _ => 1.375,
    }
}

/// Derive target macros from body metrics.
///
/// Mifflin-St Jeor basal metabolic rate (female offset when the profile
/// says so, male offset otherwise) times the activity multiplier, split
/// 30/40/30 across protein/carbs/fat, then run through the normal
/// completion path so fiber and percents come out consistent.
pub fn estimate_targets(metrics: &BodyMetrics) -> Result<MacroSet, CoordinatorError> {
    let mut missing = Vec::new();
    let mut instructions = Vec::new();

    let required = [
        ("weight", metrics.weight_kg, "provide body weight in kilograms"),
        ("height", metrics.height_cm, "provide height in centimeters"),
        ("age", metrics.age_years, "provide age in years"),
    ];
    for (name, value, instruction) in required {
        if !value.is_some_and(|v| v > 0.0) {
            missing.push(name.to_string());
            instructions.push(instruction.to_string());
        }
    }
    if !missing.is_empty() {
        return Err(CoordinatorError::MissingPrerequisite {
            missing,
            instructions,
        });
    }

    let weight = metrics.weight_kg.expect("checked above");
    let height = metrics.height_cm.expect("checked above");
    let age = metrics.age_years.expect("checked above");

    let sex_offset = match metrics.sex.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("female") | Some("f") => -161.0,
        _ => 5.0,
    };

    let bmr = 10.0 * weight + 6.25 * height - 5.0 * age + sex_offset;
    let calories = (bmr * activity_multiplier(metrics.activity_level.as_deref())).round();

    let targets = MacroSet {
        calories: Some(calories),
        protein_grams: Some(calories * PROTEIN_CALORIE_SHARE / KCAL_PER_G_PROTEIN),
        carbs_grams: Some(calories * CARBS_CALORIE_SHARE / KCAL_PER_G_CARBS),
        fat_grams: Some(calories * FAT_CALORIE_SHARE / KCAL_PER_G_FAT),
        ..Default::default()
    };

    complete_totals(targets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_age_fails_closed_with_field_list() {
        let metrics = BodyMetrics {
            weight_kg: Some(80.0),
            height_cm: Some(180.0),
            ..Default::default()
        };
        let err = estimate_targets(&metrics).unwrap_err();
        match err {
            CoordinatorError::MissingPrerequisite {
                missing,
                instructions,
            } => {
                assert_eq!(missing, vec!["age"]);
                assert_eq!(instructions.len(), 1);
                assert!(instructions[0].contains("age"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn all_fields_missing_lists_all_three() {
        let err = estimate_targets(&BodyMetrics::default()).unwrap_err();
        assert_eq!(err.missing_fields(), ["weight", "height", "age"]);
    }

    #[test]
    fn non_positive_values_count_as_missing() {
        let metrics = BodyMetrics {
            weight_kg: Some(0.0),
            height_cm: Some(180.0),
            age_years: Some(30.0),
            ..Default::default()
        };
        let err = estimate_targets(&metrics).unwrap_err();
        assert_eq!(err.missing_fields(), ["weight"]);
    }

    #[test]
    fn estimate_produces_complete_consistent_macros() {
        let metrics = BodyMetrics {
            weight_kg: Some(80.0),
            height_cm: Some(180.0),
            age_years: Some(30.0),
            sex: Some("male".to_string()),
            activity_level: Some("moderate".to_string()),
        };
        let set = estimate_targets(&metrics).unwrap();
        assert!(set.is_complete());

        // BMR = 800 + 1125 - 150 + 5 = 1780; x1.55 = 2759.
        assert_eq!(set.calories, Some(2759.0));
        assert!(set.fiber_grams.is_some());
        assert_eq!(set.protein_percent, Some(30.0));
        assert_eq!(set.carbs_percent, Some(40.0));
        assert_eq!(set.fat_percent, Some(30.0));
    }

    #[test]
    fn female_offset_lowers_the_estimate() {
        let base = BodyMetrics {
            weight_kg: Some(70.0),
            height_cm: Some(170.0),
            age_years: Some(40.0),
            ..Default::default()
        };
        let male = estimate_targets(&base).unwrap();
        let female = estimate_targets(&BodyMetrics {
            sex: Some("female".to_string()),
            ..base
        })
        .unwrap();
        assert!(female.calories.unwrap() < male.calories.unwrap());
    }

    #[test]
    fn metrics_parse_from_profile_aliases() {
        let profile = json!({"weightKg": 82.5, "height": 179, "age": "31", "gender": "male"});
        let metrics = BodyMetrics::from_profile(&profile);
        assert_eq!(metrics.weight_kg, Some(82.5));
        assert_eq!(metrics.height_cm, Some(179.0));
        assert_eq!(metrics.age_years, Some(31.0));
        assert_eq!(metrics.sex.as_deref(), Some("male"));
    }
}
