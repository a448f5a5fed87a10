//! Merging, validation, and recomputation of macro totals.
//!
//! The numeric policy matters here: calories are rounded to the nearest
//! integer before any percent derivation, and percents are rounded to whole
//! numbers, so re-running the engine on its own output is bit-identical.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use crate::error::CoordinatorError;

use super::aliases::Field;
use super::extract::extract_meal_macros;
use super::{
    CALORIE_TOLERANCE, DEFAULT_FIBER_G_PER_1000_KCAL, KCAL_PER_G_CARBS, KCAL_PER_G_FAT,
    KCAL_PER_G_FIBER, KCAL_PER_G_PROTEIN, MacroSet,
};

/// (grams field, percent field, kcal per gram) for the convertible nutrients.
const CONVERTIBLE: [(Field, Field, f64); 4] = [
    (Field::ProteinGrams, Field::ProteinPercent, KCAL_PER_G_PROTEIN),
    (Field::CarbsGrams, Field::CarbsPercent, KCAL_PER_G_CARBS),
    (Field::FatGrams, Field::FatPercent, KCAL_PER_G_FAT),
    (Field::FiberGrams, Field::FiberPercent, KCAL_PER_G_FIBER),
];

/// Derive missing gram fields from percent fields, given known calories.
fn derive_grams_from_percents(set: &mut MacroSet) {
    let Some(calories) = set.calories.filter(|c| *c > 0.0) else {
        return;
    };
    for (grams, percent, kcal_per_g) in CONVERTIBLE {
        if set.get(grams).is_none() {
            if let Some(pct) = set.get(percent) {
                set.set(grams, pct / 100.0 * calories / kcal_per_g);
            }
        }
    }
}

/// Sum extracted macros across one day's meals.
///
/// Each meal is extracted (inline object, flat fields, external index),
/// has its grams derived from percents where needed, and contributes its
/// gram/calorie fields to the running totals. Fields absent from every
/// meal stay absent in the sum.
pub fn sum_meals(meals: &[Value], day: &str, index: Option<&Map<String, Value>>) -> MacroSet {
    let mut totals = MacroSet::default();
    for (meal_index, meal) in meals.iter().enumerate() {
        let mut meal_set = extract_meal_macros(meal, day, meal_index, index);
        derive_grams_from_percents(&mut meal_set);

        for field in [
            Field::Calories,
            Field::ProteinGrams,
            Field::CarbsGrams,
            Field::FatGrams,
            Field::FiberGrams,
        ] {
            if let Some(value) = meal_set.get(field) {
                let current = totals.get(field).unwrap_or(0.0);
                totals.set(field, current + value);
            }
        }
    }
    totals
}

/// Complete and validate summed totals.
///
/// Steps, in order:
/// 1. Derive missing grams from percents when calories are known.
/// 2. Compute calories from grams when calories are missing.
/// 3. Round calories to the nearest integer.
/// 4. Replace a stated calorie value that fails the net-carb energy
///    identity beyond tolerance with the recomputed value. Absent fiber
///    counts as zero here, so the identity reduces to the plain
///    4/4/9 sum.
/// 5. Default fiber to 14 g per 1000 kcal when wholly unspecified,
///    computed from the validated calories, never from a stated value
///    step 4 rejected.
/// 6. Gate on completeness: calories plus protein/carbs/fat grams all
///    present and positive, or `IncompleteMacros`.
/// 7. Recompute every percent from grams and the rounded calories.
pub fn complete_totals(mut set: MacroSet) -> Result<MacroSet, CoordinatorError> {
    derive_grams_from_percents(&mut set);

    // Compute calories from grams when absent.
    if set.calories.is_none() {
        if let (Some(p), Some(c), Some(f)) = (set.protein_grams, set.carbs_grams, set.fat_grams) {
            set.calories =
                Some(p * KCAL_PER_G_PROTEIN + c * KCAL_PER_G_CARBS + f * KCAL_PER_G_FAT);
        }
    }

    // Rounded before any percent derivation to avoid compounding drift.
    if let Some(calories) = set.calories {
        set.calories = Some(calories.round());
    }

    // Consistency check: stated calories must agree with the net-carb
    // energy identity within tolerance, else the derived value wins.
    if let (Some(cal), Some(p), Some(c), Some(f)) =
        (set.calories, set.protein_grams, set.carbs_grams, set.fat_grams)
    {
        let fib = set.fiber_grams.unwrap_or(0.0);
        let derived = p * KCAL_PER_G_PROTEIN
            + (c - fib) * KCAL_PER_G_CARBS
            + f * KCAL_PER_G_FAT
            + fib * KCAL_PER_G_FIBER;
        if derived > 0.0 && (cal - derived).abs() > CALORIE_TOLERANCE * cal.abs() {
            set.calories = Some(derived.round());
        }
    }

    // Default fiber from the calories that survived the check.
    if set.fiber_grams.is_none() {
        if let Some(calories) = set.calories.filter(|c| *c > 0.0) {
            set.fiber_grams = Some(DEFAULT_FIBER_G_PER_1000_KCAL * calories / 1000.0);
        }
    }

    let missing = set.missing_core_fields();
    if !missing.is_empty() {
        return Err(CoordinatorError::IncompleteMacros { missing });
    }
    let calories = set.calories.expect("checked by completeness gate");

    // Percents are always recomputed from grams, never trusted as stated.
    for (grams, percent, kcal_per_g) in CONVERTIBLE {
        if let Some(g) = set.get(grams) {
            set.set(percent, (g * kcal_per_g / calories * 100.0).round());
        }
    }

    Ok(set)
}

/// Reconcile one day's meal list into a complete macro set.
pub fn reconcile_meals(
    meals: &[Value],
    day: &str,
    index: Option<&Map<String, Value>>,
) -> Result<MacroSet, CoordinatorError> {
    complete_totals(sum_meals(meals, day, index))
}

/// Reconcile a whole weekly plan (day -> meals) into a single per-day
/// macro set: daily sums are averaged field-wise across the days that
/// carry data, then completed and validated.
pub fn reconcile_plan(
    days: &BTreeMap<String, Vec<Value>>,
    index: Option<&Map<String, Value>>,
) -> Result<MacroSet, CoordinatorError> {
    let day_sums: Vec<MacroSet> = days
        .iter()
        .map(|(day, meals)| sum_meals(meals, day, index))
        .filter(|sums| !sums.is_empty())
        .collect();

    let mut averaged = MacroSet::default();
    for field in [
        Field::Calories,
        Field::ProteinGrams,
        Field::CarbsGrams,
        Field::FatGrams,
        Field::FiberGrams,
    ] {
        let values: Vec<f64> = day_sums.iter().filter_map(|s| s.get(field)).collect();
        if !values.is_empty() {
            averaged.set(field, values.iter().sum::<f64>() / values.len() as f64);
        }
    }

    complete_totals(averaged)
}
