//! Field extraction from raw meal JSON.
//!
//! A meal's macros may live in three places, in priority order: an inline
//! `macros` object on the meal, flat fields on the meal itself, or an
//! external per-meal index keyed `"<day>_<mealIndex>"`. Per field, the
//! first source with a non-null alias match wins.

use serde_json::{Map, Value};

use super::MacroSet;
use super::aliases::Field;

/// Key under which a meal's macros appear in the external per-meal index.
pub fn index_key(day: &str, meal_index: usize) -> String {
    format!("{day}_{meal_index}")
}

/// Coerce a JSON value to a finite number.
///
/// Accepts numbers and numeric strings, including unit-suffixed forms like
/// `"12 g"` or `"290 kcal"`. Anything else is treated as absent.
pub fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .take_while(|(i, c)| {
                    c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+'))
                })
                .map(|(i, c)| i + c.len_utf8())
                .last()?;
            s[..end].parse::<f64>().ok().filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Look up one canonical field in a JSON object via the alias table.
fn lookup(source: &Value, field: Field) -> Option<f64> {
    let obj = source.as_object()?;
    field
        .aliases()
        .iter()
        .find_map(|alias| obj.get(*alias).and_then(numeric))
}

/// Extract whatever macro fields a source object carries.
pub fn extract_from_object(source: &Value) -> MacroSet {
    let mut set = MacroSet::default();
    for field in Field::ALL {
        if let Some(value) = lookup(source, field) {
            set.set(field, value);
        }
    }
    set
}

/// Extract a meal's macro fields from all three sources.
///
/// `index` is the optional external per-meal macro index; its entry for
/// this meal (if any) is the lowest-priority source.
pub fn extract_meal_macros(
    meal: &Value,
    day: &str,
    meal_index: usize,
    index: Option<&Map<String, Value>>,
) -> MacroSet {
    // 1. Inline `macros` object.
    let mut set = meal
        .get("macros")
        .map(extract_from_object)
        .unwrap_or_default();

    // 2. Flat fields on the meal itself.
    set.fill_missing_from(&extract_from_object(meal));

    // 3. External index entry.
    if let Some(indexed) = index.and_then(|idx| idx.get(&index_key(day, meal_index))) {
        set.fill_missing_from(&extract_from_object(indexed));
    }

    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_accepts_numbers_and_numeric_strings() {
        assert_eq!(numeric(&json!(12)), Some(12.0));
        assert_eq!(numeric(&json!(12.5)), Some(12.5));
        assert_eq!(numeric(&json!("12")), Some(12.0));
        assert_eq!(numeric(&json!("12.5 g")), Some(12.5));
        assert_eq!(numeric(&json!(" 290 kcal ")), Some(290.0));
        assert_eq!(numeric(&json!("-3")), Some(-3.0));
        assert_eq!(numeric(&json!("")), None);
        assert_eq!(numeric(&json!("abc")), None);
        assert_eq!(numeric(&json!(null)), None);
        assert_eq!(numeric(&json!(true)), None);
    }

    #[test]
    fn flat_fields_resolve_through_aliases() {
        let meal = json!({"proteinGrams": 20, "carbs": "30", "fat_g": 10});
        let set = extract_meal_macros(&meal, "monday", 0, None);
        assert_eq!(set.protein_grams, Some(20.0));
        assert_eq!(set.carbs_grams, Some(30.0));
        assert_eq!(set.fat_grams, Some(10.0));
        assert_eq!(set.calories, None);
    }

    #[test]
    fn inline_macros_object_wins_over_flat_fields() {
        let meal = json!({
            "macros": {"protein_grams": 25},
            "protein_grams": 99,
            "fat_grams": 10,
        });
        let set = extract_meal_macros(&meal, "monday", 0, None);
        assert_eq!(set.protein_grams, Some(25.0));
        // Flat field still fills what the inline object lacks.
        assert_eq!(set.fat_grams, Some(10.0));
    }

    #[test]
    fn index_entry_fills_remaining_gaps_only() {
        let meal = json!({"protein_grams": 20});
        let mut index = Map::new();
        index.insert(
            "monday_1".to_string(),
            json!({"protein_grams": 50, "calories": 400}),
        );

        let set = extract_meal_macros(&meal, "monday", 1, Some(&index));
        assert_eq!(set.protein_grams, Some(20.0));
        assert_eq!(set.calories, Some(400.0));

        // A different meal index does not match.
        let set = extract_meal_macros(&meal, "monday", 0, Some(&index));
        assert_eq!(set.calories, None);
    }

    #[test]
    fn bare_nutrient_name_means_grams_not_percent() {
        let meal = json!({"protein": 30});
        let set = extract_meal_macros(&meal, "monday", 0, None);
        assert_eq!(set.protein_grams, Some(30.0));
        assert_eq!(set.protein_percent, None);
    }
}
