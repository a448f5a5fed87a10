//! Declarative alias table for macro field names.
//!
//! Upstream analysis, generation output, and stored meal data disagree on
//! spellings for the same nutrient. The accepted spellings are data, not
//! code: each canonical field maps to an ordered list of aliases and the
//! first non-null match wins.

/// Canonical macro fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Calories,
    ProteinGrams,
    CarbsGrams,
    FatGrams,
    FiberGrams,
    ProteinPercent,
    CarbsPercent,
    FatPercent,
    FiberPercent,
}

impl Field {
    /// All canonical fields, in extraction order.
    pub const ALL: [Field; 9] = [
        Field::Calories,
        Field::ProteinGrams,
        Field::CarbsGrams,
        Field::FatGrams,
        Field::FiberGrams,
        Field::ProteinPercent,
        Field::CarbsPercent,
        Field::FatPercent,
        Field::FiberPercent,
    ];

    /// Accepted spellings for this field, in priority order.
    ///
    /// Bare nutrient names ("protein") resolve to grams, never percent;
    /// percent fields only match explicitly percent-flavored spellings.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            Field::Calories => &[
                "calories",
                "calories_kcal",
                "total_calories",
                "totalCalories",
                "kcal",
                "cal",
                "energy",
            ],
            Field::ProteinGrams => &[
                "protein_grams",
                "protein_g",
                "proteinGrams",
                "proteins",
                "protein",
            ],
            Field::CarbsGrams => &[
                "carbs_grams",
                "carbs_g",
                "carbsGrams",
                "carbohydrates_grams",
                "carbohydrates",
                "carbs",
            ],
            Field::FatGrams => &["fat_grams", "fat_g", "fatGrams", "fats", "fat"],
            Field::FiberGrams => &["fiber_grams", "fiber_g", "fiberGrams", "fibre", "fiber"],
            Field::ProteinPercent => &["protein_percent", "proteinPercent", "protein_pct"],
            Field::CarbsPercent => &[
                "carbs_percent",
                "carbsPercent",
                "carbs_pct",
                "carbohydrates_percent",
            ],
            Field::FatPercent => &["fat_percent", "fatPercent", "fat_pct"],
            Field::FiberPercent => &["fiber_percent", "fiberPercent", "fiber_pct"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn canonical_spelling_comes_first() {
        assert_eq!(Field::ProteinGrams.aliases()[0], "protein_grams");
        assert_eq!(Field::Calories.aliases()[0], "calories");
    }

    #[test]
    fn no_alias_is_shared_between_fields() {
        let mut seen = HashSet::new();
        for field in Field::ALL {
            for alias in field.aliases() {
                assert!(seen.insert(*alias), "alias {alias} appears twice");
            }
        }
    }
}
