use serde::{Deserialize, Serialize};

/// Static reference record for one ingredient in the nutrition database.
/// Loaded once at startup and read-only afterwards. `cho_per_100g` is the only
/// mandatory nutrient; the others are `None` when the source data does not
/// carry them, which means "unknown", never zero.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct IngredientInfo {
    pub name: String,
    pub cho_per_100g: f32,
    pub calories_per_100g: Option<f32>,
    pub protein_per_100g: Option<f32>,
    pub fat_per_100g: Option<f32>,
    pub fiber_per_100g: Option<f32>,
    pub food_group: Option<String>,
    pub is_vegan: bool,
    pub is_vegetarian: bool,
    pub is_gluten_free: bool,
    pub is_lactose_free: bool,
}

/// An (ingredient, quantity) pair as authored by the candidate generator.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecipeIngredient {
    pub name: String,
    pub quantity_g: f32,
}

/// A recipe ingredient after name resolution and nutrient calculation.
///
/// When `unresolved` is true the name could not be mapped to any database
/// entry: the CHO contribution is zero, the other contributions stay unknown
/// and every dietary flag is false so the ingredient can never silently count
/// as diet-compliant.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CalculatedIngredient {
    /// Canonical database name when resolved, the original name otherwise.
    pub name: String,
    /// Name exactly as the generator wrote it.
    pub original_name: String,
    pub quantity_g: f32,
    pub cho_contribution: f32,
    pub calories_contribution: Option<f32>,
    pub protein_contribution_g: Option<f32>,
    pub fat_contribution_g: Option<f32>,
    pub fiber_contribution_g: Option<f32>,
    pub is_vegan: bool,
    pub is_vegetarian: bool,
    pub is_gluten_free: bool,
    pub is_lactose_free: bool,
    pub unresolved: bool,
}

/// Aggregate nutrient totals for a recipe. A non-CHO total is `None` only
/// when no ingredient contributed a known value for that nutrient.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct NutrientTotals {
    pub cho: f32,
    pub calories: Option<f32>,
    pub protein_g: Option<f32>,
    pub fat_g: Option<f32>,
    pub fiber_g: Option<f32>,
}

/// Recipe-level dietary conformance, always recomputed from the resolved
/// ingredients rather than trusted from the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DietaryFlags {
    pub vegan: bool,
    pub vegetarian: bool,
    pub gluten_free: bool,
    pub lactose_free: bool,
}

impl DietaryFlags {
    pub fn none() -> Self {
        Self {
            vegan: false,
            vegetarian: false,
            gluten_free: false,
            lactose_free: false,
        }
    }

    /// True when every restriction the user set is met. Unset restrictions
    /// are unconstrained.
    pub fn satisfies(&self, prefs: &UserPreferences) -> bool {
        (!prefs.vegan || self.vegan)
            && (!prefs.vegetarian || self.vegetarian)
            && (!prefs.gluten_free || self.gluten_free)
            && (!prefs.lactose_free || self.lactose_free)
    }
}

/// Per-request user input: the carbohydrate target in grams plus the dietary
/// restrictions that must hold for every returned recipe.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserPreferences {
    pub target_cho: f32,
    pub vegan: bool,
    pub vegetarian: bool,
    pub gluten_free: bool,
    pub lactose_free: bool,
}

/// A fully processed recipe, ready for ranking and presentation.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FinalRecipeOption {
    pub name: String,
    pub description: Option<String>,
    pub ingredients: Vec<CalculatedIngredient>,
    pub total_cho: f32,
    pub total_calories: Option<f32>,
    pub total_protein_g: Option<f32>,
    pub total_fat_g: Option<f32>,
    pub total_fiber_g: Option<f32>,
    pub is_vegan: bool,
    pub is_vegetarian: bool,
    pub is_gluten_free: bool,
    pub is_lactose_free: bool,
    pub instructions: Vec<String>,
}

impl FinalRecipeOption {
    pub fn flags(&self) -> DietaryFlags {
        DietaryFlags {
            vegan: self.is_vegan,
            vegetarian: self.is_vegetarian,
            gluten_free: self.is_gluten_free,
            lactose_free: self.is_lactose_free,
        }
    }

    pub fn set_flags(&mut self, flags: DietaryFlags) {
        self.is_vegan = flags.vegan;
        self.is_vegetarian = flags.vegetarian;
        self.is_gluten_free = flags.gluten_free;
        self.is_lactose_free = flags.lactose_free;
    }
}

/// One ingredient line in the generator's JSON output. Models occasionally
/// label the quantity field differently, so the common variants are accepted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneratedIngredient {
    pub name: String,
    #[serde(alias = "quantity", alias = "amount", alias = "amount_g")]
    pub quantity_g: f32,
}

/// Raw candidate recipe as produced by the generator, before any resolution
/// or validation. A record carrying only `error` means the generator gave up
/// on that slot and must be dropped, not treated as an empty recipe.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GeneratedRecipe {
    #[serde(default, alias = "name")]
    pub recipe_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<GeneratedIngredient>,
    #[serde(default)]
    pub is_vegan: bool,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub is_gluten_free: bool,
    #[serde(default)]
    pub is_lactose_free: bool,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl GeneratedRecipe {
    /// Generator signalled failure for this slot.
    pub fn is_error_only(&self) -> bool {
        self.error.is_some() && self.ingredients.is_empty()
    }

    pub fn asserted_flags(&self) -> DietaryFlags {
        DietaryFlags {
            vegan: self.is_vegan,
            vegetarian: self.is_vegetarian,
            gluten_free: self.is_gluten_free,
            lactose_free: self.is_lactose_free,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefs(vegan: bool, gluten_free: bool) -> UserPreferences {
        UserPreferences {
            target_cho: 80.0,
            vegan,
            vegetarian: false,
            gluten_free,
            lactose_free: false,
        }
    }

    #[test]
    fn unset_restrictions_are_unconstrained() {
        let flags = DietaryFlags {
            vegan: false,
            vegetarian: false,
            gluten_free: true,
            lactose_free: false,
        };
        assert!(flags.satisfies(&prefs(false, true)));
        assert!(!flags.satisfies(&prefs(true, true)));
    }

    #[test]
    fn error_only_record_detected() {
        let record: GeneratedRecipe =
            serde_json::from_str(r#"{"error": "model declined"}"#).unwrap();
        assert!(record.is_error_only());
        assert!(record.recipe_name.is_empty());
    }

    #[test]
    fn quantity_field_aliases_accepted() {
        let ing: GeneratedIngredient =
            serde_json::from_str(r#"{"name": "Riso", "quantity": 80.0}"#).unwrap();
        assert_eq!(ing.quantity_g, 80.0);
        let ing: GeneratedIngredient =
            serde_json::from_str(r#"{"name": "Riso", "amount_g": 75.5}"#).unwrap();
        assert_eq!(ing.quantity_g, 75.5);
    }
}
