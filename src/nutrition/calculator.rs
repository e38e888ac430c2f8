use anyhow::Result;

use crate::db::NutritionBase;
use crate::models::{
    CalculatedIngredient, DietaryFlags, FinalRecipeOption, GeneratedRecipe, NutrientTotals,
    RecipeIngredient,
};

fn round2(value: f32) -> f32 {
    (value * 100.0).round() / 100.0
}

fn contribution(quantity_g: f32, per_100g: f32) -> f32 {
    round2(quantity_g * per_100g / 100.0)
}

fn optional_contribution(quantity_g: f32, per_100g: Option<f32>) -> Option<f32> {
    per_100g.map(|v| contribution(quantity_g, v))
}

/// Resolves one authored ingredient and computes its contributions.
///
/// An unresolvable name is kept, not dropped: it contributes zero CHO,
/// unknown (`None`) for every other nutrient, and all-false dietary flags.
pub fn calculate_ingredient(
    base: &NutritionBase,
    ingredient: &RecipeIngredient,
) -> Result<CalculatedIngredient> {
    let quantity_g = ingredient.quantity_g;
    let resolved = base.resolve(&ingredient.name)?;
    let info = resolved.as_ref().and_then(|m| base.get(&m.db_name));

    Ok(match info {
        Some(info) => CalculatedIngredient {
            name: info.name.clone(),
            original_name: ingredient.name.clone(),
            quantity_g,
            cho_contribution: contribution(quantity_g, info.cho_per_100g),
            calories_contribution: optional_contribution(quantity_g, info.calories_per_100g),
            protein_contribution_g: optional_contribution(quantity_g, info.protein_per_100g),
            fat_contribution_g: optional_contribution(quantity_g, info.fat_per_100g),
            fiber_contribution_g: optional_contribution(quantity_g, info.fiber_per_100g),
            is_vegan: info.is_vegan,
            is_vegetarian: info.is_vegetarian,
            is_gluten_free: info.is_gluten_free,
            is_lactose_free: info.is_lactose_free,
            unresolved: false,
        },
        None => CalculatedIngredient {
            name: ingredient.name.clone(),
            original_name: ingredient.name.clone(),
            quantity_g,
            cho_contribution: 0.0,
            calories_contribution: None,
            protein_contribution_g: None,
            fat_contribution_g: None,
            fiber_contribution_g: None,
            is_vegan: false,
            is_vegetarian: false,
            is_gluten_free: false,
            is_lactose_free: false,
            unresolved: true,
        },
    })
}

/// Recomputes contributions after a quantity change. Names are already
/// canonical at this point, so this is a direct lookup with no matching.
pub fn recompute_contributions(base: &NutritionBase, ingredients: &mut [CalculatedIngredient]) {
    for ing in ingredients.iter_mut() {
        if ing.unresolved {
            continue;
        }
        if let Some(info) = base.get(&ing.name) {
            ing.cho_contribution = contribution(ing.quantity_g, info.cho_per_100g);
            ing.calories_contribution =
                optional_contribution(ing.quantity_g, info.calories_per_100g);
            ing.protein_contribution_g =
                optional_contribution(ing.quantity_g, info.protein_per_100g);
            ing.fat_contribution_g = optional_contribution(ing.quantity_g, info.fat_per_100g);
            ing.fiber_contribution_g = optional_contribution(ing.quantity_g, info.fiber_per_100g);
        }
    }
}

/// Sums contributions. An optional total stays `None` only when no
/// ingredient contributed a known value for that nutrient.
pub fn totals(ingredients: &[CalculatedIngredient]) -> NutrientTotals {
    let mut totals = NutrientTotals::default();
    for ing in ingredients {
        totals.cho += ing.cho_contribution;
        macro_rules! add_optional {
            ($total:ident, $contribution:ident) => {
                if let Some(value) = ing.$contribution {
                    totals.$total = Some(totals.$total.unwrap_or(0.0) + value);
                }
            };
        }
        add_optional!(calories, calories_contribution);
        add_optional!(protein_g, protein_contribution_g);
        add_optional!(fat_g, fat_contribution_g);
        add_optional!(fiber_g, fiber_contribution_g);
    }
    totals.cho = round2(totals.cho);
    totals.calories = totals.calories.map(round2);
    totals.protein_g = totals.protein_g.map(round2);
    totals.fat_g = totals.fat_g.map(round2);
    totals.fiber_g = totals.fiber_g.map(round2);
    totals
}

/// Recipe-level flags are the AND over the resolved ingredients. Any
/// unresolved ingredient, or an empty list, pins all four to false.
pub fn recipe_flags(ingredients: &[CalculatedIngredient]) -> DietaryFlags {
    if ingredients.is_empty() || ingredients.iter().any(|i| i.unresolved) {
        return DietaryFlags::none();
    }
    DietaryFlags {
        vegan: ingredients.iter().all(|i| i.is_vegan),
        vegetarian: ingredients.iter().all(|i| i.is_vegetarian),
        gluten_free: ingredients.iter().all(|i| i.is_gluten_free),
        lactose_free: ingredients.iter().all(|i| i.is_lactose_free),
    }
}

/// Turns a raw generated candidate into a fully calculated recipe.
///
/// Non-positive quantities are dropped with a diagnostic. The generator's
/// self-asserted dietary flags are replaced by the computed ones; a mismatch
/// is logged but never fails the recipe.
pub fn build_recipe_option(
    base: &NutritionBase,
    candidate: &GeneratedRecipe,
) -> Result<FinalRecipeOption> {
    let mut ingredients = Vec::with_capacity(candidate.ingredients.len());
    for raw in &candidate.ingredients {
        if raw.quantity_g <= 0.0 {
            eprintln!(
                "Warning: dropping ingredient '{}' with non-positive quantity {}g in recipe '{}'",
                raw.name, raw.quantity_g, candidate.recipe_name
            );
            continue;
        }
        let authored = RecipeIngredient {
            name: raw.name.clone(),
            quantity_g: raw.quantity_g,
        };
        ingredients.push(calculate_ingredient(base, &authored)?);
    }

    let totals = totals(&ingredients);
    let flags = recipe_flags(&ingredients);
    if flags != candidate.asserted_flags() {
        eprintln!(
            "Warning: recipe '{}' asserted dietary flags differ from computed ones; using computed values",
            candidate.recipe_name
        );
    }

    let mut recipe = FinalRecipeOption {
        name: candidate.recipe_name.clone(),
        description: candidate.description.clone(),
        ingredients,
        total_cho: totals.cho,
        total_calories: totals.calories,
        total_protein_g: totals.protein_g,
        total_fat_g: totals.fat_g,
        total_fiber_g: totals.fiber_g,
        is_vegan: false,
        is_vegetarian: false,
        is_gluten_free: false,
        is_lactose_free: false,
        instructions: candidate.instructions.clone(),
    };
    recipe.set_flags(flags);
    Ok(recipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatcherConfig, SynonymTable};
    use crate::models::{GeneratedIngredient, IngredientInfo};
    use crate::search::TextEmbedder;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    struct AxisEmbedder {
        axes: Mutex<HashMap<String, usize>>,
        dim: usize,
    }

    impl TextEmbedder for AxisEmbedder {
        fn dimension(&self) -> usize {
            self.dim
        }

        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut axes = self.axes.lock().unwrap();
            Ok(texts
                .iter()
                .map(|t| {
                    let next = axes.len();
                    let idx = *axes.entry(t.clone()).or_insert(next);
                    let mut v = vec![0.0; self.dim];
                    v[idx % self.dim] = 1.0;
                    v
                })
                .collect())
        }
    }

    fn test_base() -> NutritionBase {
        let items = vec![
            IngredientInfo {
                name: "Riso".to_string(),
                cho_per_100g: 78.0,
                calories_per_100g: Some(360.0),
                protein_per_100g: Some(7.0),
                fat_per_100g: Some(0.6),
                fiber_per_100g: Some(1.0),
                food_group: Some("Cereali".to_string()),
                is_vegan: true,
                is_vegetarian: true,
                is_gluten_free: true,
                is_lactose_free: true,
            },
            IngredientInfo {
                name: "Pomodoro".to_string(),
                cho_per_100g: 3.5,
                calories_per_100g: None,
                protein_per_100g: Some(1.0),
                fat_per_100g: None,
                fiber_per_100g: None,
                food_group: Some("Verdura".to_string()),
                is_vegan: true,
                is_vegetarian: true,
                is_gluten_free: true,
                is_lactose_free: true,
            },
            IngredientInfo {
                name: "Pollo".to_string(),
                cho_per_100g: 0.0,
                calories_per_100g: Some(110.0),
                protein_per_100g: Some(23.0),
                fat_per_100g: Some(1.5),
                fiber_per_100g: Some(0.0),
                food_group: Some("Carne".to_string()),
                is_vegan: false,
                is_vegetarian: false,
                is_gluten_free: true,
                is_lactose_free: true,
            },
        ];
        let embedder = Arc::new(AxisEmbedder {
            axes: Mutex::new(HashMap::new()),
            dim: 32,
        });
        NutritionBase::build(
            items,
            SynonymTable::empty(),
            embedder,
            MatcherConfig::default(),
            &|_| {},
        )
        .unwrap()
    }

    fn authored(name: &str, quantity_g: f32) -> RecipeIngredient {
        RecipeIngredient {
            name: name.to_string(),
            quantity_g,
        }
    }

    #[test]
    fn contributions_are_scaled_and_rounded() -> Result<()> {
        let base = test_base();
        let ing = calculate_ingredient(&base, &authored("Riso", 33.3))?;
        // 33.3 * 78.0 / 100 = 25.974 -> 25.97
        assert_eq!(ing.cho_contribution, 25.97);
        assert_eq!(ing.calories_contribution, Some(119.88));
        assert!(!ing.unresolved);
        assert_eq!(ing.name, "Riso");
        Ok(())
    }

    #[test]
    fn unknown_reference_values_stay_unknown() -> Result<()> {
        let base = test_base();
        let ing = calculate_ingredient(&base, &authored("Pomodoro", 150.0))?;
        assert_eq!(ing.cho_contribution, 5.25);
        // Missing reference data never becomes a zero.
        assert_eq!(ing.calories_contribution, None);
        assert_eq!(ing.fat_contribution_g, None);
        assert_eq!(ing.protein_contribution_g, Some(1.5));
        Ok(())
    }

    #[test]
    fn unresolved_ingredient_is_kept_with_zero_cho() -> Result<()> {
        let base = test_base();
        let ing = calculate_ingredient(&base, &authored("Polvere di unicorno", 50.0))?;
        assert!(ing.unresolved);
        assert_eq!(ing.name, "Polvere di unicorno");
        assert_eq!(ing.cho_contribution, 0.0);
        assert_eq!(ing.calories_contribution, None);
        assert!(!ing.is_vegan && !ing.is_vegetarian);
        Ok(())
    }

    #[test]
    fn totals_skip_unknowns_but_keep_known_sums() -> Result<()> {
        let base = test_base();
        let ingredients = vec![
            calculate_ingredient(&base, &authored("Riso", 100.0))?,
            calculate_ingredient(&base, &authored("Pomodoro", 100.0))?,
        ];
        let totals = totals(&ingredients);
        assert_eq!(totals.cho, 81.5);
        // Only Riso knows calories; the total is still known.
        assert_eq!(totals.calories, Some(360.0));
        assert_eq!(totals.protein_g, Some(8.0));
        // Nobody knows fat except Riso.
        assert_eq!(totals.fat_g, Some(0.6));
        Ok(())
    }

    #[test]
    fn totals_with_no_contributors_stay_none() {
        let totals = totals(&[]);
        assert_eq!(totals.cho, 0.0);
        assert_eq!(totals.calories, None);
        assert_eq!(totals.fiber_g, None);
    }

    #[test]
    fn recipe_flags_are_the_and_of_ingredients() -> Result<()> {
        let base = test_base();
        let veg = vec![
            calculate_ingredient(&base, &authored("Riso", 80.0))?,
            calculate_ingredient(&base, &authored("Pomodoro", 100.0))?,
        ];
        let flags = recipe_flags(&veg);
        assert!(flags.vegan && flags.vegetarian);

        let with_meat = vec![
            calculate_ingredient(&base, &authored("Riso", 80.0))?,
            calculate_ingredient(&base, &authored("Pollo", 120.0))?,
        ];
        let flags = recipe_flags(&with_meat);
        assert!(!flags.vegan && !flags.vegetarian);
        assert!(flags.gluten_free && flags.lactose_free);
        Ok(())
    }

    #[test]
    fn any_unresolved_ingredient_clears_all_flags() -> Result<()> {
        let base = test_base();
        let ingredients = vec![
            calculate_ingredient(&base, &authored("Riso", 80.0))?,
            calculate_ingredient(&base, &authored("Polvere di unicorno", 10.0))?,
        ];
        assert_eq!(recipe_flags(&ingredients), DietaryFlags::none());
        Ok(())
    }

    #[test]
    fn build_recipe_option_drops_non_positive_quantities() -> Result<()> {
        let base = test_base();
        let candidate = GeneratedRecipe {
            recipe_name: "Riso al pomodoro".to_string(),
            description: None,
            ingredients: vec![
                GeneratedIngredient {
                    name: "Riso".to_string(),
                    quantity_g: 80.0,
                },
                GeneratedIngredient {
                    name: "Pomodoro".to_string(),
                    quantity_g: 0.0,
                },
                GeneratedIngredient {
                    name: "Pollo".to_string(),
                    quantity_g: -5.0,
                },
            ],
            is_vegan: true,
            is_vegetarian: true,
            is_gluten_free: true,
            is_lactose_free: true,
            instructions: vec!["Cuocere il riso.".to_string()],
            error: None,
        };

        let recipe = build_recipe_option(&base, &candidate)?;
        assert_eq!(recipe.ingredients.len(), 1);
        assert_eq!(recipe.total_cho, 62.4);
        Ok(())
    }

    #[test]
    fn asserted_flags_are_replaced_by_computed_ones() -> Result<()> {
        let base = test_base();
        let candidate = GeneratedRecipe {
            recipe_name: "Pollo e riso".to_string(),
            description: None,
            ingredients: vec![
                GeneratedIngredient {
                    name: "Riso".to_string(),
                    quantity_g: 80.0,
                },
                GeneratedIngredient {
                    name: "Pollo".to_string(),
                    quantity_g: 150.0,
                },
            ],
            // The generator wrongly claims this is vegan.
            is_vegan: true,
            is_vegetarian: true,
            is_gluten_free: true,
            is_lactose_free: true,
            instructions: Vec::new(),
            error: None,
        };

        let recipe = build_recipe_option(&base, &candidate)?;
        assert!(!recipe.is_vegan);
        assert!(!recipe.is_vegetarian);
        assert!(recipe.is_gluten_free);
        Ok(())
    }

    #[test]
    fn recompute_matches_fresh_calculation() -> Result<()> {
        let base = test_base();
        let mut ingredients = vec![calculate_ingredient(&base, &authored("Riso", 80.0))?];
        ingredients[0].quantity_g = 120.0;
        recompute_contributions(&base, &mut ingredients);
        assert_eq!(ingredients[0].cho_contribution, 93.6);
        assert_eq!(ingredients[0].calories_contribution, Some(432.0));
        Ok(())
    }
}
