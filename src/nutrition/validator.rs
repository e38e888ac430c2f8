use crate::models::{FinalRecipeOption, UserPreferences};

/// Acceptance rules and selection size for the final recipe set.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// Maximum distance from the CHO target for a recipe to pass.
    pub tolerance_g: f32,
    /// How many recipes the final selection aims for.
    pub required: usize,
    pub min_ingredients: usize,
    pub max_single_quantity_g: f32,
    /// A single ingredient above this share of the total CHO fails the
    /// recipe. Only checked for recipes with more than two ingredients and
    /// a meaningful total.
    pub dominance_ratio: f32,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            tolerance_g: 10.0,
            required: 3,
            min_ingredients: 3,
            max_single_quantity_g: 300.0,
            dominance_ratio: 0.95,
        }
    }
}

/// Result of the final selection. A shortfall is a structured outcome the
/// caller reports to the user, not an error.
#[derive(Debug)]
pub enum SelectionOutcome {
    Complete(Vec<FinalRecipeOption>),
    Insufficient {
        selected: Vec<FinalRecipeOption>,
        required: usize,
    },
}

impl SelectionOutcome {
    pub fn recipes(&self) -> &[FinalRecipeOption] {
        match self {
            SelectionOutcome::Complete(recipes) => recipes,
            SelectionOutcome::Insufficient { selected, .. } => selected,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, SelectionOutcome::Complete(_))
    }
}

/// Why a recipe was rejected, one entry per failed rule.
pub fn validation_failures(
    recipe: &FinalRecipeOption,
    prefs: &UserPreferences,
    config: &ValidatorConfig,
) -> Vec<String> {
    let mut failures = Vec::new();

    let distance = (recipe.total_cho - prefs.target_cho).abs();
    if distance > config.tolerance_g {
        failures.push(format!(
            "total CHO {:.2}g is {:.2}g away from the {:.2}g target (tolerance {:.1}g)",
            recipe.total_cho, distance, prefs.target_cho, config.tolerance_g
        ));
    }

    if recipe.ingredients.len() < config.min_ingredients {
        failures.push(format!(
            "only {} ingredients (minimum {})",
            recipe.ingredients.len(),
            config.min_ingredients
        ));
    }

    for ing in &recipe.ingredients {
        if ing.quantity_g > config.max_single_quantity_g {
            failures.push(format!(
                "ingredient '{}' at {:.1}g exceeds the {:.0}g limit",
                ing.name, ing.quantity_g, config.max_single_quantity_g
            ));
        }
    }

    if recipe.ingredients.len() > 2 && recipe.total_cho > 1.0 {
        if let Some(top) = recipe
            .ingredients
            .iter()
            .max_by(|a, b| {
                a.cho_contribution
                    .partial_cmp(&b.cho_contribution)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        {
            let share = top.cho_contribution / recipe.total_cho;
            if share > config.dominance_ratio {
                failures.push(format!(
                    "ingredient '{}' dominates with {:.0}% of the total CHO",
                    top.name,
                    share * 100.0
                ));
            }
        }
    }

    if !recipe.flags().satisfies(prefs) {
        failures.push("dietary restrictions not met".to_string());
    }

    failures
}

/// Validates, ranks and picks the final diverse set of recipes.
///
/// Ranking is by distance from the CHO target; between two recipes at the
/// same distance the one with more ingredients comes first. Diversity then
/// greedily skips recipes that share both the leading name word and the top
/// CHO ingredient with an already picked one, backfilling from the skipped
/// remainder if the required count is not reached.
pub fn select_final(
    candidates: Vec<FinalRecipeOption>,
    prefs: &UserPreferences,
    config: &ValidatorConfig,
) -> SelectionOutcome {
    let mut valid = Vec::new();
    for recipe in candidates {
        let failures = validation_failures(&recipe, prefs, config);
        if failures.is_empty() {
            valid.push(recipe);
        } else {
            eprintln!("Recipe '{}' rejected: {}", recipe.name, failures.join("; "));
        }
    }

    rank_by_target(&mut valid, prefs.target_cho);

    let mut selected: Vec<FinalRecipeOption> = Vec::new();
    let mut skipped: Vec<FinalRecipeOption> = Vec::new();
    let mut seen: Vec<(String, String)> = Vec::new();

    for recipe in valid {
        if selected.len() == config.required {
            break;
        }
        let signature = diversity_signature(&recipe);
        if seen.contains(&signature) {
            skipped.push(recipe);
        } else {
            seen.push(signature);
            selected.push(recipe);
        }
    }
    for recipe in skipped {
        if selected.len() == config.required {
            break;
        }
        selected.push(recipe);
    }

    if selected.len() < config.required {
        SelectionOutcome::Insufficient {
            selected,
            required: config.required,
        }
    } else {
        SelectionOutcome::Complete(selected)
    }
}

fn rank_by_target(recipes: &mut [FinalRecipeOption], target_cho: f32) {
    recipes.sort_by(|a, b| {
        let da = (a.total_cho - target_cho).abs();
        let db = (b.total_cho - target_cho).abs();
        da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
    });
    // Between equally distant neighbors, prefer the recipe with more
    // ingredients.
    for i in 1..recipes.len() {
        let da = (recipes[i - 1].total_cho - target_cho).abs();
        let db = (recipes[i].total_cho - target_cho).abs();
        if (da - db).abs() < 1e-6 && recipes[i].ingredients.len() > recipes[i - 1].ingredients.len()
        {
            recipes.swap(i - 1, i);
        }
    }
}

/// Two recipes count as near-duplicates when they share the leading word of
/// the name and the ingredient carrying the most CHO.
fn diversity_signature(recipe: &FinalRecipeOption) -> (String, String) {
    let first_word = recipe
        .name
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    let top_ingredient = recipe
        .ingredients
        .iter()
        .max_by(|a, b| {
            a.cho_contribution
                .partial_cmp(&b.cho_contribution)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|i| i.name.clone())
        .unwrap_or_default();
    (first_word, top_ingredient)
}
