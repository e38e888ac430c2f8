use crate::db::NutritionBase;
use crate::models::{CalculatedIngredient, FinalRecipeOption};
use crate::nutrition::calculator::{recompute_contributions, totals};

const ADJUSTED_NAME_MARKER: &str = "(Aggiustata)";
const ADJUSTED_DESCRIPTION_NOTE: &str = "Quantità aggiustate per target CHO.";

/// Tuning knobs for the quantity adjustment pass.
#[derive(Debug, Clone)]
pub struct AdjusterConfig {
    /// No adjustment when the total is already this close to the target.
    pub dead_band_g: f32,
    /// Residual gap after bulk scaling that triggers the fine-tune step.
    pub fine_tune_threshold_g: f32,
    /// Minimum CHO density for an ingredient to count as carbohydrate-rich.
    pub rich_density: f32,
    /// Minimum share of the recipe total for a rich ingredient to be scaled.
    pub rich_share: f32,
    /// Below this total the share rule is waived.
    pub low_total_g: f32,
    /// Quantity bounds for the bulk scaling step.
    pub min_quantity_g: f32,
    pub max_quantity_g: f32,
    /// Lower quantity bound for the fine-tune step.
    pub fine_tune_min_g: f32,
    /// Total-CHO change above which the recipe name gets the adjusted marker.
    pub name_marker_threshold_g: f32,
}

impl Default for AdjusterConfig {
    fn default() -> Self {
        Self {
            dead_band_g: 5.0,
            fine_tune_threshold_g: 5.0,
            rich_density: 5.0,
            rich_share: 0.05,
            low_total_g: 30.0,
            min_quantity_g: 5.0,
            max_quantity_g: 300.0,
            fine_tune_min_g: 10.0,
            name_marker_threshold_g: 1.0,
        }
    }
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Scale factor floor when reducing, by how far the total is from the target.
fn reduction_floor(gap: f32) -> f32 {
    if gap <= 30.0 {
        0.5
    } else if gap <= 60.0 {
        0.4
    } else {
        0.3
    }
}

/// Scale factor ceiling when increasing.
fn increase_ceiling(gap: f32) -> f32 {
    if gap < 30.0 {
        3.0
    } else if gap <= 60.0 {
        4.5
    } else if gap <= 100.0 {
        6.0
    } else {
        7.0
    }
}

/// Moves a recipe's total CHO toward the target by rescaling quantities.
///
/// Two phases: a bounded bulk scale of the carbohydrate-rich ingredients
/// toward the ideal factor, then a fine-tune of the top contributor if a
/// residual gap remains. Best effort: a recipe with nothing to adjust is
/// returned as is, never an error.
pub fn adjust_recipe(
    base: &NutritionBase,
    recipe: &mut FinalRecipeOption,
    target_cho: f32,
    config: &AdjusterConfig,
) {
    let original_total = recipe.total_cho;
    let diff = target_cho - original_total;
    if diff.abs() <= config.dead_band_g {
        return;
    }
    if original_total <= 0.0 {
        return;
    }

    let adjustable = select_adjustable(base, &recipe.ingredients, original_total, config);
    if adjustable.is_empty() {
        return;
    }

    // Phase one: bulk scale toward the ideal factor.
    let ideal_factor = target_cho / original_total;
    let gap = diff.abs();
    let factor = if diff < 0.0 {
        ideal_factor.max(reduction_floor(gap)).min(1.0)
    } else {
        ideal_factor.min(increase_ceiling(gap)).max(1.0)
    };

    for &idx in &adjustable {
        let scaled = round1(recipe.ingredients[idx].quantity_g * factor);
        recipe.ingredients[idx].quantity_g =
            scaled.clamp(config.min_quantity_g, config.max_quantity_g);
    }
    refresh(base, recipe);

    // Phase two: close any residual gap through the top contributor.
    let remaining_diff = target_cho - recipe.total_cho;
    if remaining_diff.abs() > config.fine_tune_threshold_g {
        if let Some(&top) = adjustable.iter().max_by(|&&a, &&b| {
            recipe.ingredients[a]
                .cho_contribution
                .partial_cmp(&recipe.ingredients[b].cho_contribution)
                .unwrap_or(std::cmp::Ordering::Equal)
        }) {
            if let Some(info) = base.get(&recipe.ingredients[top].name) {
                let gram_diff = remaining_diff / info.cho_per_100g * 100.0;
                let tuned = round1(recipe.ingredients[top].quantity_g + gram_diff);
                recipe.ingredients[top].quantity_g =
                    tuned.clamp(config.fine_tune_min_g, config.max_quantity_g);
                refresh(base, recipe);
            }
        }
    }

    if (recipe.total_cho - original_total).abs() > config.name_marker_threshold_g {
        mark_adjusted(recipe);
    }
}

/// Carbohydrate-rich ingredients worth scaling: resolved, dense in CHO,
/// actually contributing, and not a negligible share of the total (the share
/// rule is waived for small recipes). If the strict rule selects nothing,
/// any resolved ingredient above the density floor qualifies.
fn select_adjustable(
    base: &NutritionBase,
    ingredients: &[CalculatedIngredient],
    total_cho: f32,
    config: &AdjusterConfig,
) -> Vec<usize> {
    let dense = |ing: &CalculatedIngredient| {
        !ing.unresolved
            && base
                .get(&ing.name)
                .map(|info| info.cho_per_100g > config.rich_density)
                .unwrap_or(false)
    };

    let strict: Vec<usize> = ingredients
        .iter()
        .enumerate()
        .filter(|(_, ing)| {
            dense(ing)
                && ing.cho_contribution > 0.0
                && (total_cho < config.low_total_g
                    || ing.cho_contribution / total_cho > config.rich_share)
        })
        .map(|(i, _)| i)
        .collect();
    if !strict.is_empty() {
        return strict;
    }

    ingredients
        .iter()
        .enumerate()
        .filter(|(_, ing)| dense(ing))
        .map(|(i, _)| i)
        .collect()
}

fn refresh(base: &NutritionBase, recipe: &mut FinalRecipeOption) {
    recompute_contributions(base, &mut recipe.ingredients);
    let totals = totals(&recipe.ingredients);
    recipe.total_cho = totals.cho;
    recipe.total_calories = totals.calories;
    recipe.total_protein_g = totals.protein_g;
    recipe.total_fat_g = totals.fat_g;
    recipe.total_fiber_g = totals.fiber_g;
}

fn mark_adjusted(recipe: &mut FinalRecipeOption) {
    if !recipe.name.ends_with(ADJUSTED_NAME_MARKER) {
        recipe.name = format!("{} {}", recipe.name, ADJUSTED_NAME_MARKER);
    }
    if let Some(description) = &mut recipe.description {
        if !description.contains(ADJUSTED_DESCRIPTION_NOTE) {
            description.push(' ');
            description.push_str(ADJUSTED_DESCRIPTION_NOTE);
        }
    }
}
