use anyhow::{Context, Result};
use recipe_gen::api_connection::Provider;
use recipe_gen::cli::parse_args;
use recipe_gen::db::{load_ingredient_database, NutritionBase};
use recipe_gen::matching::{MatcherConfig, SynonymTable};
use recipe_gen::models::{FinalRecipeOption, UserPreferences};
use recipe_gen::nutrition::{AdjusterConfig, SelectionOutcome, ValidatorConfig};
use recipe_gen::pipeline::{run_pipeline, PipelineConfig, PipelineStats};
use recipe_gen::search::{EmbeddingEngine, TextEmbedder};
use std::path::Path;
use std::sync::Arc;

const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = parse_args();
    if cli.target_cho <= 0.0 {
        anyhow::bail!("Target CHO must be positive, got {}", cli.target_cho);
    }
    let prefs = UserPreferences {
        target_cho: cli.target_cho,
        vegan: cli.vegan,
        vegetarian: cli.vegetarian,
        gluten_free: cli.gluten_free,
        lactose_free: cli.lactose_free,
    };

    println!("Loading ingredient database from '{}'...", cli.db);
    let items = load_ingredient_database(Path::new(&cli.db))
        .with_context(|| format!("Failed to load ingredient database from '{}'", cli.db))?;
    println!(" > Loaded {} ingredients.", items.len());

    println!("Initializing embedding model (this may take a moment)...");
    let embedder: Arc<dyn TextEmbedder> =
        Arc::new(EmbeddingEngine::new().context("Failed to initialize the embedding model")?);

    let progress = |message: String| println!("{}", message);
    let synonyms = SynonymTable::default_italian();
    let matcher_config = MatcherConfig::default();

    let base = match cli.index.as_deref().map(Path::new) {
        Some(snapshot) if snapshot.exists() => {
            println!("Loading vector index snapshot from '{}'...", snapshot.display());
            NutritionBase::load(
                items,
                synonyms,
                Arc::clone(&embedder),
                matcher_config,
                snapshot,
                &progress,
            )?
        }
        maybe_snapshot => {
            let base = NutritionBase::build(
                items,
                synonyms,
                Arc::clone(&embedder),
                matcher_config,
                &progress,
            )?;
            if let Some(snapshot) = maybe_snapshot {
                base.save_index(snapshot).with_context(|| {
                    format!(
                        "Failed to write vector index snapshot to '{}'",
                        snapshot.display()
                    )
                })?;
                println!(" > Saved vector index snapshot to '{}'.", snapshot.display());
            }
            base
        }
    };

    let provider = Provider::openrouter(API_KEY_ENV_VAR);
    let known_models = provider.get_available_models();
    if !known_models.iter().any(|m| m.model_name == cli.model) {
        eprintln!(
            "Warning: model '{}' is not in the known model list; trying it anyway.",
            cli.model
        );
    }

    let pipeline_config = PipelineConfig {
        candidate_count: cli.candidates.max(1),
        model: cli.model.clone(),
        ..PipelineConfig::default()
    };
    let validator_config = ValidatorConfig {
        required: cli.required.max(1),
        ..ValidatorConfig::default()
    };
    let adjuster_config = AdjusterConfig::default();

    let (outcome, stats) = run_pipeline(
        &provider,
        &base,
        &prefs,
        &pipeline_config,
        &adjuster_config,
        &validator_config,
    )
    .await?;

    render_outcome(&outcome, &stats, &prefs);
    Ok(())
}

fn render_outcome(outcome: &SelectionOutcome, stats: &PipelineStats, prefs: &UserPreferences) {
    match outcome {
        SelectionOutcome::Complete(recipes) => {
            println!("\nFound {} recipes for your target:", recipes.len());
            for (idx, recipe) in recipes.iter().enumerate() {
                render_recipe(idx, recipe);
            }
        }
        SelectionOutcome::Insufficient { selected, required } => {
            if selected.is_empty() {
                println!(
                    "\nNo generated recipe satisfied the target of {:.0} g CHO with the given restrictions.",
                    prefs.target_cho
                );
                println!("Try again, relax the restrictions, or raise the candidate count.");
            } else {
                println!(
                    "\nOnly {} of the {} requested recipes passed validation:",
                    selected.len(),
                    required
                );
                for (idx, recipe) in selected.iter().enumerate() {
                    render_recipe(idx, recipe);
                }
            }
        }
    }

    println!(
        "\nGenerated {} of {} requested candidates; {} dropped as duplicates, {} ingredients not found in the database.",
        stats.generated, stats.requested, stats.duplicates_dropped, stats.unresolved_ingredients
    );
}

fn render_recipe(index: usize, recipe: &FinalRecipeOption) {
    println!("\n--- Recipe {}: {} ---", index + 1, recipe.name);
    if let Some(description) = &recipe.description {
        println!("{}", description);
    }
    println!("Ingredients:");
    for ingredient in &recipe.ingredients {
        let note = if ingredient.unresolved {
            " [not in database]"
        } else {
            ""
        };
        println!(
            "  - {:.0} g {} ({:.1} g CHO){}",
            ingredient.quantity_g, ingredient.name, ingredient.cho_contribution, note
        );
    }
    println!("Total CHO: {:.1} g", recipe.total_cho);
    if let Some(calories) = recipe.total_calories {
        println!("Calories: {:.0} kcal", calories);
    }
    if let Some(protein) = recipe.total_protein_g {
        println!("Protein: {:.1} g", protein);
    }
    if let Some(fat) = recipe.total_fat_g {
        println!("Fat: {:.1} g", fat);
    }
    if let Some(fiber) = recipe.total_fiber_g {
        println!("Fiber: {:.1} g", fiber);
    }
    let mut tags = Vec::new();
    if recipe.is_vegan {
        tags.push("vegan");
    }
    if recipe.is_vegetarian {
        tags.push("vegetarian");
    }
    if recipe.is_gluten_free {
        tags.push("gluten-free");
    }
    if recipe.is_lactose_free {
        tags.push("lactose-free");
    }
    if !tags.is_empty() {
        println!("Dietary: {}", tags.join(", "));
    }
    if !recipe.instructions.is_empty() {
        println!("Preparation:");
        for (step, text) in recipe.instructions.iter().enumerate() {
            println!("  {}. {}", step + 1, text);
        }
    }
}
