use anyhow::{Context, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::api_connection::{
    ApiConnectionError, ChatCompletionRequest, ChatMessage, JsonSchema, JsonSchemaDefinition,
    JsonSchemaProperty, Provider, ResponseFormat, OPENROUTER_MODELS,
};
use crate::db::NutritionBase;
use crate::models::{FinalRecipeOption, GeneratedRecipe, UserPreferences};
use crate::nutrition::{
    adjust_recipe, build_recipe_option, select_final, AdjusterConfig, SelectionOutcome,
    ValidatorConfig,
};

/// Knobs for candidate generation and post-processing.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How many candidate recipes to request from the model.
    pub candidate_count: usize,
    /// Upper bound on concurrent requests.
    pub max_workers: usize,
    /// Total attempts per candidate slot.
    pub max_retries: usize,
    /// Base delay between attempts; grows linearly with the attempt number.
    pub retry_delay: Duration,
    /// Overlap share of main ingredients above which two candidates count as
    /// duplicates.
    pub dedup_overlap: f32,
    /// CHO contribution above which an ingredient counts as "main" for the
    /// duplicate check.
    pub main_ingredient_cho_g: f32,
    pub model: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            candidate_count: 8,
            max_workers: 6,
            max_retries: 2,
            retry_delay: Duration::from_secs(1),
            dedup_overlap: 0.6,
            main_ingredient_cho_g: 5.0,
            model: OPENROUTER_MODELS[0].model_name.to_string(),
        }
    }
}

/// Counters reported next to the final selection.
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub requested: usize,
    pub generated: usize,
    pub duplicates_dropped: usize,
    pub selected: usize,
    pub unresolved_ingredients: usize,
}

/// Builds the generation prompt for one candidate recipe.
fn build_prompt(prefs: &UserPreferences) -> String {
    let mut constraints = Vec::new();
    if prefs.vegan {
        constraints.push("strictly vegan (no meat, fish, dairy, eggs or honey)");
    }
    if prefs.vegetarian {
        constraints.push("vegetarian (no meat or fish)");
    }
    if prefs.gluten_free {
        constraints.push("gluten-free (no wheat, barley, rye or regular pasta and bread)");
    }
    if prefs.lactose_free {
        constraints.push("lactose-free (no milk, butter, cream or fresh cheese)");
    }
    let restrictions = if constraints.is_empty() {
        "none".to_string()
    } else {
        constraints.join("; ")
    };

    format!(
        "You are an expert of Italian home cooking helping users who count carbohydrates.\n\
         Create one complete Italian recipe whose total carbohydrate (CHO) content is as close \
         as possible to {:.0} grams.\n\
         Dietary restrictions: {}.\n\
         Rules:\n\
         - use at least 3 ingredients, each with a realistic quantity between 5 and 300 grams\n\
         - use common Italian ingredient names, one ingredient per entry\n\
         - express every quantity in grams, never in pieces or spoons\n\
         Return a single JSON object with the fields: recipe_name, description, ingredients \
         (array of objects with name and quantity_g), is_vegan, is_vegetarian, is_gluten_free, \
         is_lactose_free, instructions (array of strings).",
        prefs.target_cho, restrictions
    )
}

fn string_property(description: &str) -> JsonSchemaProperty {
    JsonSchemaProperty {
        property_type: "string".to_string(),
        description: Some(description.to_string()),
        ..JsonSchemaProperty::default()
    }
}

fn boolean_property(description: &str) -> JsonSchemaProperty {
    JsonSchemaProperty {
        property_type: "boolean".to_string(),
        description: Some(description.to_string()),
        ..JsonSchemaProperty::default()
    }
}

/// Structured-output schema the model must follow for a candidate recipe.
fn recipe_json_schema() -> JsonSchemaDefinition {
    let mut ingredient_properties = HashMap::new();
    ingredient_properties.insert(
        "name".to_string(),
        string_property("Ingredient name in Italian"),
    );
    ingredient_properties.insert(
        "quantity_g".to_string(),
        JsonSchemaProperty {
            property_type: "number".to_string(),
            description: Some("Quantity in grams".to_string()),
            ..JsonSchemaProperty::default()
        },
    );

    let mut properties = HashMap::new();
    properties.insert(
        "recipe_name".to_string(),
        string_property("Name of the recipe in Italian"),
    );
    properties.insert(
        "description".to_string(),
        string_property("One or two sentences describing the dish"),
    );
    properties.insert(
        "ingredients".to_string(),
        JsonSchemaProperty {
            property_type: "array".to_string(),
            items: Some(Box::new(JsonSchemaProperty {
                property_type: "object".to_string(),
                properties: Some(ingredient_properties),
                required: Some(vec!["name".to_string(), "quantity_g".to_string()]),
                additional_properties: Some(false),
                ..JsonSchemaProperty::default()
            })),
            ..JsonSchemaProperty::default()
        },
    );
    properties.insert(
        "is_vegan".to_string(),
        boolean_property("True when the recipe contains no animal products"),
    );
    properties.insert(
        "is_vegetarian".to_string(),
        boolean_property("True when the recipe contains no meat or fish"),
    );
    properties.insert(
        "is_gluten_free".to_string(),
        boolean_property("True when the recipe contains no gluten"),
    );
    properties.insert(
        "is_lactose_free".to_string(),
        boolean_property("True when the recipe contains no lactose"),
    );
    properties.insert(
        "instructions".to_string(),
        JsonSchemaProperty {
            property_type: "array".to_string(),
            items: Some(Box::new(string_property("One preparation step"))),
            ..JsonSchemaProperty::default()
        },
    );

    JsonSchemaDefinition {
        name: "italian_recipe".to_string(),
        strict: Some(true),
        schema: JsonSchema {
            schema_type: "object".to_string(),
            properties,
            required: vec![
                "recipe_name".to_string(),
                "description".to_string(),
                "ingredients".to_string(),
                "is_vegan".to_string(),
                "is_vegetarian".to_string(),
                "is_gluten_free".to_string(),
                "is_lactose_free".to_string(),
                "instructions".to_string(),
            ],
            additional_properties: Some(false),
        },
    }
}

/// Strips a Markdown code fence from model output, returning the inner JSON.
/// Content without a fence passes through trimmed.
pub fn extract_json(content: &str) -> &str {
    let trimmed = content.trim();
    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            return match after.find("```") {
                Some(end) => after[..end].trim(),
                None => after.trim(),
            };
        }
    }
    trimmed
}

fn preview(text: &str) -> String {
    text.chars().take(120).collect()
}

async fn request_candidate(
    provider: &Provider,
    request: ChatCompletionRequest,
) -> Result<GeneratedRecipe> {
    let response = provider.call_chat_completion(request).await?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Model response contained no choices"))?;
    let json = extract_json(&choice.message.content);
    let recipe: GeneratedRecipe = serde_json::from_str(json)
        .with_context(|| format!("Failed to parse generated recipe JSON: {}", preview(json)))?;
    Ok(recipe)
}

/// Failure classification for the retry loop. A fatal failure repeats
/// identically on every attempt, so retrying it only wastes the backoff.
enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

/// A missing key or a key the endpoint rejects outright is fatal; network
/// errors, server-side statuses and malformed recipe JSON are retryable.
fn classify_failure(err: anyhow::Error) -> AttemptError {
    match err.downcast_ref::<ApiConnectionError>() {
        Some(ApiConnectionError::MissingApiKey(_)) => AttemptError::Fatal(err),
        Some(ApiConnectionError::ApiError { status, .. })
            if matches!(status.as_u16(), 401 | 403) =>
        {
            AttemptError::Fatal(err)
        }
        _ => AttemptError::Retryable(err),
    }
}

async fn request_candidate_with_retries(
    provider: Provider,
    request: ChatCompletionRequest,
    max_retries: usize,
    retry_delay: Duration,
) -> Result<GeneratedRecipe> {
    let mut last_error = anyhow::anyhow!("no attempts were made");
    for attempt in 0..max_retries.max(1) {
        match request_candidate(&provider, request.clone()).await {
            Ok(recipe) => return Ok(recipe),
            Err(err) => match classify_failure(err) {
                AttemptError::Fatal(err) => {
                    eprintln!("Warning: candidate request failed, not retrying: {:#}", err);
                    return Err(err);
                }
                AttemptError::Retryable(err) => {
                    eprintln!(
                        "Warning: candidate request attempt {} failed: {:#}",
                        attempt + 1,
                        err
                    );
                    last_error = err;
                    if attempt + 1 < max_retries {
                        tokio::time::sleep(retry_delay * (attempt as u32 + 1)).await;
                    }
                }
            },
        }
    }
    Err(last_error)
}

/// Requests `candidate_count` recipes from the model, a bounded wave of
/// parallel workers at a time. Failed slots and error-only records are
/// dropped, so the returned list may be shorter than requested.
pub async fn generate_candidates(
    provider: &Provider,
    prefs: &UserPreferences,
    config: &PipelineConfig,
) -> Vec<GeneratedRecipe> {
    let prompt = build_prompt(prefs);
    let request = ChatCompletionRequest {
        model: config.model.clone(),
        messages: vec![ChatMessage {
            role: "user".to_string(),
            content: prompt,
        }],
        response_format: Some(ResponseFormat {
            format_type: "json_schema".to_string(),
            json_schema: Some(recipe_json_schema()),
        }),
        temperature: Some(0.9),
        max_tokens: None,
    };

    let workers = config.max_workers.min(config.candidate_count).max(1);
    println!(
        " > Requesting {} candidate recipes ({} parallel workers)...",
        config.candidate_count, workers
    );

    let mut collected = Vec::new();
    let mut remaining = config.candidate_count;
    while remaining > 0 {
        let wave = remaining.min(workers);
        let mut handles = Vec::with_capacity(wave);
        for _ in 0..wave {
            let provider = provider.clone();
            let request = request.clone();
            let max_retries = config.max_retries;
            let retry_delay = config.retry_delay;
            handles.push(tokio::spawn(async move {
                request_candidate_with_retries(provider, request, max_retries, retry_delay).await
            }));
        }
        for handle in handles {
            match handle.await {
                Ok(Ok(recipe)) => {
                    if recipe.is_error_only() {
                        eprintln!(
                            "Warning: generator reported an error for one slot: {}",
                            recipe.error.as_deref().unwrap_or("unknown")
                        );
                    } else {
                        collected.push(recipe);
                    }
                }
                Ok(Err(err)) => {
                    eprintln!("Warning: candidate slot failed after retries: {:#}", err)
                }
                Err(join_err) => eprintln!("Warning: candidate task panicked: {}", join_err),
            }
        }
        remaining -= wave;
    }
    println!(
        " > Collected {} of {} candidates.",
        collected.len(),
        config.candidate_count
    );
    collected
}

fn main_ingredients(recipe: &FinalRecipeOption, threshold_g: f32) -> HashSet<String> {
    recipe
        .ingredients
        .iter()
        .filter(|i| i.cho_contribution > threshold_g)
        .map(|i| i.name.clone())
        .collect()
}

/// Drops candidates whose main ingredients mostly overlap an earlier one.
/// Returns the survivors in order plus the number dropped.
pub fn dedup_candidates(
    candidates: Vec<FinalRecipeOption>,
    overlap_threshold: f32,
    main_threshold_g: f32,
) -> (Vec<FinalRecipeOption>, usize) {
    let mut kept: Vec<FinalRecipeOption> = Vec::new();
    let mut kept_mains: Vec<HashSet<String>> = Vec::new();
    let mut dropped = 0usize;

    for candidate in candidates {
        let mains = main_ingredients(&candidate, main_threshold_g);
        let duplicate = !mains.is_empty()
            && kept_mains.iter().any(|existing| {
                let shared = mains.intersection(existing).count();
                shared as f32 / mains.len() as f32 > overlap_threshold
            });
        if duplicate {
            eprintln!(
                "Recipe '{}' dropped as a near-duplicate of an earlier candidate",
                candidate.name
            );
            dropped += 1;
        } else {
            kept_mains.push(mains);
            kept.push(candidate);
        }
    }
    (kept, dropped)
}

/// Resolves, deduplicates, adjusts and selects from raw candidates.
///
/// Pure with respect to the network: everything here operates on already
/// collected generator output, so it is fully testable offline.
pub fn process_candidates(
    base: &NutritionBase,
    candidates: Vec<GeneratedRecipe>,
    prefs: &UserPreferences,
    config: &PipelineConfig,
    adjuster_config: &AdjusterConfig,
    validator_config: &ValidatorConfig,
) -> Result<(SelectionOutcome, PipelineStats)> {
    let generated = candidates.len();

    let mut options = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        options.push(build_recipe_option(base, candidate)?);
    }
    let unresolved_ingredients = options
        .iter()
        .flat_map(|o| o.ingredients.iter())
        .filter(|i| i.unresolved)
        .count();

    let (mut options, duplicates_dropped) =
        dedup_candidates(options, config.dedup_overlap, config.main_ingredient_cho_g);

    for option in options.iter_mut() {
        adjust_recipe(base, option, prefs.target_cho, adjuster_config);
    }

    let outcome = select_final(options, prefs, validator_config);
    let stats = PipelineStats {
        requested: config.candidate_count,
        generated,
        duplicates_dropped,
        selected: outcome.recipes().len(),
        unresolved_ingredients,
    };
    Ok((outcome, stats))
}

/// Full pipeline: generate candidates, then process them into the final
/// selection.
pub async fn run_pipeline(
    provider: &Provider,
    base: &NutritionBase,
    prefs: &UserPreferences,
    config: &PipelineConfig,
    adjuster_config: &AdjusterConfig,
    validator_config: &ValidatorConfig,
) -> Result<(SelectionOutcome, PipelineStats)> {
    let candidates = generate_candidates(provider, prefs, config).await;
    process_candidates(
        base,
        candidates,
        prefs,
        config,
        adjuster_config,
        validator_config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CalculatedIngredient;

    #[test]
    fn extract_json_strips_labelled_fence() {
        let content = "Here you go:\n```json\n{\"recipe_name\": \"Risotto\"}\n```\nEnjoy!";
        assert_eq!(extract_json(content), "{\"recipe_name\": \"Risotto\"}");
    }

    #[test]
    fn extract_json_strips_plain_fence() {
        let content = "```\n{\"a\": 1}\n```";
        assert_eq!(extract_json(content), "{\"a\": 1}");
    }

    #[test]
    fn extract_json_handles_unterminated_fence() {
        let content = "```json\n{\"a\": 1}";
        assert_eq!(extract_json(content), "{\"a\": 1}");
    }

    #[test]
    fn extract_json_passes_bare_content_through() {
        let content = "  {\"a\": 1}  ";
        assert_eq!(extract_json(content), "{\"a\": 1}");
    }

    #[test]
    fn missing_or_rejected_key_failures_are_fatal() {
        let missing: anyhow::Error =
            ApiConnectionError::MissingApiKey("SOME_KEY".to_string()).into();
        assert!(matches!(classify_failure(missing), AttemptError::Fatal(_)));

        let rejected: anyhow::Error = ApiConnectionError::ApiError {
            status: reqwest::StatusCode::UNAUTHORIZED,
            error_body: "bad key".to_string(),
        }
        .into();
        assert!(matches!(classify_failure(rejected), AttemptError::Fatal(_)));
    }

    #[test]
    fn server_and_parse_failures_are_retryable() {
        let server: anyhow::Error = ApiConnectionError::ApiError {
            status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
            error_body: "overloaded".to_string(),
        }
        .into();
        assert!(matches!(
            classify_failure(server),
            AttemptError::Retryable(_)
        ));

        let parse_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let parse: anyhow::Error = ApiConnectionError::SerializationError(parse_err).into();
        assert!(matches!(
            classify_failure(parse),
            AttemptError::Retryable(_)
        ));
    }

    #[test]
    fn prompt_lists_only_requested_restrictions() {
        let prefs = UserPreferences {
            target_cho: 80.0,
            vegan: true,
            vegetarian: false,
            gluten_free: true,
            lactose_free: false,
        };
        let prompt = build_prompt(&prefs);
        assert!(prompt.contains("80 grams"));
        assert!(prompt.contains("vegan"));
        assert!(prompt.contains("gluten-free"));
        assert!(!prompt.contains("lactose-free"));

        let none = UserPreferences {
            target_cho: 50.0,
            vegan: false,
            vegetarian: false,
            gluten_free: false,
            lactose_free: false,
        };
        assert!(build_prompt(&none).contains("Dietary restrictions: none."));
    }

    #[test]
    fn recipe_schema_nests_ingredient_objects() {
        let schema = recipe_json_schema();
        let value = serde_json::to_value(&schema).unwrap();
        assert_eq!(
            value
                .pointer("/schema/properties/ingredients/items/properties/quantity_g/type")
                .and_then(|v| v.as_str()),
            Some("number")
        );
        assert_eq!(
            value.pointer("/schema/additionalProperties"),
            Some(&serde_json::Value::Bool(false))
        );
        assert!(value
            .pointer("/schema/required")
            .and_then(|v| v.as_array())
            .map(|required| required.len() == 8)
            .unwrap_or(false));
    }

    fn calc_ing(name: &str, cho: f32) -> CalculatedIngredient {
        CalculatedIngredient {
            name: name.to_string(),
            original_name: name.to_string(),
            quantity_g: 100.0,
            cho_contribution: cho,
            calories_contribution: None,
            protein_contribution_g: None,
            fat_contribution_g: None,
            fiber_contribution_g: None,
            is_vegan: true,
            is_vegetarian: true,
            is_gluten_free: true,
            is_lactose_free: true,
            unresolved: false,
        }
    }

    fn opt(name: &str, ingredients: Vec<CalculatedIngredient>) -> FinalRecipeOption {
        let total_cho = ingredients.iter().map(|i| i.cho_contribution).sum();
        FinalRecipeOption {
            name: name.to_string(),
            description: None,
            ingredients,
            total_cho,
            total_calories: None,
            total_protein_g: None,
            total_fat_g: None,
            total_fiber_g: None,
            is_vegan: true,
            is_vegetarian: true,
            is_gluten_free: true,
            is_lactose_free: true,
            instructions: Vec::new(),
        }
    }

    #[test]
    fn near_duplicate_candidates_are_dropped_first_wins() {
        let first = opt(
            "Pasta al pomodoro",
            vec![
                calc_ing("Spaghetti", 70.0),
                calc_ing("Pomodoro", 6.0),
                calc_ing("Basilico", 0.1),
            ],
        );
        let duplicate = opt(
            "Spaghetti rossi",
            vec![
                calc_ing("Spaghetti", 68.0),
                calc_ing("Pomodoro", 7.0),
                calc_ing("Olio di oliva", 0.0),
            ],
        );
        let distinct = opt(
            "Insalata di riso",
            vec![
                calc_ing("Riso", 60.0),
                calc_ing("Piselli", 8.0),
                calc_ing("Tonno", 0.0),
            ],
        );

        let (kept, dropped) = dedup_candidates(vec![first, duplicate, distinct], 0.6, 5.0);
        assert_eq!(dropped, 1);
        let names: Vec<&str> = kept.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["Pasta al pomodoro", "Insalata di riso"]);
    }

    #[test]
    fn low_cho_ingredients_do_not_drive_deduplication() {
        // Both recipes share only garnish-level ingredients; they stay.
        let first = opt(
            "Pasta al basilico",
            vec![calc_ing("Spaghetti", 70.0), calc_ing("Basilico", 0.1)],
        );
        let second = opt(
            "Riso al basilico",
            vec![calc_ing("Riso", 60.0), calc_ing("Basilico", 0.1)],
        );
        let (kept, dropped) = dedup_candidates(vec![first, second], 0.6, 5.0);
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn all_garnish_recipe_is_never_a_duplicate() {
        let first = opt("Contorno", vec![calc_ing("Basilico", 0.1)]);
        let second = opt("Contorno bis", vec![calc_ing("Basilico", 0.2)]);
        let (kept, dropped) = dedup_candidates(vec![first, second], 0.6, 5.0);
        assert_eq!(dropped, 0);
        assert_eq!(kept.len(), 2);
    }
}
