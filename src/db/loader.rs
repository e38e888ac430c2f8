use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;

use crate::models::IngredientInfo;

// Expected column headers. Name and CHO are mandatory, the rest optional.
const NAME_COL: &str = "name";
const CHO_COL: &str = "cho_per_100g";
const CALORIES_COL: &str = "calories_per_100g";
const PROTEIN_COL: &str = "protein_per_100g";
const FAT_COL: &str = "fat_per_100g";
const FIBER_COL: &str = "fiber_per_100g";
const FOOD_GROUP_COL: &str = "food_group";
const VEGAN_COL: &str = "is_vegan";
const VEGETARIAN_COL: &str = "is_vegetarian";
const GLUTEN_FREE_COL: &str = "is_gluten_free";
const LACTOSE_FREE_COL: &str = "is_lactose_free";

fn parse_optional_f32(s: &str) -> Option<f32> {
    s.trim().parse::<f32>().ok()
}

/// Accepts the boolean spellings seen in the source sheets, Italian ones
/// included. Anything else reads as false.
fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "true" | "1" | "yes" | "sì" | "si" | "vero"
    )
}

/// Loads the ingredient reference database from a CSV file.
///
/// Rows with an empty name or an unparseable CHO value are skipped with a
/// diagnostic; a missing mandatory column or a file with no usable rows is
/// an error.
pub fn load_ingredient_database(csv_path: &Path) -> Result<Vec<IngredientInfo>> {
    if !csv_path.exists() {
        return Err(anyhow::anyhow!(
            "Ingredient CSV file not found at: {:?}",
            csv_path
        ));
    }

    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("Failed to open ingredient CSV file at {:?}", csv_path))?;
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(file);

    let headers = rdr.headers()?.clone();

    let name_idx = headers
        .iter()
        .position(|h| h == NAME_COL)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", NAME_COL))?;
    let cho_idx = headers
        .iter()
        .position(|h| h == CHO_COL)
        .ok_or_else(|| anyhow::anyhow!("Column '{}' not found", CHO_COL))?;
    let calories_idx = headers.iter().position(|h| h == CALORIES_COL);
    let protein_idx = headers.iter().position(|h| h == PROTEIN_COL);
    let fat_idx = headers.iter().position(|h| h == FAT_COL);
    let fiber_idx = headers.iter().position(|h| h == FIBER_COL);
    let food_group_idx = headers.iter().position(|h| h == FOOD_GROUP_COL);
    let vegan_idx = headers.iter().position(|h| h == VEGAN_COL);
    let vegetarian_idx = headers.iter().position(|h| h == VEGETARIAN_COL);
    let gluten_free_idx = headers.iter().position(|h| h == GLUTEN_FREE_COL);
    let lactose_free_idx = headers.iter().position(|h| h == LACTOSE_FREE_COL);

    let optional_f32 = |record: &csv::StringRecord, idx: Option<usize>| {
        idx.and_then(|i| record.get(i)).and_then(parse_optional_f32)
    };
    let flag = |record: &csv::StringRecord, idx: Option<usize>| {
        idx.and_then(|i| record.get(i)).map(parse_bool).unwrap_or(false)
    };

    let mut ingredients = Vec::new();
    for (row_index, result) in rdr.records().enumerate() {
        let record =
            result.with_context(|| format!("Failed to read record at row index {}", row_index))?;

        let name = record
            .get(name_idx)
            .ok_or_else(|| anyhow::anyhow!("Missing name at row {}", row_index))?
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }

        let cho_per_100g = match record.get(cho_idx).and_then(parse_optional_f32) {
            Some(v) => v,
            None => {
                eprintln!(
                    "Warning: skipping '{}' at row {}: unparseable '{}' value",
                    name,
                    row_index + 1,
                    CHO_COL
                );
                continue;
            }
        };

        let food_group = food_group_idx
            .and_then(|i| record.get(i))
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        ingredients.push(IngredientInfo {
            name,
            cho_per_100g,
            calories_per_100g: optional_f32(&record, calories_idx),
            protein_per_100g: optional_f32(&record, protein_idx),
            fat_per_100g: optional_f32(&record, fat_idx),
            fiber_per_100g: optional_f32(&record, fiber_idx),
            food_group,
            is_vegan: flag(&record, vegan_idx),
            is_vegetarian: flag(&record, vegetarian_idx),
            is_gluten_free: flag(&record, gluten_free_idx),
            is_lactose_free: flag(&record, lactose_free_idx),
        });
    }

    if ingredients.is_empty() {
        return Err(anyhow::anyhow!(
            "No ingredient data loaded from {:?}",
            csv_path
        ));
    }

    Ok(ingredients)
}
