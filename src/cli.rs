use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about = "Generates Italian recipes matched to a carbohydrate target", long_about = None)]
pub struct Cli {
    /// Target carbohydrate amount in grams
    pub target_cho: f32,

    /// Only propose vegan recipes
    #[arg(long)]
    pub vegan: bool,

    /// Only propose vegetarian recipes
    #[arg(long)]
    pub vegetarian: bool,

    /// Only propose gluten-free recipes
    #[arg(long)]
    pub gluten_free: bool,

    /// Only propose lactose-free recipes
    #[arg(long)]
    pub lactose_free: bool,

    /// Number of recipes to present
    #[arg(long, default_value_t = 3)]
    pub required: usize,

    /// Number of candidate recipes to generate
    #[arg(long, default_value_t = 8)]
    pub candidates: usize,

    /// Path to the ingredient database CSV
    #[arg(long, default_value = "ingredients.csv")]
    pub db: String,

    /// Model identifier on OpenRouter
    #[arg(long, default_value = "qwen/qwen3-32b")]
    pub model: String,

    /// Vector index snapshot path; loaded when present, written after a fresh build
    #[arg(long)]
    pub index: Option<String>,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
