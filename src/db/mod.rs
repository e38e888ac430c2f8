pub mod index_builder;
pub mod loader;

pub use index_builder::NutritionBase;
pub use loader::load_ingredient_database;
