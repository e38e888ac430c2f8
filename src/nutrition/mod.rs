pub mod adjuster;
pub mod calculator;
pub mod validator;

pub use adjuster::{adjust_recipe, AdjusterConfig};
pub use calculator::{build_recipe_option, recipe_flags, totals};
pub use validator::{select_final, validation_failures, SelectionOutcome, ValidatorConfig};
