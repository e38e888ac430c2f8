pub mod matcher;
pub mod normalizer;
pub mod synonyms;

pub use matcher::{IngredientMatcher, MatchStrategy, MatcherConfig, ResolvedMatch};
pub use normalizer::normalize;
pub use synonyms::SynonymTable;
