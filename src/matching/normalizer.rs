/// Canonicalizes an ingredient name for comparison: lowercase, trimmed,
/// internal whitespace runs collapsed to a single space.
///
/// Every matching tier compares normalized forms only, so two names are "the
/// same ingredient" exactly when their normalized forms are equal.
pub fn normalize(name: &str) -> String {
    name.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
