//! Cache key derivation for food descriptions

/// Normalizes a food description into a cache key
///
/// Lower-cases the text, drops every character that is neither alphanumeric
/// nor whitespace, then collapses whitespace runs to a single space and trims
/// the ends. Punctuation goes first so the result is a fixed point:
/// `normalize(&normalize(x)) == normalize(x)`.
///
/// ```
/// use foodlog::cache::normalize;
///
/// assert_eq!(normalize(" Grilled   Chicken!! "), "grilled chicken");
/// assert_eq!(normalize("Chicken, Grilled!"), "chicken grilled");
/// ```
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
