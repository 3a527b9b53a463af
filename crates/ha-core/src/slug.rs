//! Slug generation for object ids

/// Turn a human readable name into an object id
///
/// Lowercases, maps every run of non-alphanumeric characters to a single
/// underscore and trims underscores from both ends. An input with no usable
/// characters yields `"unnamed"` so the result is always a valid object id.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_sep = false;

    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !slug.is_empty() {
                slug.push('_');
            }
            pending_sep = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }

    if slug.is_empty() {
        "unnamed".to_string()
    } else {
        slug
    }
}
