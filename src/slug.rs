//! Derived slugs for author deduplication.

/// Derive the dedup slug for a display name.
///
/// Lower-cases the name, turns every run of characters outside `[a-z0-9]`
/// into a single hyphen, and trims hyphens from both ends. Names that
/// normalize to the same slug are the same author.
///
/// ```rust
/// use press_sync::slug::derive_slug;
///
/// assert_eq!(derive_slug("O'Brien & Sons"), "o-brien-sons");
/// ```
pub fn derive_slug(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_hyphen = false;

    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}
