//! Slug derivation for settings rows identified only by name.

/// Normalizes a display name into a stable key.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `-` and trims dashes from both ends: `"New Arrivals"` becomes
/// `"new-arrivals"`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}
