use proptest::prelude::*;
use tillsync_types::slugify;

#[test]
fn slugify_basic() {
    assert_eq!(slugify("New Arrivals"), "new-arrivals");
    assert_eq!(slugify("  Hot & Cold  Drinks! "), "hot-cold-drinks");
    assert_eq!(slugify("already-a-slug"), "already-a-slug");
    assert_eq!(slugify("Café Crème"), "café-crème");
}

#[test]
fn slugify_degenerate_input() {
    assert_eq!(slugify(""), "");
    assert_eq!(slugify("---"), "");
    assert_eq!(slugify("!!"), "");
}

#[test]
fn case_and_spacing_variants_collide() {
    assert_eq!(slugify("new arrivals"), slugify("NEW   ARRIVALS"));
}

proptest! {
    /// Slugifying a slug changes nothing.
    #[test]
    fn slugify_is_idempotent(name in "[a-zA-Z0-9 _.&-]{0,40}") {
        let once = slugify(&name);
        prop_assert_eq!(slugify(&once), once);
    }

    /// No leading, trailing or doubled dashes survive.
    #[test]
    fn slug_dashes_are_normalized(name in "[a-zA-Z0-9 _.&-]{0,40}") {
        let slug = slugify(&name);
        prop_assert!(!slug.starts_with('-'));
        prop_assert!(!slug.ends_with('-'));
        prop_assert!(!slug.contains("--"));
        prop_assert!(!slug.chars().any(|c| c.is_uppercase()));
    }
}
