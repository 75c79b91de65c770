//! Deterministic, URL-safe slugs for catalog entries.
//!
//! Slugs are derived once, when an entry is created, and uniqueness is
//! enforced by the store: a collision fails the create instead of being
//! resolved with a numeric suffix.

use slug::slugify;
use thiserror::Error;

/// Errors that can occur while deriving a slug.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SlugError {
    #[error("slug source text is empty")]
    EmptyInput,
    #[error("failed to derive slug from `{input}`")]
    Unrepresentable { input: String },
}

/// Derive a lowercase slug with whitespace and punctuation collapsed to `-`.
///
/// Idempotent: feeding a derived slug back in returns it unchanged.
pub fn derive_slug(input: &str) -> Result<String, SlugError> {
    if input.trim().is_empty() {
        return Err(SlugError::EmptyInput);
    }

    let candidate = slugify(input);

    if candidate.is_empty() {
        return Err(SlugError::Unrepresentable {
            input: input.to_string(),
        });
    }

    Ok(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_slug_strips_punctuation() {
        assert_eq!(derive_slug("Chill Vibes!!").expect("slug"), "chill-vibes");
        assert_eq!(derive_slug("Friday Mix").expect("slug"), "friday-mix");
    }

    #[test]
    fn derive_slug_collapses_runs() {
        assert_eq!(
            derive_slug("  Late -- Night   Drive?! ").expect("slug"),
            "late-night-drive"
        );
    }

    #[test]
    fn derive_slug_transliterates_diacritics() {
        assert_eq!(derive_slug("Żółta Łódź").expect("slug"), "zolta-lodz");
    }

    #[test]
    fn derive_slug_is_idempotent() {
        for input in ["Chill Vibes!!", "Friday Mix", "a_b c", "ŁÓDŹ 2022", "x"] {
            let once = derive_slug(input).expect("slug");
            let twice = derive_slug(&once).expect("slug");
            assert_eq!(once, twice, "input `{input}`");
        }
    }

    #[test]
    fn derive_slug_rejects_blank_and_symbol_only_input() {
        assert_eq!(derive_slug("   "), Err(SlugError::EmptyInput));
        assert_eq!(
            derive_slug("!!!"),
            Err(SlugError::Unrepresentable {
                input: "!!!".to_string()
            })
        );
    }
}
