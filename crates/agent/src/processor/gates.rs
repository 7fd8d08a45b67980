//! Programmatic gates that override whatever the LLM returned (§4.2 step 8).
//! These never ask the model anything; they're plain data checks run after
//! parsing, the same "policy lives in code, not in the prompt" split the
//! eligibility check in `recruiting_common::models::candidate` already
//! draws for age/citizenship.

use recruiting_common::prompt_library::normalize_city;

/// Role keywords that route a vacancy to the researcher hand-off instead of
/// straight through to interview scheduling, even for an otherwise eligible
/// SPb candidate (§4.2 step 8: "vacancy title matches a fixed exclusion
/// list").
const EXCLUDED_TITLE_KEYWORDS: &[&str] = &["driver", "courier", "security guard", "cleaner"];

const SPB_CANONICAL: &str = "saint petersburg";

/// Whether `city` normalizes to Saint Petersburg (§4.2 step 8: "the vacancy
/// city is not Saint-Petersburg").
pub fn is_spb(city: &str) -> bool {
    normalize_city(city) == SPB_CANONICAL
}

/// Whether `title` hits the fixed exclusion list.
pub fn vacancy_title_excluded(title: &str) -> bool {
    let lower = title.to_lowercase();
    EXCLUDED_TITLE_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_spb_synonyms() {
        assert!(is_spb("SPb"));
        assert!(is_spb("Saint Petersburg"));
        assert!(is_spb("питер"));
        assert!(!is_spb("Moscow"));
    }

    #[test]
    fn excludes_titles_on_the_fixed_list() {
        assert!(vacancy_title_excluded("Night Security Guard"));
        assert!(vacancy_title_excluded("Courier"));
        assert!(!vacancy_title_excluded("Backend Developer"));
    }
}
