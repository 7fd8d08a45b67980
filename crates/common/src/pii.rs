//! Inbound-message PII masking: full names and phone numbers are stripped
//! from text before it reaches the LLM or a log line, and returned
//! separately so the caller can persist them onto [`crate::models::CandidateRow`]
//! deliberately rather than by accident.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Matches a Unicode name triple: three capitalized words, each an
    /// uppercase letter followed by one or more lowercase letters. Works
    /// across scripts with a Lu/Ll case distinction, not just ASCII.
    static ref NAME_TRIPLE_PATTERN: Regex =
        Regex::new(r"\p{Lu}\p{Ll}+(?:\s+\p{Lu}\p{Ll}+){2}").expect("valid regex");

    static ref PHONE_PATTERN: Regex =
        Regex::new(r"(?:\+?\d[\s\-()]?){10,15}").expect("valid regex");
}

pub const NAME_MASK_TOKEN: &str = "[NAME_REDACTED]";
pub const PHONE_MASK_TOKEN: &str = "[PHONE_REDACTED]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskResult {
    pub masked_text: String,
    pub full_name: Option<String>,
    pub phone: Option<String>,
}

/// Configuration for phone normalization. The source system this masker is
/// modeled on always normalizes to an 11-digit number beginning with a
/// fixed country-code digit (e.g. `7` for Russia); kept configurable here
/// rather than hardcoded since the agent may run in any country.
#[derive(Debug, Clone, Copy)]
pub struct PhoneNormalization {
    pub country_code_digit: char,
    /// Leading digit that, when present on an 11-digit national number,
    /// gets swapped for `country_code_digit` (Russia's domestic trunk
    /// prefix `8` standing in for `+7`, for example).
    pub trunk_prefix_digit: char,
}

impl Default for PhoneNormalization {
    fn default() -> Self {
        Self {
            country_code_digit: '7',
            trunk_prefix_digit: '8',
        }
    }
}

/// Masks full names and phone numbers out of `text`, returning the masked
/// text alongside whatever it found. Only the first name match and first
/// phone match are extracted; a message with more than one of either is
/// assumed to be quoting someone else's contact details, which callers can
/// still see masked out of the text but won't have recorded as the
/// candidate's own.
pub fn extract_and_mask_pii(text: &str, phone_norm: PhoneNormalization) -> MaskResult {
    let full_name = NAME_TRIPLE_PATTERN
        .find(text)
        .map(|m| m.as_str().to_string());
    let masked = NAME_TRIPLE_PATTERN.replace(text, NAME_MASK_TOKEN);

    let raw_phone = PHONE_PATTERN.find(&masked).map(|m| m.as_str().to_string());
    let masked_text = PHONE_PATTERN
        .replace(&masked, PHONE_MASK_TOKEN)
        .into_owned();

    let phone = raw_phone.map(|raw| normalize_phone(&raw, phone_norm));

    MaskResult {
        masked_text,
        full_name,
        phone,
    }
}

fn normalize_phone(raw: &str, norm: PhoneNormalization) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    match digits.len() {
        11 if digits.starts_with(norm.trunk_prefix_digit) => {
            let mut out = String::with_capacity(11);
            out.push(norm.country_code_digit);
            out.push_str(&digits[1..]);
            out
        }
        10 => {
            let mut out = String::with_capacity(11);
            out.push(norm.country_code_digit);
            out.push_str(&digits);
            out
        }
        _ => digits,
    }
}

/// Masks the middle name of a `"First Patronymic Last"` triple down to
/// `"First X*** Last"` for display to a reviewer (§4.4 step 3: "masked full
/// name (first name + last name visible, patronymic masked to 'X***')").
/// Names that don't parse as exactly three words are returned unchanged —
/// the caller still has *something* to show rather than nothing.
pub fn mask_patronymic(full_name: &str) -> String {
    let words: Vec<&str> = full_name.split_whitespace().collect();
    match words.as_slice() {
        [first, _patronymic, last] => format!("{first} X*** {last}"),
        _ => full_name.to_string(),
    }
}

/// Masks all but the country code and last two digits of a normalized
/// phone number for display to a reviewer (§4.4 step 3: "masked phone").
pub fn mask_phone(phone: &str) -> String {
    let digits: Vec<char> = phone.chars().collect();
    if digits.len() < 4 {
        return "*".repeat(digits.len());
    }
    let head = &digits[..1];
    let tail = &digits[digits.len() - 2..];
    format!(
        "{}{}{}",
        head.iter().collect::<String>(),
        "*".repeat(digits.len() - 3),
        tail.iter().collect::<String>()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_patronymic_in_a_three_word_name() {
        assert_eq!(mask_patronymic("Ivan Petrovich Sidorov"), "Ivan X*** Sidorov");
    }

    #[test]
    fn leaves_non_triple_names_unchanged() {
        assert_eq!(mask_patronymic("Cher"), "Cher");
        assert_eq!(mask_patronymic("Jean Claude Van Damme"), "Jean Claude Van Damme");
    }

    #[test]
    fn masks_middle_digits_of_a_phone() {
        assert_eq!(mask_phone("79261234567"), "7********67");
    }

    #[test]
    fn masks_name_and_phone_and_extracts_them() {
        let result = extract_and_mask_pii(
            "Hi, I'm Ivan Petrovich Sidorov, call me at 89261234567",
            PhoneNormalization::default(),
        );
        assert!(!result.masked_text.contains("Ivan"));
        assert!(result.masked_text.contains(NAME_MASK_TOKEN));
        assert!(result.masked_text.contains(PHONE_MASK_TOKEN));
        assert_eq!(result.phone.as_deref(), Some("79261234567"));
    }

    #[test]
    fn ten_digit_number_gets_country_code_prefixed() {
        let result = extract_and_mask_pii("9261234567", PhoneNormalization::default());
        assert_eq!(result.phone.as_deref(), Some("79261234567"));
    }

    #[test]
    fn text_without_pii_is_unchanged() {
        let result = extract_and_mask_pii(
            "I'm interested in the backend role",
            PhoneNormalization::default(),
        );
        assert_eq!(result.masked_text, "I'm interested in the backend role");
        assert!(result.full_name.is_none());
        assert!(result.phone.is_none());
    }

    #[test]
    fn normalization_is_configurable_for_other_countries() {
        let norm = PhoneNormalization {
            country_code_digit: '1',
            trunk_prefix_digit: '0',
        };
        let result = extract_and_mask_pii("02125551234", norm);
        assert_eq!(result.phone.as_deref(), Some("12125551234"));
    }
}
