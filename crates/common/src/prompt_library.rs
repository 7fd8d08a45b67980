//! In-memory cache of the recruiter-authored prompt fragments and vacancy
//! blurbs the agent stitches into its system prompt. The source document is
//! fetched and parsed by whatever loader the deployment wires up (the
//! upstream document itself is out of scope here); this module owns the
//! parsing, caching and fuzzy vacancy lookup once that raw text is in hand.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use regex::Regex;

use lazy_static::lazy_static;

lazy_static! {
    static ref MARKER_PATTERN: Regex = Regex::new(r"#\w+#").expect("valid regex");
}

const VACANCY_SECTION_MARKER: &str = "#START_VACANCIES#";
const VACANCY_SECTION_END_MARKER: &str = "#END_VACANCIES#";
const VACANCY_BLOCK_DELIMITER: &str = "&&&";

/// Short synonym table for city normalization (§4.2 step 4: "Cities are
/// normalised with a short synonym table"). Deliberately small — it only
/// needs to cover the handful of ways people actually abbreviate the one
/// city the eligibility gate cares about.
const CITY_SYNONYMS: &[(&str, &str)] = &[
    ("spb", "saint petersburg"),
    ("piter", "saint petersburg"),
    ("питер", "saint petersburg"),
    ("санкт-петербург", "saint petersburg"),
    ("спб", "saint petersburg"),
    ("msk", "moscow"),
    ("москва", "moscow"),
];

/// Words that change what a vacancy actually is, not just how it's phrased
/// (§4.2 step 4: "a fixed set of 'critical' words"). A title match that
/// disagrees on one of these is penalised rather than just scored lower,
/// so "Night Warehouse Operator" never outscores a day-shift vacancy just
/// because the rest of the title overlaps.
const CRITICAL_WORDS: &[&str] = &[
    "junior", "senior", "lead", "night", "day", "mobile", "remote", "intern",
];

/// Normalizes a free-form city string to the canonical lowercase form used
/// for vacancy matching and the SPb eligibility gate.
pub fn normalize_city(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    for (synonym, canonical) in CITY_SYNONYMS {
        if lower == *synonym {
            return canonical.to_string();
        }
    }
    lower
}

#[derive(Debug, Clone)]
pub struct VacancyBlurb {
    pub titles: Vec<String>,
    pub cities: Vec<String>,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    pub fragments: HashMap<String, String>,
    pub vacancies: Vec<VacancyBlurb>,
}

impl PromptLibrary {
    /// Parses the raw document text into marker-delimited fragments plus a
    /// parsed vacancy list, mirroring the source document's own convention
    /// of a `#START_VACANCIES#`/`#END_VACANCIES#` block holding `&&&`
    /// separated entries.
    pub fn parse(raw_text: &str) -> Self {
        let markers: Vec<&str> = MARKER_PATTERN.find_iter(raw_text).map(|m| m.as_str()).collect();
        let sections: Vec<&str> = MARKER_PATTERN.split(raw_text).collect();

        let mut fragments = HashMap::new();
        // sections[0] is whatever precedes the first marker; fragment i
        // pairs with markers[i] and sections[i + 1].
        for (marker, body) in markers.iter().zip(sections.iter().skip(1)) {
            let key = marker.trim_matches('#').to_string();
            fragments.insert(key, body.trim().to_string());
        }

        let vacancies = fragments
            .remove("START_VACANCIES")
            .map(|raw| parse_vacancies(&raw))
            .unwrap_or_default();
        // tolerate the closing marker ending up as its own (empty) fragment
        fragments.remove("END_VACANCIES");

        Self {
            fragments,
            vacancies,
        }
    }

    pub fn fragment(&self, marker: &str) -> Option<&str> {
        self.fragments.get(marker).map(|s| s.as_str())
    }

    /// Best-effort vacancy match by title and city, scored on overlapping
    /// words rather than requiring an exact string match so "Backend
    /// Developer" still finds a blurb titled "backend engineer".
    pub fn find_vacancy(&self, title: &str, city: Option<&str>) -> Option<&VacancyBlurb> {
        let title_words = lowercase_words(title);
        let city_words = city.map(lowercase_words).unwrap_or_default();

        self.vacancies
            .iter()
            .map(|blurb| (blurb, score_vacancy(blurb, &title_words, &city_words)))
            .filter(|(_, score)| *score > 0)
            .max_by_key(|(_, score)| *score)
            .map(|(blurb, _)| blurb)
    }
}

fn parse_vacancies(raw: &str) -> Vec<VacancyBlurb> {
    raw.split(VACANCY_BLOCK_DELIMITER)
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .filter_map(parse_one_vacancy)
        .collect()
}

fn parse_one_vacancy(block: &str) -> Option<VacancyBlurb> {
    let mut lines = block.lines();
    let title_line = lines.next()?;
    let titles: Vec<String> = title_line
        .split(',')
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if titles.is_empty() {
        return None;
    }

    let mut cities = Vec::new();
    for line in block.lines() {
        let lower = line.to_lowercase();
        if let Some((_, rest)) = lower.split_once(':') {
            if lower.contains("город") || lower.contains("city") {
                cities = rest
                    .split(',')
                    .map(|c| c.trim().trim_end_matches('.').to_string())
                    .filter(|c| !c.is_empty())
                    .collect();
            }
        }
    }

    Some(VacancyBlurb {
        titles,
        cities,
        description: block.to_string(),
    })
}

fn lowercase_words(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Scores a candidate vacancy blurb against the queried title/city words.
/// Word overlap drives the base score; a critical word present in one side
/// but not the other is penalised rather than ignored, so a near-exact
/// title match still loses to the blurb that agrees on seniority/shift.
/// Simultaneous city+title agreement is preferred via the flat per-city
/// bonus stacking with the title score rather than multiplying it.
fn score_vacancy(blurb: &VacancyBlurb, title_words: &[String], city_words: &[String]) -> i32 {
    let mut score = 0i32;
    for title in &blurb.titles {
        let blurb_words = lowercase_words(title);
        score += title_words.iter().filter(|w| blurb_words.contains(w)).count() as i32 * 2;

        for critical in CRITICAL_WORDS {
            let query_has = title_words.iter().any(|w| w == critical);
            let blurb_has = blurb_words.iter().any(|w| w == critical);
            if query_has != blurb_has {
                score -= 3;
            }
        }
    }
    for city in &blurb.cities {
        let city_lower = normalize_city(city);
        if city_words
            .iter()
            .any(|w| city_lower.contains(normalize_city(w).as_str()))
        {
            score += 1;
        }
    }
    score
}

/// Thread-safe cache wrapper with a TTL, so the owning pipeline only
/// refetches the source document once the cache goes stale instead of on
/// every dialogue tick.
pub struct CachedPromptLibrary {
    ttl: Duration,
    state: RwLock<Option<(PromptLibrary, Instant)>>,
}

impl CachedPromptLibrary {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: RwLock::new(None),
        }
    }

    pub fn get_if_fresh(&self) -> Option<PromptLibrary> {
        let guard = self.state.read().expect("lock not poisoned");
        match guard.as_ref() {
            Some((library, fetched_at)) if fetched_at.elapsed() < self.ttl => Some(library.clone()),
            _ => None,
        }
    }

    pub fn store(&self, library: PromptLibrary) {
        let mut guard = self.state.write().expect("lock not poisoned");
        *guard = Some((library, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
#GREETING#
Hello and welcome.
#START_VACANCIES#
backend developer, backend engineer
город: Moscow, Saint Petersburg.
We build the core platform.
&&&
office manager
город: Moscow.
Front desk duties.
#END_VACANCIES#
#CLOSING#
Thanks for chatting.
";

    #[test]
    fn parses_fragments_and_vacancies() {
        let library = PromptLibrary::parse(SAMPLE);
        assert_eq!(library.fragment("GREETING"), Some("Hello and welcome."));
        assert_eq!(library.fragment("CLOSING"), Some("Thanks for chatting."));
        assert_eq!(library.vacancies.len(), 2);
        assert_eq!(library.vacancies[0].cities, vec!["Moscow", "Saint Petersburg"]);
    }

    #[test]
    fn finds_vacancy_by_fuzzy_title_and_city() {
        let library = PromptLibrary::parse(SAMPLE);
        let found = library.find_vacancy("Backend Developer", Some("Moscow")).unwrap();
        assert!(found.titles.contains(&"backend developer".to_string()));
    }

    #[test]
    fn cache_expires_after_ttl() {
        let cache = CachedPromptLibrary::new(Duration::from_millis(1));
        cache.store(PromptLibrary::default());
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get_if_fresh().is_none());
    }
}
