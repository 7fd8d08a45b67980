//! System prompt assembly (§4.2 step 5): stitches prompt-library fragments
//! together based on the dialogue's current state, plus the rendered
//! scheduling calendar and the chosen vacancy blurb.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use chrono_tz::Tz;

use recruiting_common::prompt_library::PromptLibrary;
use recruiting_common::state_machine::DialogueState;

const CALENDAR_DAYS: i64 = 14;

const RUSSIAN_WEEKDAYS: [&str; 7] = [
    "понедельник",
    "вторник",
    "среда",
    "четверг",
    "пятница",
    "суббота",
    "воскресенье",
];

/// Loads the raw knowledge-base document the prompt library is parsed from.
/// The document itself (who authors it, where it's stored) is out of
/// scope; this seam exists so the processor doesn't care whether it comes
/// from a local file, an object store, or a CMS.
#[async_trait]
pub trait PromptLibrarySource: Send + Sync {
    async fn load_raw(&self) -> anyhow::Result<String>;
}

/// Reads the document from a local path, refreshed whenever the cache
/// wrapper decides its TTL has expired.
pub struct FilePromptLibrarySource {
    path: String,
}

impl FilePromptLibrarySource {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl PromptLibrarySource for FilePromptLibrarySource {
    async fn load_raw(&self) -> anyhow::Result<String> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(contents)
    }
}

/// Renders a 14-day calendar starting today, with "today"/"tomorrow"/"day
/// after tomorrow" labels for the first three days and the Russian weekday
/// name plus date for the rest (§4.2 step 5).
pub fn render_calendar(today: NaiveDate) -> String {
    let mut lines = Vec::with_capacity(CALENDAR_DAYS as usize);
    for offset in 0..CALENDAR_DAYS {
        let date = today + Duration::days(offset);
        let label = match offset {
            0 => "сегодня".to_string(),
            1 => "завтра".to_string(),
            2 => "послезавтра".to_string(),
            _ => RUSSIAN_WEEKDAYS[date.weekday().num_days_from_monday() as usize].to_string(),
        };
        lines.push(format!("{} — {label}", date.format("%Y-%m-%d")));
    }
    lines.join("\n")
}

/// Today's date in the configured operating zone, used to anchor
/// [`render_calendar`].
pub fn today_in_zone(tz: Tz) -> NaiveDate {
    chrono::Utc::now().with_timezone(&tz).date_naive()
}

pub struct PromptContext<'a> {
    pub state: DialogueState,
    pub vacancy_title: &'a str,
    pub vacancy_city: Option<&'a str>,
    pub vacancy_description: Option<&'a str>,
    pub operating_zone: Tz,
}

/// Assembles the full system prompt for one turn, concatenating
/// library fragments keyed by the dialogue's current state.
pub fn assemble_system_prompt(library: &PromptLibrary, ctx: &PromptContext) -> String {
    let mut sections = Vec::new();

    if let Some(role_style) = library.fragment("ROLE_STYLE") {
        sections.push(role_style.to_string());
    }

    if ctx.state.is_qualification_state() {
        if let Some(rules) = library.fragment("QUALIFICATION_RULES") {
            sections.push(rules.to_string());
        }
    }

    if ctx.state.is_scheduling_state() {
        if let Some(algorithm) = library.fragment("SCHEDULING_ALGORITHM") {
            sections.push(algorithm.to_string());
        }
        sections.push(format!(
            "Calendar (next {CALENDAR_DAYS} days):\n{}",
            render_calendar(today_in_zone(ctx.operating_zone))
        ));
    }

    if ctx.state.allows_faq() {
        if let Some(faq) = library.fragment("FAQ") {
            sections.push(faq.to_string());
        }
    }

    if ctx.state.is_post_qualification() {
        if let Some(post) = library.fragment("POST_QUALIFICATION") {
            sections.push(post.to_string());
        }
    }

    if let Some(description) = ctx.vacancy_description {
        sections.push(description.to_string());
    }

    sections.push(format!(
        "[CURRENT TASK] vacancy: {}, city: {}, state: {:?}",
        ctx.vacancy_title,
        ctx.vacancy_city.unwrap_or("unspecified"),
        ctx.state
    ));

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_three_days_use_relative_labels() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let calendar = render_calendar(today);
        let lines: Vec<&str> = calendar.lines().collect();
        assert!(lines[0].contains("сегодня"));
        assert!(lines[1].contains("завтра"));
        assert!(lines[2].contains("послезавтра"));
        assert_eq!(lines.len(), 14);
    }

    #[test]
    fn later_days_use_russian_weekday_names() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let calendar = render_calendar(today);
        let lines: Vec<&str> = calendar.lines().collect();
        assert!(RUSSIAN_WEEKDAYS.iter().any(|day| lines[5].contains(day)));
    }

    #[test]
    fn scheduling_state_prompt_includes_calendar_block() {
        let library = PromptLibrary::default();
        let ctx = PromptContext {
            state: DialogueState::SchedulingSpbDay,
            vacancy_title: "Backend Developer",
            vacancy_city: Some("Saint Petersburg"),
            vacancy_description: None,
            operating_zone: chrono_tz::Europe::Moscow,
        };
        let prompt = assemble_system_prompt(&library, &ctx);
        assert!(prompt.contains("Calendar"));
        assert!(prompt.contains("[CURRENT TASK]"));
    }
}
