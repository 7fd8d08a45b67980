//! Dossier rendering (§4.4 steps 3-4): the Markdown-escaped caption and the
//! plain-text transcript file shipped together as one `sendDocument` call.

use std::fmt::Write as _;

use chrono_tz::Tz;
use recruiting_common::models::{CandidateRow, DialogueRow, RecruiterRow, VacancyRow};
use recruiting_common::pii::{mask_patronymic, mask_phone};

const RESUME_BASE_URL: &str = "https://hh.ru/resume";

/// Escapes the handful of characters Telegram's legacy Markdown parser
/// treats specially, so a candidate's own text never breaks caption
/// formatting.
fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Renders the caption accompanying the transcript document (§4.4 step 3).
pub fn render_caption(candidate: &CandidateRow, vacancy: &VacancyRow) -> String {
    let name = candidate
        .full_name
        .as_deref()
        .map(mask_patronymic)
        .unwrap_or_else(|| "—".to_string());
    let age = candidate
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "—".to_string());
    let citizenship = candidate.citizenship.as_deref().unwrap_or("—");
    let phone = candidate
        .phone_number
        .as_deref()
        .map(mask_phone)
        .unwrap_or_else(|| "—".to_string());
    let city = candidate.city.as_deref().unwrap_or("—");

    let mut caption = String::new();
    let _ = writeln!(caption, "*{}*", escape_markdown(&name));
    let _ = writeln!(caption, "Вакансия: {}", escape_markdown(&vacancy.title));
    let _ = writeln!(caption, "Возраст: {age}");
    let _ = writeln!(caption, "Гражданство: {}", escape_markdown(citizenship));
    let _ = writeln!(caption, "Телефон: {phone}");
    let _ = writeln!(caption, "Город: {}", escape_markdown(city));
    let _ = write!(
        caption,
        "Резюме: {RESUME_BASE_URL}/{}",
        candidate.external_resume_id
    );
    caption
}

/// Renders the full transcript as a plain-text file (§4.4 step 4): header,
/// then one line per history entry, skipping synthetic system commands.
pub fn render_transcript(
    dialogue: &DialogueRow,
    candidate: &CandidateRow,
    vacancy: &VacancyRow,
    recruiter: &RecruiterRow,
    zone: Tz,
) -> Vec<u8> {
    let masked_name = candidate
        .full_name
        .as_deref()
        .map(mask_patronymic)
        .unwrap_or_else(|| "кандидат".to_string());

    let mut out = String::new();
    let _ = writeln!(out, "Отклик: {}", dialogue.external_response_id);
    let _ = writeln!(
        out,
        "Дата отклика: {}",
        dialogue
            .response_created_at
            .with_timezone(&zone)
            .format("%Y-%m-%d %H:%M")
    );
    let _ = writeln!(out, "Кандидат: {masked_name}");
    let _ = writeln!(
        out,
        "Вакансия: {} ({})",
        vacancy.title,
        vacancy.city.as_deref().unwrap_or("—")
    );
    let _ = writeln!(out, "Рекрутер: {}", recruiter.name);
    out.push('\n');

    for entry in &dialogue.history.0 {
        if entry.is_system_command() {
            continue;
        }
        let local = entry.timestamp_local.with_timezone(&zone);
        let _ = writeln!(
            out,
            "[{}] {} {}",
            local.format("%Y-%m-%d %H:%M"),
            entry.role.glyph(),
            entry.content
        );
    }

    out.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use recruiting_common::{CandidateId, DialogueId, RecruiterId, VacancyId};

    fn candidate() -> CandidateRow {
        CandidateRow {
            id: CandidateId::new(),
            external_resume_id: "abc123".into(),
            full_name: Some("Ivan Petrovich Sidorov".into()),
            age: Some(30),
            citizenship: Some("RF".into()),
            city: Some("Saint-Petersburg".into()),
            phone_number: Some("79261234567".into()),
            readiness_to_start: Some("immediately".into()),
            created_at: Utc::now(),
        }
    }

    fn vacancy() -> VacancyRow {
        VacancyRow {
            id: VacancyId::new(),
            external_id: "v1".into(),
            title: "Courier".into(),
            city: Some("Saint-Petersburg".into()),
            recruiter_id: Some(RecruiterId::new()),
            qualified_count: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn caption_masks_patronymic_and_phone() {
        let caption = render_caption(&candidate(), &vacancy());
        assert!(caption.contains("Ivan X\\*\\*\\* Sidorov") || caption.contains("Ivan X"));
        assert!(!caption.contains("79261234567"));
        assert!(caption.contains("hh.ru/resume/abc123"));
    }

    #[test]
    fn transcript_omits_system_commands() {
        use recruiting_common::models::{HistoryEntry, PendingMessage, Role};
        let mut dialogue = DialogueRow {
            id: DialogueId::new(),
            external_response_id: "resp-1".into(),
            candidate_id: CandidateId::new(),
            vacancy_id: VacancyId::new(),
            recruiter_id: RecruiterId::new(),
            status: recruiting_common::DialogueStatus::Qualified,
            dialogue_state: recruiting_common::state_machine::DialogueState::PostQualificationChat,
            reminder_level: 0,
            history: sqlx::types::Json(Vec::new()),
            pending_messages: sqlx::types::Json(Vec::new()),
            last_updated: Utc::now(),
            created_at: Utc::now(),
            response_created_at: Utc::now(),
            interview_datetime_utc: None,
            total_prompt_tokens: 0,
            total_completion_tokens: 0,
            total_cached_tokens: 0,
            total_cost: rust_decimal::Decimal::ZERO,
        };
        dialogue.history.0.push(HistoryEntry {
            message_id: "1".into(),
            role: Role::User,
            content: "[SYSTEM COMMAND] start scheduling".into(),
            timestamp_local: Utc::now(),
            extracted_data: None,
            state: None,
        });
        dialogue.history.0.push(HistoryEntry {
            message_id: "2".into(),
            role: Role::Assistant,
            content: "When works for you?".into(),
            timestamp_local: Utc::now(),
            extracted_data: None,
            state: None,
        });
        let recruiter = RecruiterRow {
            id: RecruiterId::new(),
            external_id: "r1".into(),
            name: "Acme Recruiting".into(),
            refresh_token: String::new(),
            access_token: String::new(),
            token_expires_at: Utc::now(),
            vacancies_last_synced_at: None,
            chat_id: None,
            topic_qualified: None,
            topic_rejected: None,
            topic_timeout: None,
            is_active: true,
            created_at: Utc::now(),
        };
        let text = String::from_utf8(render_transcript(&dialogue, &candidate(), &vacancy(), &recruiter, chrono_tz::Europe::Moscow)).unwrap();
        assert!(!text.contains("SYSTEM COMMAND"));
        assert!(text.contains("When works for you?"));
        let _ = PendingMessage::synthetic_command("noop");
    }
}
