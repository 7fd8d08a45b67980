//! The state machine turn (§4.2): claims a batch of dialogues with unseen
//! pending messages and runs each one through the full LLM/gate/reply cycle.
//! The per-dialogue steps below mirror the numbered contract closely enough
//! that a diff against it should read as a checklist, not a puzzle.

pub mod gates;
pub mod llm_call;
pub mod prompt;
pub mod schema;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use futures::stream::{self, StreamExt};
use jobboard_client::{JobBoardClient, TerminalKind};
use llm_client::{CompletionBackend, LlmRequest};
use recruiting_common::models::{
    CandidateRow, DialogueRow, HistoryEntry, InactiveNotificationRow, InterviewReminderRow,
    PendingMessage, QualifiedNotificationRow, RecruiterRow, RejectedNotificationRow, Role,
    VacancyRow,
};
use recruiting_common::pii::{extract_and_mask_pii, PhoneNormalization};
use recruiting_common::prompt_library::{CachedPromptLibrary, PromptLibrary};
use recruiting_common::record::Record;
use recruiting_common::state_machine::{DialogueState, DialogueStatus};
use recruiting_common::Config;
use sqlx::{PgPool, Postgres, Transaction};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::processor::gates::{is_spb, vacancy_title_excluded};
use crate::processor::llm_call::call_llm;
use crate::processor::prompt::{assemble_system_prompt, PromptContext, PromptLibrarySource};
use crate::processor::schema::{
    CitizenshipClassification, DeclineVerification, ProcessorOutput, YesNoAnswer,
};
use crate::reminders::scheduler::schedule_interview_reminders;
use crate::service::{HeartbeatHandle, Service};
use crate::token_refresh::TokenRefresher;

const STANDARD_REJECTION_MESSAGE: &str =
    "Спасибо за ответы! К сожалению, по формальным критериям вакансии мы не можем продолжить с вашей кандидатурой.";
const STANDARD_HANDOFF_MESSAGE: &str =
    "Спасибо за ответы! Передаю вашу анкету коллеге — он свяжется с вами в ближайшее время.";

/// Everything one processor tick needs to run a dialogue's turn, cloned
/// cheaply per task (the LLM backend and job-board client are themselves
/// thin handles over a pooled `reqwest::Client`).
#[derive(Clone)]
pub struct ProcessorContext {
    pub db: PgPool,
    pub job_board: JobBoardClient,
    pub token_refresher: TokenRefresher,
    pub llm: Arc<dyn CompletionBackend>,
    pub prompt_source: Arc<dyn PromptLibrarySource>,
    pub prompt_cache: Arc<CachedPromptLibrary>,
    pub config: Config,
}

impl ProcessorContext {
    fn operating_zone(&self) -> Tz {
        Tz::from_str(&self.config.operating_zone).unwrap_or(chrono_tz::Europe::Moscow)
    }
}

/// Loads the cached prompt library, refreshing from `prompt_source` once the
/// cache has gone stale (§4.2 step 4/5).
async fn get_prompt_library(ctx: &ProcessorContext) -> Result<PromptLibrary> {
    if let Some(library) = ctx.prompt_cache.get_if_fresh() {
        return Ok(library);
    }
    let raw = ctx.prompt_source.load_raw().await?;
    let library = PromptLibrary::parse(&raw);
    ctx.prompt_cache.store(library.clone());
    Ok(library)
}

/// Appends one line to the vacancy-match-miss side-log rather than failing
/// the turn over an unmatched vacancy (§4.2 step 4: "a miss is written to a
/// side-log file").
async fn log_vacancy_miss(path: &str, vacancy: &VacancyRow) {
    use tokio::io::AsyncWriteExt;

    let line = format!(
        "{} vacancy_id={} title={:?} city={:?}\n",
        Utc::now().to_rfc3339(),
        vacancy.id,
        vacancy.title,
        vacancy.city
    );

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await;
    match file {
        Ok(mut file) => {
            if let Err(err) = file.write_all(line.as_bytes()).await {
                warn!(error = %err, path, "failed to append vacancy-match miss log");
            }
        }
        Err(err) => warn!(error = %err, path, "failed to open vacancy-match miss log"),
    }
}

/// Masks PII out of every pending message, recording a candidate's phone or
/// full name the first time either is seen (§4.2 step 2).
async fn prepare_turn_input(
    dialogue: &DialogueRow,
    candidate: &CandidateRow,
    db: &PgPool,
) -> Result<(Vec<HistoryEntry>, String)> {
    let mut prepared = Vec::with_capacity(dialogue.pending_messages.0.len());
    let mut masked_lines = Vec::with_capacity(dialogue.pending_messages.0.len());

    for pending in &dialogue.pending_messages.0 {
        let mask = extract_and_mask_pii(&pending.content, PhoneNormalization::default());

        if let Some(phone) = &mask.phone {
            if candidate.phone_number.is_none() {
                CandidateRow::record_phone_if_absent(candidate.id, phone, db).await?;
            }
        }
        if let Some(full_name) = &mask.full_name {
            if candidate.full_name.is_none() {
                CandidateRow::record_full_name_if_absent(candidate.id, full_name, db).await?;
            }
        }

        masked_lines.push(mask.masked_text.clone());
        prepared.push(HistoryEntry {
            message_id: pending.message_id.clone(),
            role: Role::User,
            content: mask.masked_text,
            timestamp_local: pending.timestamp_local,
            extracted_data: None,
            state: None,
        });
    }

    Ok((prepared, masked_lines.join("\n")))
}

/// The citizenship subflow (§4.2 step 3): a dedicated classification call
/// that always commits and returns, never falling through to the main turn
/// in the same tick. Re-triggering would loop forever, so the two
/// acceptable-citizenship outcomes move `dialogue_state` off
/// `awaiting_citizenship` even though the spec only names the target state
/// for the rejected branch; see `DESIGN.md`.
async fn run_citizenship_subflow(
    ctx: &ProcessorContext,
    mut dialogue: DialogueRow,
    mut candidate: CandidateRow,
    user_content: &str,
) -> Result<()> {
    let request = LlmRequest::new(ctx.llm.as_ref())
        .system("Classify the candidate's citizenship/residency status from their message.")
        .user(user_content)
        .schema_hint(CitizenshipClassification::schema_hint())
        .max_tokens(ctx.config.llm_max_tokens)
        .max_retries(ctx.config.llm_max_retries);

    let (classification, usage) = call_llm::<CitizenshipClassification>(
        request,
        dialogue.id,
        dialogue.dialogue_state,
        ctx.config.llm_input_rate_per_million,
        ctx.config.llm_output_rate_per_million,
        &ctx.db,
    )
    .await?;
    dialogue.add_usage(
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.cached_tokens,
        usage.cost,
    );

    if classification.is_acceptable.is_yes() {
        let citizenship = classification
            .citizenship
            .unwrap_or_else(|| "EAEU".to_string());
        candidate.citizenship = Some(citizenship.clone());
        candidate.update(&ctx.db).await?;

        dialogue.pending_messages.0.push(PendingMessage::synthetic_command(format!(
            "citizenship confirmed as {citizenship}, proceed with qualification"
        )));
        dialogue.dialogue_state = DialogueState::AwaitingQuestions;
    } else {
        dialogue.pending_messages.0.push(PendingMessage::synthetic_command(
            "candidate's citizenship is not yet acceptable, ask whether they hold an RVP or VNZh",
        ));
        dialogue.dialogue_state = DialogueState::ClarifyingCitizenship;
    }

    dialogue.last_updated = Utc::now();
    dialogue.update(&ctx.db).await?;
    Ok(())
}

/// The full per-dialogue turn (§4.2 steps 1-11).
pub async fn process_one_dialogue(ctx: &ProcessorContext, mut dialogue: DialogueRow) -> Result<()> {
    let mut candidate = CandidateRow::find_by_id(dialogue.candidate_id, &ctx.db)
        .await?
        .context("candidate missing for claimed dialogue")?;
    let vacancy = VacancyRow::find_by_id(dialogue.vacancy_id, &ctx.db)
        .await?
        .context("vacancy missing for claimed dialogue")?;
    // Loaded for parity with the claim contract (§4.2 step 1); the processor
    // itself only needs `recruiter_id` for the token refresher, the rest of
    // this row is the notifier's concern.
    let _recruiter = RecruiterRow::find_by_id(dialogue.recruiter_id, &ctx.db)
        .await?
        .context("recruiter missing for claimed dialogue")?;

    if dialogue.status == DialogueStatus::New {
        dialogue.status = DialogueStatus::InProgress;
    }

    let (prepared_entries, user_content) =
        prepare_turn_input(&dialogue, &candidate, &ctx.db).await?;

    if dialogue.dialogue_state == DialogueState::AwaitingCitizenship {
        return run_citizenship_subflow(ctx, dialogue, candidate, &user_content).await;
    }

    let library = get_prompt_library(ctx).await?;
    let blurb = library.find_vacancy(&vacancy.title, vacancy.city.as_deref());
    if blurb.is_none() {
        log_vacancy_miss(&ctx.config.vacancy_match_miss_log_path, &vacancy).await;
    }

    let prompt_ctx = PromptContext {
        state: dialogue.dialogue_state,
        vacancy_title: &vacancy.title,
        vacancy_city: vacancy.city.as_deref(),
        vacancy_description: blurb.map(|b| b.description.as_str()),
        operating_zone: ctx.operating_zone(),
    };
    let system_prompt = assemble_system_prompt(&library, &prompt_ctx);

    let token = ctx.token_refresher.access_token(dialogue.recruiter_id, &ctx.db).await?;

    let request = LlmRequest::new(ctx.llm.as_ref())
        .system(system_prompt)
        .user(&user_content)
        .schema_hint(ProcessorOutput::schema_hint())
        .max_tokens(ctx.config.llm_max_tokens)
        .max_retries(ctx.config.llm_max_retries);

    let (output, usage) = call_llm::<ProcessorOutput>(
        request,
        dialogue.id,
        dialogue.dialogue_state,
        ctx.config.llm_input_rate_per_million,
        ctx.config.llm_output_rate_per_million,
        &ctx.db,
    )
    .await?;
    dialogue.add_usage(
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.cached_tokens,
        usage.cost,
    );

    if dialogue.status != DialogueStatus::Qualified {
        let extracted = &output.extracted_data;
        if extracted.phone_number.is_some() {
            candidate.phone_number = extracted.phone_number.clone();
        }
        if extracted.citizenship.is_some() {
            candidate.citizenship = extracted.citizenship.clone();
        }
        if extracted.age.is_some() {
            candidate.age = extracted.age;
        }
        if extracted.city.is_some() {
            candidate.city = extracted.city.clone();
        }
        if extracted.readiness_to_start.is_some() {
            candidate.readiness_to_start = extracted.readiness_to_start.clone();
        }
    }

    let mut new_state = output.new_state;
    let mut reply_text = output.response_text.clone();

    // Every write from here on — candidate/dialogue updates, the terminal
    // transition's side effects, and the queue/reminder writes — shares one
    // transaction that only commits once the reply send (or its accepted
    // failure mode) has gone through. A non-terminal send failure rolls the
    // whole turn back so a retry re-runs the terminal transition instead of
    // double-firing it (§4.2 steps 9-10, §5/§9 turn-atomicity guarantee).
    let mut tx: Transaction<'_, Postgres> = ctx.db.begin().await?;

    // Programmatic gates (§4.2 step 8) override whatever the LLM returned.
    match new_state {
        DialogueState::QualificationComplete if candidate.has_required_fields() => {
            if !candidate.is_eligible() {
                new_state = DialogueState::QualificationFailed;
                reply_text = STANDARD_REJECTION_MESSAGE.to_string();
            } else if !vacancy.city.as_deref().map(is_spb).unwrap_or(false) {
                new_state = DialogueState::ForwardedToResearcher;
                reply_text = STANDARD_HANDOFF_MESSAGE.to_string();
            } else if vacancy_title_excluded(&vacancy.title) {
                new_state = DialogueState::ForwardedToResearcher;
                reply_text = STANDARD_HANDOFF_MESSAGE.to_string();
            } else {
                for entry in prepared_entries {
                    dialogue.push_history(entry);
                }
                dialogue.clear_pending_messages();
                dialogue
                    .pending_messages
                    .0
                    .push(PendingMessage::synthetic_command("start interview scheduling"));
                dialogue.dialogue_state = DialogueState::InitSchedulingSpb;
                dialogue.last_updated = Utc::now();
                candidate.update_tx(&mut tx).await?;
                dialogue.update_tx(&mut tx).await?;
                tx.commit().await?;
                return Ok(());
            }
        }
        DialogueState::QualificationComplete => {
            dialogue.pending_messages.0.push(PendingMessage::synthetic_command(
                "qualification fields are incomplete, identify what's missing from history and either record it or ask the candidate",
            ));
            dialogue.dialogue_state = DialogueState::ClarifyingAnything;
            dialogue.last_updated = Utc::now();
            candidate.update_tx(&mut tx).await?;
            dialogue.update_tx(&mut tx).await?;
            tx.commit().await?;
            return Ok(());
        }
        DialogueState::DeclinedVacancy => {
            let verify_request = LlmRequest::new(ctx.llm.as_ref())
                .system("Did the candidate really decline the vacancy?")
                .user(&user_content)
                .schema_hint(DeclineVerification::schema_hint())
                .max_tokens(ctx.config.llm_max_tokens)
                .max_retries(ctx.config.llm_max_retries);

            let (verification, verify_usage) = call_llm::<DeclineVerification>(
                verify_request,
                dialogue.id,
                dialogue.dialogue_state,
                ctx.config.llm_input_rate_per_million,
                ctx.config.llm_output_rate_per_million,
                &ctx.db,
            )
            .await?;
            dialogue.add_usage(
                verify_usage.prompt_tokens,
                verify_usage.completion_tokens,
                verify_usage.cached_tokens,
                verify_usage.cost,
            );

            if verification.declined == YesNoAnswer::No {
                dialogue.pending_messages.0.push(PendingMessage::synthetic_command(
                    "candidate is not declining, continue",
                ));
                dialogue.last_updated = Utc::now();
                candidate.update_tx(&mut tx).await?;
                dialogue.update_tx(&mut tx).await?;
                tx.commit().await?;
                return Ok(());
            }
        }
        DialogueState::CallLater => {
            InactiveNotificationRow::enqueue_if_absent_tx(dialogue.id, &mut tx).await?;
        }
        _ => {}
    }

    // Terminal transitions (§4.2 step 9).
    match new_state {
        DialogueState::ForwardedToResearcher | DialogueState::InterviewScheduledSpb => {
            dialogue.status = DialogueStatus::Qualified;
            VacancyRow::increment_qualified_count_tx(vacancy.id, &mut tx).await?;
            QualifiedNotificationRow::enqueue_if_absent_tx(candidate.id, dialogue.id, &mut tx).await?;
            if let Err(err) = ctx
                .job_board
                .move_to_folder(&token, &dialogue.external_response_id, "interview")
                .await
            {
                tx.rollback().await?;
                return Err(err.into());
            }

            if new_state == DialogueState::InterviewScheduledSpb {
                if let (Some(date_str), Some(time_str)) = (
                    output.extracted_data.interview_date.as_deref(),
                    output.extracted_data.interview_time.as_deref(),
                ) {
                    if let (Ok(date), Ok(time)) = (
                        NaiveDate::parse_from_str(date_str, "%Y-%m-%d"),
                        NaiveTime::parse_from_str(time_str, "%H:%M"),
                    ) {
                        match schedule_interview_reminders(
                            dialogue.id,
                            dialogue.recruiter_id,
                            date,
                            time,
                            ctx.operating_zone(),
                            &mut tx,
                        )
                        .await
                        {
                            Ok(interview_utc) => dialogue.interview_datetime_utc = Some(interview_utc),
                            Err(err) => {
                                tx.rollback().await?;
                                return Err(err);
                            }
                        }
                    } else {
                        warn!(
                            dialogue_id = %dialogue.id,
                            date = date_str,
                            time = time_str,
                            "could not parse interview date/time, skipping reminder scheduling"
                        );
                    }
                }
            }
        }
        DialogueState::QualificationFailed
        | DialogueState::DeclinedVacancy
        | DialogueState::DeclinedInterview => {
            dialogue.status = DialogueStatus::Rejected;
            if new_state == DialogueState::DeclinedInterview {
                InterviewReminderRow::cancel_pending_for_dialogue(dialogue.id, &mut tx).await?;
            }
            if !InactiveNotificationRow::exists_any_status_tx(dialogue.id, &mut tx).await? {
                RejectedNotificationRow::enqueue_or_reset_tx(dialogue.id, &mut tx).await?;
            }
            if let Err(err) = ctx
                .job_board
                .move_to_folder(&token, &dialogue.external_response_id, "assessment")
                .await
            {
                tx.rollback().await?;
                return Err(err.into());
            }
        }
        _ => {}
    }

    // Send the reply (§4.2 step 10). Nothing commits before this point: a
    // retryable API failure rolls back the whole transaction so the next
    // claim re-runs the terminal transition from scratch instead of
    // double-counting it.
    if !reply_text.trim().is_empty() {
        match ctx
            .job_board
            .send_message(&token, &dialogue.external_response_id, &reply_text)
            .await
        {
            Ok(()) => {}
            Err(err) if err.terminal_kind() == Some(TerminalKind::NegotiationGone) => {
                warn!(dialogue_id = %dialogue.id, "negotiation gone, clearing pending messages");
                for entry in prepared_entries {
                    dialogue.push_history(entry);
                }
                dialogue.clear_pending_messages();
                dialogue.dialogue_state = new_state;
                dialogue.last_updated = Utc::now();
                candidate.update_tx(&mut tx).await?;
                dialogue.update_tx(&mut tx).await?;
                tx.commit().await?;
                return Ok(());
            }
            Err(err) => {
                tx.rollback().await?;
                return Err(err.into());
            }
        }
    }

    // Final commit (§4.2 step 11).
    for entry in prepared_entries {
        dialogue.push_history(entry);
    }
    dialogue.push_history(HistoryEntry {
        message_id: uuid::Uuid::now_v7().to_string(),
        role: Role::Assistant,
        content: reply_text,
        timestamp_local: Utc::now(),
        extracted_data: Some(serde_json::to_value(&output.extracted_data).unwrap_or_default()),
        state: Some(new_state),
    });
    dialogue.dialogue_state = new_state;
    dialogue.clear_pending_messages();
    dialogue.last_updated = Utc::now();

    candidate.update_tx(&mut tx).await?;
    dialogue.update_tx(&mut tx).await?;
    tx.commit().await?;

    Ok(())
}

/// Claims a batch every tick and runs each dialogue's turn with bounded
/// concurrency (§4.2 contract, §5 "work claiming"). One dialogue's failure
/// is logged and skipped rather than aborting the rest of the batch — it
/// stays claimed-but-unmodified and will be picked up again once the
/// debounce window passes.
pub struct ProcessorService {
    pub ctx: ProcessorContext,
}

#[async_trait::async_trait]
impl Service for ProcessorService {
    fn name(&self) -> &'static str {
        "processor"
    }

    async fn run(&self, shutdown: CancellationToken, heartbeat: HeartbeatHandle) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                return Ok(());
            }

            let claimed = DialogueRow::claim_batch(
                self.ctx.config.processor_batch_size,
                self.ctx.config.processor_debounce_secs,
                &self.ctx.db,
            )
            .await?;

            if !claimed.is_empty() {
                info!(count = claimed.len(), "processor claimed dialogues");
            }

            let ctx = &self.ctx;
            stream::iter(claimed)
                .for_each_concurrent(ctx.config.llm_concurrency_limit, move |dialogue| async move {
                    let dialogue_id = dialogue.id;
                    if let Err(err) = process_one_dialogue(ctx, dialogue).await {
                        warn!(dialogue_id = %dialogue_id, error = %err, "processor turn failed");
                    }
                })
                .await;

            heartbeat.beat().await;

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(Duration::from_secs(self.ctx.config.processor_tick_interval_secs)) => {}
            }
        }
    }
}
