//! New-response and update ingestion (§4.1). Never calls the LLM, never
//! sends outbound messages — only ever appends to `pending_messages`.

use anyhow::Result;
use chrono::{DateTime, Utc};
use jobboard_client::{JobBoardClient, Negotiation};
use recruiting_common::ledger::{self, DebitReason};
use recruiting_common::models::{CandidateRow, DialogueRow, PendingMessage, RecruiterRow, Role, VacancyRow};
use recruiting_common::state_machine::DialogueState;
use recruiting_common::{DialogueId, DialogueStatus, Record};
use sqlx::PgPool;
use tracing::{info, warn};

const INBOX_FOLDER: &str = "response";
const CONSIDER_FOLDER: &str = "consider";
const INTERVIEW_FOLDER: &str = "interview";

/// Broadcast alert emitted the moment the balance first dips below
/// threshold; delivery is the operator chat's job, this only records the
/// event for whoever wires up the alert channel.
pub struct LowBalanceAlert {
    pub recruiter_id: recruiting_common::RecruiterId,
    pub balance: rust_decimal::Decimal,
}

pub async fn ingest_new_responses(
    recruiter: &RecruiterRow,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<Vec<LowBalanceAlert>> {
    let mut alerts = Vec::new();
    let vacancies = VacancyRow::active_for_recruiter(recruiter.id, db).await?;

    for vacancy in vacancies {
        let responses = job_board
            .list_negotiations(access_token, INBOX_FOLDER, &vacancy.external_id, false)
            .await?;

        for response in responses {
            if !created_after(&response, recruiter.created_at) {
                continue;
            }
            if DialogueRow::find_by_external_response_id(&response.id, db)
                .await?
                .is_some()
            {
                continue;
            }

            match ingest_one_response(recruiter, &vacancy, &response, access_token, job_board, db).await {
                Ok(Some(alert)) => alerts.push(alert),
                Ok(None) => {}
                Err(err) => warn!(
                    recruiter_id = %recruiter.id,
                    negotiation_id = %response.id,
                    error = %err,
                    "failed to ingest response, skipping"
                ),
            }
        }
    }

    Ok(alerts)
}

fn created_after(response: &Negotiation, cutoff: DateTime<Utc>) -> bool {
    response
        .created_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc) >= cutoff)
        .unwrap_or(true)
}

/// One candidate response, end to end: resolve candidate, debit the ledger,
/// insert the dialogue, move the response past the fence, seed
/// `pending_messages`. The debit, the dialogue insert, and the fence move's
/// success are one transaction (§4.1 step 4, §8 property 1): a failed move
/// rolls back the debit along with the row, rather than leaving a charged
/// ledger with no dialogue to show for it.
async fn ingest_one_response(
    recruiter: &RecruiterRow,
    vacancy: &VacancyRow,
    response: &Negotiation,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<Option<LowBalanceAlert>> {
    let resume_id = response
        .resume_id
        .clone()
        .unwrap_or_else(|| format!("anon-{}", response.id));
    let candidate = CandidateRow::find_or_create_by_external_resume_id(&resume_id, db).await?;

    let mut tx = db.begin().await?;
    let debit_outcome = ledger::debit(DebitReason::DialogueStart, &mut tx).await?;
    let Some(outcome) = debit_outcome else {
        tx.commit().await?;
        info!(recruiter_id = %recruiter.id, "insufficient balance, skipping new response");
        return Ok(None);
    };

    let response_created_at = response
        .created_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let dialogue = DialogueRow {
        id: DialogueId::new(),
        external_response_id: response.id.clone(),
        candidate_id: candidate.id,
        vacancy_id: vacancy.id,
        recruiter_id: recruiter.id,
        status: DialogueStatus::New,
        dialogue_state: DialogueState::InitialProcessing,
        reminder_level: 0,
        history: sqlx::types::Json(Vec::new()),
        pending_messages: sqlx::types::Json(Vec::new()),
        last_updated: Utc::now(),
        created_at: Utc::now(),
        response_created_at,
        interview_datetime_utc: None,
        total_prompt_tokens: 0,
        total_completion_tokens: 0,
        total_cached_tokens: 0,
        total_cost: rust_decimal::Decimal::ZERO,
    };
    let dialogue = dialogue.insert_tx(&mut tx).await?;

    // The folder move is the fence (§4.1, §5): the debit and the dialogue
    // insert only commit if the move succeeds; otherwise the whole
    // transaction rolls back and the candidate is never charged for a
    // dialogue that doesn't exist.
    if let Err(err) = job_board.move_to_folder(access_token, &response.id, CONSIDER_FOLDER).await {
        warn!(negotiation_id = %response.id, error = %err, "fence move failed, rolling back debit and dialogue");
        tx.rollback().await?;
        return Err(err.into());
    }
    tx.commit().await?;

    seed_pending_messages(&dialogue, response, access_token, job_board, db).await?;

    let alert = if outcome.crossed_into_low_balance {
        Some(LowBalanceAlert {
            recruiter_id: recruiter.id,
            balance: outcome.new_balance,
        })
    } else {
        None
    };
    Ok(alert)
}

async fn seed_pending_messages(
    dialogue: &DialogueRow,
    response: &Negotiation,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<()> {
    let messages = match &response.messages_url {
        Some(url) => job_board.get_messages(access_token, url).await?,
        None => Vec::new(),
    };

    let mut pending: Vec<PendingMessage> = messages
        .iter()
        .filter(|m| m.author.participant_type == "applicant")
        .map(|m| PendingMessage {
            message_id: m.id.clone(),
            role: Role::User,
            content: m.text.clone(),
            timestamp_local: DateTime::parse_from_rfc3339(&m.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
        .collect();

    if pending.is_empty() {
        pending.push(PendingMessage::synthetic_command("greet the candidate"));
    }

    sqlx::query("UPDATE dialogues SET pending_messages = $2 WHERE id = $1")
        .bind(dialogue.id)
        .bind(sqlx::types::Json(&pending))
        .execute(db)
        .await?;

    Ok(())
}

/// Pulls updated responses from the "consider" and "interview" folders and
/// appends newly-seen applicant messages to `pending_messages` (§4.1
/// "Update ingestion").
pub async fn ingest_updates(
    recruiter: &RecruiterRow,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<()> {
    let vacancies = VacancyRow::active_for_recruiter(recruiter.id, db).await?;

    for vacancy in vacancies {
        for folder in [CONSIDER_FOLDER, INTERVIEW_FOLDER] {
            let responses = job_board
                .list_negotiations(access_token, folder, &vacancy.external_id, true)
                .await?;

            for response in responses {
                let Some(dialogue) = DialogueRow::find_by_external_response_id(&response.id, db).await? else {
                    continue;
                };
                if let Err(err) =
                    apply_update(dialogue, &response, folder, access_token, job_board, db).await
                {
                    warn!(negotiation_id = %response.id, error = %err, "failed to apply update");
                }
            }
        }
    }

    Ok(())
}

async fn apply_update(
    mut dialogue: DialogueRow,
    response: &Negotiation,
    folder: &str,
    access_token: &str,
    job_board: &JobBoardClient,
    db: &PgPool,
) -> Result<()> {
    let seen = dialogue.seen_message_ids();
    let messages = match &response.messages_url {
        Some(url) => job_board.get_messages(access_token, url).await?,
        None => Vec::new(),
    };

    let mut new_pending: Vec<PendingMessage> = messages
        .into_iter()
        .filter(|m| m.author.participant_type == "applicant" && !seen.contains(m.id.as_str()))
        .map(|m| PendingMessage {
            message_id: m.id,
            role: Role::User,
            content: m.text,
            timestamp_local: DateTime::parse_from_rfc3339(&m.created_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
        .collect();

    let force_post_qualification = folder == INTERVIEW_FOLDER
        && dialogue.dialogue_state != DialogueState::PostQualificationChat;

    if new_pending.is_empty() && !force_post_qualification {
        return Ok(());
    }

    dialogue.pending_messages.0.append(&mut new_pending);
    if force_post_qualification {
        dialogue.dialogue_state = DialogueState::PostQualificationChat;
    }
    if dialogue.reminder_level > 0 {
        dialogue.reminder_level = 0;
    }
    dialogue.last_updated = Utc::now();

    sqlx::query(
        "UPDATE dialogues SET pending_messages = $2, dialogue_state = $3, reminder_level = $4, last_updated = $5 WHERE id = $1",
    )
    .bind(dialogue.id)
    .bind(&dialogue.pending_messages)
    .bind(dialogue.dialogue_state)
    .bind(dialogue.reminder_level)
    .bind(dialogue.last_updated)
    .execute(db)
    .await?;

    Ok(())
}
