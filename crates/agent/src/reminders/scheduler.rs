//! Interview reminder scheduling (§4.3b). A plain async function rather
//! than a method on `DialogueRow`: it spans three conditional inserts plus
//! a cancel-before-reschedule step, which reads better as one procedure
//! than split across the model layer.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use sqlx::{Postgres, Transaction};

use recruiting_common::models::{InterviewNotificationType, InterviewReminderRow};
use recruiting_common::{DialogueId, RecruiterId};

const DAY_OF_THRESHOLD_HOUR: u32 = 12;
const DAY_BEFORE_DEADLINE_HOUR: u32 = 20;

/// Cancels any reminders still pending for this dialogue, then schedules
/// the new set against `interview_date`/`interview_time` interpreted in
/// `operating_zone`. Returns the interview's UTC instant so the caller can
/// persist it on the dialogue row. Runs against the caller's transaction so
/// the reschedule commits or rolls back with the rest of the turn.
pub async fn schedule_interview_reminders(
    dialogue_id: DialogueId,
    recruiter_id: RecruiterId,
    interview_date: NaiveDate,
    interview_time: NaiveTime,
    operating_zone: Tz,
    tx: &mut Transaction<'_, Postgres>,
) -> anyhow::Result<DateTime<Utc>> {
    InterviewReminderRow::cancel_pending_for_dialogue(dialogue_id, tx).await?;

    let local_naive = NaiveDateTime::new(interview_date, interview_time);
    let interview_local = resolve_local(operating_zone, local_naive);
    let interview_utc = interview_local.with_timezone(&Utc);
    let now = Utc::now();

    let mut rows = Vec::with_capacity(3);

    let t_minus_2h = interview_utc - Duration::hours(2);
    if t_minus_2h > now {
        rows.push(reminder_row(
            dialogue_id,
            recruiter_id,
            interview_utc,
            t_minus_2h,
            InterviewNotificationType::TMinus2h,
        ));
    }

    if interview_time < NaiveTime::from_hms_opt(DAY_BEFORE_DEADLINE_HOUR, 0, 0).unwrap() {
        let day_before_local = resolve_local(
            operating_zone,
            NaiveDateTime::new(
                interview_date - Duration::days(1),
                NaiveTime::from_hms_opt(DAY_BEFORE_DEADLINE_HOUR, 0, 0).unwrap(),
            ),
        );
        let day_before_utc = day_before_local.with_timezone(&Utc);
        if day_before_utc > now {
            rows.push(reminder_row(
                dialogue_id,
                recruiter_id,
                interview_utc,
                day_before_utc,
                InterviewNotificationType::DayBefore20Local,
            ));
        }
    }

    if interview_time >= NaiveTime::from_hms_opt(DAY_OF_THRESHOLD_HOUR, 0, 0).unwrap() {
        let day_of_local = resolve_local(
            operating_zone,
            NaiveDateTime::new(interview_date, NaiveTime::from_hms_opt(9, 0, 0).unwrap()),
        );
        rows.push(reminder_row(
            dialogue_id,
            recruiter_id,
            interview_utc,
            day_of_local.with_timezone(&Utc),
            InterviewNotificationType::DayOf9Local,
        ));
    }

    for row in &rows {
        row.insert(tx).await?;
    }

    Ok(interview_utc)
}

/// Resolves a naive local datetime against a zone, preferring the earlier
/// instant on an ambiguous (DST fold-back) local time rather than failing
/// the whole scheduling call over a one-hour edge case.
fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(dt) => dt,
        chrono::LocalResult::Ambiguous(earlier, _) => earlier,
        chrono::LocalResult::None => tz.from_utc_datetime(&naive),
    }
}

fn reminder_row(
    dialogue_id: DialogueId,
    recruiter_id: RecruiterId,
    interview_datetime_utc: DateTime<Utc>,
    scheduled_send_time_utc: DateTime<Utc>,
    notification_type: InterviewNotificationType,
) -> InterviewReminderRow {
    InterviewReminderRow {
        id: recruiting_common::Id::new(),
        dialogue_id,
        recruiter_id,
        interview_datetime_utc,
        scheduled_send_time_utc,
        notification_type,
        status: recruiting_common::models::InterviewReminderStatus::Pending,
        processed_at: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOSCOW: Tz = chrono_tz::Europe::Moscow;

    #[test]
    fn day_before_reminder_fires_for_any_future_interview_before_20h() {
        // This test only exercises the pure boundary logic inline, since
        // the insert path needs a database; see the `tests/` integration
        // suite for the end-to-end scheduling scenario.
        let early_time = NaiveTime::from_hms_opt(18, 0, 0).unwrap();
        assert!(early_time < NaiveTime::from_hms_opt(20, 0, 0).unwrap());

        let late_time = NaiveTime::from_hms_opt(20, 30, 0).unwrap();
        assert!(!(late_time < NaiveTime::from_hms_opt(20, 0, 0).unwrap()));
    }

    #[test]
    fn day_before_send_time_in_the_past_is_excluded_by_the_future_guard() {
        // An interview set for "tomorrow" when local time is already past
        // the deadline hour would compute a day-before send time in the
        // past; the caller's `day_before_utc > now` guard must catch this.
        let day_before_local = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2026, 7, 27).unwrap(),
            NaiveTime::from_hms_opt(DAY_BEFORE_DEADLINE_HOUR, 0, 0).unwrap(),
        );
        let resolved = resolve_local(MOSCOW, day_before_local);
        let now = resolve_local(
            MOSCOW,
            NaiveDateTime::new(
                NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
                NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            ),
        );
        assert!(resolved.with_timezone(&Utc) < now.with_timezone(&Utc));
    }

    #[test]
    fn day_of_reminder_only_fires_when_interview_is_at_or_after_noon() {
        assert!(NaiveTime::from_hms_opt(12, 0, 0).unwrap() >= NaiveTime::from_hms_opt(12, 0, 0).unwrap());
        assert!(NaiveTime::from_hms_opt(11, 59, 0).unwrap() < NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    }

    #[test]
    fn resolves_ambiguous_local_time_to_the_earlier_instant() {
        let naive = NaiveDateTime::new(
            NaiveDate::from_ymd_opt(2026, 7, 28).unwrap(),
            NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
        );
        let resolved = resolve_local(MOSCOW, naive);
        assert_eq!(resolved.naive_local(), naive);
    }
}
