//! Dialogue lifecycle: the coarse `DialogueStatus` the pipelines branch on,
//! and the fine-grained `DialogueState` node the qualification state
//! machine is currently sitting in.

use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "dialogue_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DialogueStatus {
    New,
    InProgress,
    Qualified,
    Rejected,
    TimedOut,
    RecruiterHandled,
    VacancyClosed,
}

impl DialogueStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DialogueStatus::New | DialogueStatus::InProgress)
    }

    /// Terminal states that still owe a dossier to one of the three
    /// outbound notification queues.
    pub fn needs_notification(self) -> bool {
        matches!(
            self,
            DialogueStatus::Qualified | DialogueStatus::Rejected | DialogueStatus::TimedOut
        )
    }

    /// Dialogues the dojim ladder (§4.3a) is allowed to nudge.
    pub fn eligible_for_dojim(self) -> bool {
        matches!(self, DialogueStatus::InProgress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(type_name = "dialogue_state", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    InitialProcessing,
    AwaitingQuestions,
    AwaitingPhone,
    AwaitingCity,
    AwaitingReadiness,
    AwaitingCitizenship,
    ClarifyingCitizenship,
    AwaitingAge,
    ClarifyingAnything,
    ClarifyingDeclinedVacancy,
    /// Synthetic — resolved immediately by the processor's programmatic
    /// gates (§4.2 step 8), never observed at rest between turns.
    QualificationComplete,
    InitSchedulingSpb,
    SchedulingSpbDay,
    SchedulingSpbTime,
    InterviewScheduledSpb,
    ForwardedToResearcher,
    PostQualificationChat,
    QualificationFailed,
    DeclinedVacancy,
    DeclinedInterview,
    CallLater,
}

impl DialogueState {
    /// States in which the dojim ladder must not nudge the candidate: the
    /// candidate has already declined, gone cold in a tracked way, or
    /// explicitly refused.
    pub fn excluded_from_dojim(self) -> bool {
        matches!(
            self,
            DialogueState::DeclinedVacancy
                | DialogueState::DeclinedInterview
                | DialogueState::CallLater
        )
    }

    pub fn is_qualification_state(self) -> bool {
        matches!(
            self,
            DialogueState::AwaitingQuestions
                | DialogueState::AwaitingPhone
                | DialogueState::AwaitingCity
                | DialogueState::AwaitingReadiness
                | DialogueState::AwaitingCitizenship
                | DialogueState::ClarifyingCitizenship
                | DialogueState::AwaitingAge
                | DialogueState::ClarifyingAnything
                | DialogueState::ClarifyingDeclinedVacancy
        )
    }

    pub fn is_scheduling_state(self) -> bool {
        matches!(
            self,
            DialogueState::InitSchedulingSpb
                | DialogueState::SchedulingSpbDay
                | DialogueState::SchedulingSpbTime
        )
    }

    pub fn allows_faq(self) -> bool {
        self.is_qualification_state() || self.is_scheduling_state()
    }

    pub fn is_post_qualification(self) -> bool {
        matches!(
            self,
            DialogueState::InterviewScheduledSpb
                | DialogueState::ForwardedToResearcher
                | DialogueState::PostQualificationChat
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_queue_backed_statuses_need_notification() {
        assert!(DialogueStatus::Qualified.needs_notification());
        assert!(DialogueStatus::Rejected.needs_notification());
        assert!(DialogueStatus::TimedOut.needs_notification());
        assert!(!DialogueStatus::RecruiterHandled.needs_notification());
        assert!(!DialogueStatus::InProgress.needs_notification());
    }

    #[test]
    fn declined_and_call_later_states_are_excluded_from_dojim() {
        assert!(DialogueState::DeclinedVacancy.excluded_from_dojim());
        assert!(DialogueState::CallLater.excluded_from_dojim());
        assert!(!DialogueState::AwaitingPhone.excluded_from_dojim());
    }

    #[test]
    fn scheduling_and_qualification_states_allow_faq_but_terminal_states_do_not() {
        assert!(DialogueState::AwaitingPhone.allows_faq());
        assert!(DialogueState::SchedulingSpbDay.allows_faq());
        assert!(!DialogueState::InterviewScheduledSpb.allows_faq());
    }
}
