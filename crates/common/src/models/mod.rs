pub mod app_settings;
pub mod candidate;
pub mod dialogue;
pub mod interview_reminder;
pub mod llm_usage_log;
pub mod notification_queue;
pub mod recruiter;
pub mod vacancy;

pub use app_settings::AppSettingsRow;
pub use candidate::CandidateRow;
pub use dialogue::{DialogueRow, HistoryEntry, PendingMessage, Role, HISTORY_CAP, SYSTEM_COMMAND_PREFIX};
pub use interview_reminder::{
    InterviewNotificationType, InterviewReminderId, InterviewReminderRow, InterviewReminderStatus,
};
pub use llm_usage_log::{LlmUsageLogId, LlmUsageLogRow};
pub use notification_queue::{
    InactiveNotificationId, InactiveNotificationRow, NotificationStatus, OutboundQueueRow,
    QualifiedNotificationId, QualifiedNotificationRow, RejectedNotificationId,
    RejectedNotificationRow,
};
pub use recruiter::{NotificationChannel, RecruiterRow};
pub use vacancy::VacancyRow;
