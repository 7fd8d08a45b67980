//! Process configuration loaded once at startup from the environment.
//! Each of the four binaries constructs one of these via
//! [`Config::from_env`] before doing anything else.

use anyhow::Context;
use rust_decimal::Decimal;
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub anthropic_api_key: String,
    pub job_board_client_id: String,
    pub job_board_client_secret: String,
    /// Outbound HTTP proxy for the LLM client (§6 Configuration).
    pub llm_proxy_url: Option<String>,
    pub messenger_bot_token: String,
    pub operator_chat_id: Option<i64>,
    /// IANA zone name scheduling/reminder wall-clock math is pinned to
    /// (§6 Configuration: "operating-zone name (default `Europe/Moscow`)").
    pub operating_zone: String,

    // Poller
    pub poll_interval_secs: u64,
    pub recruiter_fanout_concurrency: usize,
    pub vacancy_sync_cache_window_secs: i64,

    // Processor
    pub processor_batch_size: i64,
    pub processor_debounce_secs: i64,
    pub processor_tick_interval_secs: u64,
    pub llm_concurrency_limit: usize,
    pub llm_max_retries: u32,
    pub llm_max_tokens: u32,
    pub prompt_library_ttl_secs: u64,
    /// Per-million-token prices used by [`llm_client::Usage::cost`] (§6:
    /// "cost = non-cached-input × rate + cached-input × (rate/2) + output ×
    /// out-rate").
    pub llm_input_rate_per_million: Decimal,
    pub llm_output_rate_per_million: Decimal,
    /// Path to the knowledge-base document the prompt library is parsed
    /// from (§9 Design Notes: "Prompt library as a cached map" — the
    /// document itself is out of scope, only its consumption here).
    pub knowledge_base_path: String,
    /// Side-log path a vacancy-match miss (§4.2 step 4) is appended to,
    /// rather than raised as an error — an unmatched vacancy still gets a
    /// turn, just without a tailored description.
    pub vacancy_match_miss_log_path: String,

    // Reminders
    pub dojim_fanout_concurrency: usize,
    pub interview_reminder_batch_size: i64,
    pub reminders_tick_interval_secs: u64,

    // Notifier
    pub notifier_batch_size: i64,
    pub notifier_tick_interval_secs: u64,
    pub supervisor_liveness_bound_secs: u64,
    pub history_retention_days: i64,
    /// UTC hour the once-daily history-retention sweep runs at (§4.4
    /// "History cleanup ... at a fixed hour").
    pub history_cleanup_hour_utc: u32,

    // Job-board outbound limiters
    pub job_board_rate_limit_per_sec: u32,
    pub job_board_concurrency_limit: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .context("ANTHROPIC_API_KEY must be set")?,
            job_board_client_id: env::var("JOB_BOARD_CLIENT_ID")
                .context("JOB_BOARD_CLIENT_ID must be set")?,
            job_board_client_secret: env::var("JOB_BOARD_CLIENT_SECRET")
                .context("JOB_BOARD_CLIENT_SECRET must be set")?,
            llm_proxy_url: env::var("LLM_PROXY_URL").ok(),
            messenger_bot_token: env::var("MESSENGER_BOT_TOKEN")
                .context("MESSENGER_BOT_TOKEN must be set")?,
            operator_chat_id: parse_opt("OPERATOR_CHAT_ID")?,
            operating_zone: env::var("OPERATING_ZONE").unwrap_or_else(|_| "Europe/Moscow".into()),

            poll_interval_secs: parse_opt("POLL_INTERVAL_SECS")?.unwrap_or(5),
            recruiter_fanout_concurrency: parse_opt("RECRUITER_FANOUT_CONCURRENCY")?.unwrap_or(10),
            vacancy_sync_cache_window_secs: parse_opt("VACANCY_SYNC_CACHE_WINDOW_SECS")?
                .unwrap_or(120),

            processor_batch_size: parse_opt("PROCESSOR_BATCH_SIZE")?.unwrap_or(40),
            processor_debounce_secs: parse_opt("PROCESSOR_DEBOUNCE_SECS")?.unwrap_or(5),
            processor_tick_interval_secs: parse_opt("PROCESSOR_TICK_INTERVAL_SECS")?.unwrap_or(2),
            llm_concurrency_limit: parse_opt("LLM_CONCURRENCY_LIMIT")?.unwrap_or(40),
            llm_max_retries: parse_opt("LLM_MAX_RETRIES")?.unwrap_or(3),
            llm_max_tokens: parse_opt("LLM_MAX_TOKENS")?.unwrap_or(1024),
            prompt_library_ttl_secs: parse_opt("PROMPT_LIBRARY_TTL_SECS")?.unwrap_or(120),
            llm_input_rate_per_million: parse_opt("LLM_INPUT_RATE_PER_MILLION")?
                .unwrap_or(Decimal::new(3, 0)),
            llm_output_rate_per_million: parse_opt("LLM_OUTPUT_RATE_PER_MILLION")?
                .unwrap_or(Decimal::new(15, 0)),
            knowledge_base_path: env::var("KNOWLEDGE_BASE_PATH")
                .unwrap_or_else(|_| "knowledge_base.txt".into()),
            vacancy_match_miss_log_path: env::var("VACANCY_MATCH_MISS_LOG_PATH")
                .unwrap_or_else(|_| "vacancy_match_misses.log".into()),

            dojim_fanout_concurrency: parse_opt("DOJIM_FANOUT_CONCURRENCY")?.unwrap_or(20),
            interview_reminder_batch_size: parse_opt("INTERVIEW_REMINDER_BATCH_SIZE")?
                .unwrap_or(20),
            reminders_tick_interval_secs: parse_opt("REMINDERS_TICK_INTERVAL_SECS")?.unwrap_or(60),

            notifier_batch_size: parse_opt("NOTIFIER_BATCH_SIZE")?.unwrap_or(10),
            notifier_tick_interval_secs: parse_opt("NOTIFIER_TICK_INTERVAL_SECS")?.unwrap_or(10),
            supervisor_liveness_bound_secs: parse_opt("SUPERVISOR_LIVENESS_BOUND_SECS")?
                .unwrap_or(600),
            history_retention_days: parse_opt("HISTORY_RETENTION_DAYS")?.unwrap_or(30),
            history_cleanup_hour_utc: parse_opt("HISTORY_CLEANUP_HOUR_UTC")?.unwrap_or(3),

            job_board_rate_limit_per_sec: parse_opt("JOB_BOARD_RATE_LIMIT_PER_SEC")?
                .unwrap_or(100),
            job_board_concurrency_limit: parse_opt("JOB_BOARD_CONCURRENCY_LIMIT")?.unwrap_or(80),
        })
    }
}

/// Parses an optional env var, leaving it `None` when unset rather than
/// treating an unset var as an error — only a var that's set but
/// unparsable should fail startup.
fn parse_opt<T: std::str::FromStr>(key: &str) -> anyhow::Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{key} must be a valid value: {e}")),
        Err(_) => Ok(None),
    }
}
