//! Error classification for the job board API. The distinction that
//! matters to callers isn't HTTP status codes, it's which terminal
//! outcomes mean "stop talking to this negotiation" versus "retry me".

#[derive(Debug, thiserror::Error)]
pub enum JobBoardError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to deserialize response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("access token rejected or expired, refresh required")]
    TokenRevoked,

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("vacancy closed or resume withdrawn for negotiation {negotiation_id}")]
    NegotiationGone { negotiation_id: String },

    #[error("negotiation not found")]
    NotFound,

    #[error("job board returned an error: {status} {body}")]
    Api { status: u16, body: String },
}

/// Terminal signal classes a caller needs to branch on without matching on
/// every `JobBoardError` variant by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    /// The negotiation itself is dead: vacancy closed, resume withdrawn.
    /// The dialogue should be escalated/closed, not retried.
    NegotiationGone,
    /// The recruiter's credentials need a fresh OAuth round trip before
    /// anything else against this recruiter can succeed.
    TokenRevoked,
}

impl JobBoardError {
    pub fn terminal_kind(&self) -> Option<TerminalKind> {
        match self {
            JobBoardError::NegotiationGone { .. } => Some(TerminalKind::NegotiationGone),
            JobBoardError::TokenRevoked => Some(TerminalKind::TokenRevoked),
            _ => None,
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            JobBoardError::Transport(_) | JobBoardError::RateLimited { .. }
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, JobBoardError::NotFound)
    }
}
