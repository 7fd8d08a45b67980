#[derive(Debug, thiserror::Error, Clone)]
pub enum LlmError {
    #[error("http transport error: {0}")]
    Transport(String),

    #[error("api key rejected")]
    Unauthorized,

    #[error("rate limited, retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("anthropic api error: {status} {body}")]
    Api { status: u16, body: String },

    #[error("model returned text that was not valid JSON for the requested schema: {0}")]
    InvalidJson(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        LlmError::Transport(err.to_string())
    }
}
