#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("chat not found or bot blocked: {chat_id}")]
    ChatUnreachable { chat_id: i64 },

    #[error("messenger api error: {status} {body}")]
    Api { status: u16, body: String },
}
