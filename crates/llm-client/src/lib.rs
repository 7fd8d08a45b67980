pub mod client;
pub mod error;
pub mod request;
pub mod types;

pub use client::AnthropicClient;
pub use error::LlmError;
pub use request::{CompletionBackend, LlmAttempt, LlmRequest};
pub use types::{Completion, Usage};
