//! Fluent JSON-only request builder. Every structured call to the model
//! goes through this: the prompt states the schema, the response is parsed
//! as JSON, and a parse failure feeds the error straight back into the next
//! attempt's prompt rather than raising an exception up through the
//! pipeline.

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::error::LlmError;
use crate::types::{Completion, Usage};

/// Narrow seam the request builder talks to, so tests can swap in a mock
/// without standing up an HTTP server. [`crate::client::AnthropicClient`]
/// is the only production implementation.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        model: Option<&str>,
        system_prompt: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<Completion, LlmError>;
}

/// One call attempt, successful or not, with the usage it billed. Callers
/// persist these directly as [`recruiting_common::models::LlmUsageLogRow`]
/// rows rather than only logging the final outcome.
#[derive(Debug, Clone)]
pub struct LlmAttempt {
    pub attempt_number: u32,
    pub usage: Usage,
    pub error: Option<String>,
}

pub struct LlmRequest<'a> {
    client: &'a dyn CompletionBackend,
    system_prompt: String,
    user_message: String,
    schema_hint: Option<String>,
    model: Option<String>,
    max_tokens: u32,
    max_retries: u32,
}

impl<'a> LlmRequest<'a> {
    pub fn new(client: &'a dyn CompletionBackend) -> Self {
        Self {
            client,
            system_prompt: String::new(),
            user_message: String::new(),
            schema_hint: None,
            model: None,
            max_tokens: 1024,
            max_retries: 3,
        }
    }

    pub fn system(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn user(mut self, message: impl Into<String>) -> Self {
        self.user_message = message.into();
        self
    }

    pub fn schema_hint(mut self, hint: impl Into<String>) -> Self {
        self.schema_hint = Some(hint.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Raw text, no JSON parsing or retry-on-parse-failure (retries still
    /// happen on transport/rate-limit errors).
    pub async fn text(self) -> Result<(String, Vec<LlmAttempt>), LlmError> {
        let mut attempts = Vec::new();
        let mut last_error = None;

        for attempt_number in 0..self.max_retries {
            match self
                .client
                .complete(
                    self.model.as_deref(),
                    &self.system_prompt,
                    &self.user_message,
                    self.max_tokens,
                )
                .await
            {
                Ok(completion) => {
                    attempts.push(LlmAttempt {
                        attempt_number,
                        usage: completion.usage,
                        error: None,
                    });
                    return Ok((completion.text, attempts));
                }
                Err(err) => {
                    attempts.push(LlmAttempt {
                        attempt_number,
                        usage: Usage::default(),
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err);
                }
            }
        }

        Err(last_error.expect("at least one attempt runs"))
    }

    /// Parses the model's final response as `T`, retrying with the parse
    /// error fed back into the prompt on failure. On total failure the
    /// attempt log made so far comes back alongside the error so the
    /// caller can still bill every attempt (including the failed ones at
    /// zero cost) rather than losing that history to the error path.
    pub async fn output<T: DeserializeOwned>(self) -> Result<(T, Vec<LlmAttempt>), (LlmError, Vec<LlmAttempt>)> {
        let base_user_message = self.user_message.clone();
        let schema_hint = self.schema_hint.clone().unwrap_or_default();

        let mut attempts = Vec::new();
        let mut last_error: Option<LlmError> = None;
        let mut user_message = build_initial_prompt(&base_user_message, &schema_hint);

        for attempt_number in 0..self.max_retries {
            let completion = self
                .client
                .complete(
                    self.model.as_deref(),
                    &self.system_prompt,
                    &user_message,
                    self.max_tokens,
                )
                .await;

            let completion = match completion {
                Ok(c) => c,
                Err(err) => {
                    attempts.push(LlmAttempt {
                        attempt_number,
                        usage: Usage::default(),
                        error: Some(err.to_string()),
                    });
                    last_error = Some(err);
                    continue;
                }
            };

            match serde_json::from_str::<T>(completion.text.trim()) {
                Ok(value) => {
                    attempts.push(LlmAttempt {
                        attempt_number,
                        usage: completion.usage,
                        error: None,
                    });
                    return Ok((value, attempts));
                }
                Err(parse_err) => {
                    let message = format!("invalid JSON: {parse_err}");
                    attempts.push(LlmAttempt {
                        attempt_number,
                        usage: completion.usage,
                        error: Some(message.clone()),
                    });
                    user_message = build_retry_prompt(&base_user_message, &schema_hint, &message);
                    last_error = Some(LlmError::InvalidJson(message));
                }
            }
        }

        Err((last_error.expect("at least one attempt runs"), attempts))
    }
}

fn build_initial_prompt(user_message: &str, schema_hint: &str) -> String {
    if schema_hint.is_empty() {
        format!("{user_message}\n\nRespond with JSON only, no markdown fences, no commentary.")
    } else {
        format!(
            "{user_message}\n\nRespond with JSON matching this shape:\n{schema_hint}\n\n\
             JSON only, no markdown fences, no commentary."
        )
    }
}

fn build_retry_prompt(user_message: &str, schema_hint: &str, last_error: &str) -> String {
    format!(
        "{}\n\nYour previous response could not be parsed: {last_error}\n\
         Respond again with valid JSON only, no markdown fences, no commentary.",
        build_initial_prompt(user_message, schema_hint)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Qualification {
        qualified: bool,
    }

    struct MockAi {
        responses: Mutex<Vec<&'static str>>,
        calls: AtomicU32,
    }

    impl MockAi {
        fn new(responses: Vec<&'static str>) -> Self {
            Self {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for MockAi {
        async fn complete(
            &self,
            _model: Option<&str>,
            _system_prompt: &str,
            _user_message: &str,
            _max_tokens: u32,
        ) -> Result<Completion, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let text = responses.remove(0);
            Ok(Completion {
                text: text.to_string(),
                usage: Usage::default(),
            })
        }
    }

    #[tokio::test]
    async fn parses_on_first_attempt() {
        let mock = MockAi::new(vec![r#"{"qualified": true}"#]);
        let (value, attempts) = LlmRequest::new(&mock)
            .system("system")
            .user("user")
            .output::<Qualification>()
            .await
            .unwrap();
        assert!(value.qualified);
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn retries_on_invalid_json_then_succeeds() {
        let mock = MockAi::new(vec!["not json", r#"{"qualified": false}"#]);
        let (value, attempts) = LlmRequest::new(&mock)
            .system("system")
            .user("user")
            .max_retries(3)
            .output::<Qualification>()
            .await
            .unwrap();
        assert!(!value.qualified);
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].error.is_some());
        assert!(attempts[1].error.is_none());
    }

    #[tokio::test]
    async fn fails_after_exhausting_retries() {
        let mock = MockAi::new(vec!["not json", "still not json", "nope"]);
        let result = LlmRequest::new(&mock)
            .system("system")
            .user("user")
            .max_retries(3)
            .output::<Qualification>()
            .await;
        assert!(result.is_err());
    }
}
