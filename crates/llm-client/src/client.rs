use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::json;
use tokio::sync::Semaphore;

use crate::error::LlmError;
use crate::request::CompletionBackend;
use crate::types::{Completion, MessagesResponse};

const API_BASE: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: Client,
    api_key: String,
    default_model: String,
    /// Bounds total in-flight calls across every caller sharing this
    /// client (§5: "LLM client has its own concurrency limiter, default
    /// 40"), built straight from a semaphore rather than a governor crate.
    concurrency: Arc<Semaphore>,
}

impl AnthropicClient {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_options(api_key, None, 40)
    }

    pub fn with_options(
        api_key: impl Into<String>,
        proxy_url: Option<&str>,
        concurrency_limit: usize,
    ) -> Self {
        let mut builder = Client::builder();
        if let Some(proxy_url) = proxy_url {
            if let Ok(proxy) = reqwest::Proxy::all(proxy_url) {
                builder = builder.proxy(proxy);
            }
        }
        Self {
            http: builder.build().unwrap_or_default(),
            api_key: api_key.into(),
            default_model: "claude-3-5-sonnet-20241022".to_string(),
            concurrency: Arc::new(Semaphore::new(concurrency_limit.max(1))),
        }
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub async fn complete(
        &self,
        model: Option<&str>,
        system_prompt: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let _permit = self
            .concurrency
            .clone()
            .acquire_owned()
            .await
            .expect("semaphore never closed");
        let response = self
            .http
            .post(API_BASE)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&json!({
                "model": model.unwrap_or(&self.default_model),
                "max_tokens": max_tokens,
                "system": system_prompt,
                "messages": [{ "role": "user", "content": user_message }],
            }))
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED => return Err(LlmError::Unauthorized),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                return Err(LlmError::RateLimited { retry_after_secs });
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(LlmError::Api {
                    status: status.as_u16(),
                    body,
                });
            }
            _ => {}
        }

        let parsed: MessagesResponse = response.json().await?;
        let text = parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .collect::<Vec<_>>()
            .join("");

        Ok(Completion {
            text,
            usage: parsed.usage,
        })
    }
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    async fn complete(
        &self,
        model: Option<&str>,
        system_prompt: &str,
        user_message: &str,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        AnthropicClient::complete(self, model, system_prompt, user_message, max_tokens).await
    }
}
