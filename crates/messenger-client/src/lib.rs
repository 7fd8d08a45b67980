//! Thin client over a Telegram-shaped bot API: send a message, optionally
//! into a specific forum topic. No retry, rate limiting or domain logic
//! here, same philosophy as `jobboard_client` and the teacher's own
//! `twilio` client — that belongs one layer up, in the notifier pipeline.

pub mod error;

use error::MessengerError;
use reqwest::StatusCode;
use serde_json::json;

#[derive(Debug, Clone)]
pub struct MessengerClient {
    http: reqwest::Client,
    bot_token: String,
}

impl MessengerClient {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
        }
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        message_thread_id: Option<i64>,
        text: &str,
    ) -> Result<(), MessengerError> {
        let url = format!(
            "https://api.telegram.org/bot{token}/sendMessage",
            token = self.bot_token
        );

        let mut body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "Markdown",
        });
        if let Some(thread_id) = message_thread_id {
            body["message_thread_id"] = json!(thread_id);
        }

        let response = self.http.post(&url).json(&body).send().await?;
        Self::classify(response, chat_id).await
    }

    /// Ships a dossier as a document-with-caption (§4.4 step 5): the
    /// notifier's only way of delivering a full transcript, since the
    /// transcript itself is too long to fit in a single message body.
    pub async fn send_document(
        &self,
        chat_id: i64,
        message_thread_id: Option<i64>,
        filename: &str,
        file_contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), MessengerError> {
        let url = format!(
            "https://api.telegram.org/bot{token}/sendDocument",
            token = self.bot_token
        );

        let part = reqwest::multipart::Part::bytes(file_contents)
            .file_name(filename.to_string())
            .mime_str("text/plain")
            .unwrap_or_else(|_| reqwest::multipart::Part::bytes(Vec::new()));

        let mut form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id.to_string())
            .text("caption", caption.to_string())
            .text("parse_mode", "Markdown")
            .part("document", part);
        if let Some(thread_id) = message_thread_id {
            form = form.text("message_thread_id", thread_id.to_string());
        }

        let response = self.http.post(&url).multipart(form).send().await?;
        Self::classify(response, chat_id).await
    }

    async fn classify(response: reqwest::Response, chat_id: i64) -> Result<(), MessengerError> {
        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::FORBIDDEN | StatusCode::BAD_REQUEST => {
                Err(MessengerError::ChatUnreachable { chat_id })
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(MessengerError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
