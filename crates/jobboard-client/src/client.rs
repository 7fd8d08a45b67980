use reqwest::{Client, StatusCode};
use serde_json::json;

use crate::error::JobBoardError;
use crate::limiter::RateLimiter;
use crate::types::{MessagesPage, Negotiation, NegotiationsPage, TokenResponse, Vacancy};

const API_BASE: &str = "https://api.hh.ru";
const TOKEN_URL: &str = "https://api.hh.ru/token";
const PER_PAGE: u32 = 50;

/// Pure REST client for the job board's negotiation/messaging API. Holds no
/// domain state beyond the credentials needed to authenticate a request;
/// token persistence and recruiter bookkeeping are the caller's job. Every
/// call acquires a permit from the shared [`RateLimiter`] first, so the
/// token-bucket rate cap and the in-flight concurrency cap apply uniformly
/// regardless of which recruiter or pipeline issues the request.
#[derive(Debug, Clone)]
pub struct JobBoardClient {
    http: Client,
    client_id: String,
    client_secret: String,
    limiter: RateLimiter,
}

impl JobBoardClient {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self::with_limits(client_id, client_secret, 100, 80)
    }

    pub fn with_limits(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        requests_per_sec: u32,
        max_concurrent: usize,
    ) -> Self {
        Self {
            http: Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            limiter: RateLimiter::new(requests_per_sec, max_concurrent),
        }
    }

    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, JobBoardError> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &self.client_id),
                ("client_secret", &self.client_secret),
            ])
            .send()
            .await?;

        Self::parse_json(response).await
    }

    pub async fn list_active_vacancies(
        &self,
        access_token: &str,
    ) -> Result<Vec<Vacancy>, JobBoardError> {
        #[derive(serde::Deserialize)]
        struct VacanciesResponse {
            items: Vec<Vacancy>,
        }

        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .get(format!("{API_BASE}/employer/vacancies"))
            .bearer_auth(access_token)
            .query(&[("per_page", "100")])
            .send()
            .await?;

        let parsed: VacanciesResponse = Self::parse_json(response).await?;
        Ok(parsed.items)
    }

    /// Resolves the employer id backing `list_active_vacancies`'s
    /// `/employer/vacancies` call (§4.1: `GET /me` → employer id).
    pub async fn current_employer_id(&self, access_token: &str) -> Result<String, JobBoardError> {
        #[derive(serde::Deserialize)]
        struct Me {
            employer: MeEmployer,
        }
        #[derive(serde::Deserialize)]
        struct MeEmployer {
            id: String,
        }

        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .get(format!("{API_BASE}/me"))
            .bearer_auth(access_token)
            .send()
            .await?;
        let parsed: Me = Self::parse_json(response).await?;
        Ok(parsed.employer.id)
    }

    /// Fetches a single negotiation, notably its current folder
    /// (`employer_state.id`) — used by the dojim loop to confirm a human
    /// recruiter hasn't already moved the candidate manually.
    pub async fn get_negotiation(
        &self,
        access_token: &str,
        negotiation_id: &str,
    ) -> Result<Negotiation, JobBoardError> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .get(format!("{API_BASE}/negotiations/{negotiation_id}"))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::parse_json(response).await
    }

    /// Pages through a negotiation folder for one vacancy, returning every
    /// item across all pages. `folder` is the board's folder name
    /// (`"active"`, `"response"`, etc).
    pub async fn list_negotiations(
        &self,
        access_token: &str,
        folder: &str,
        vacancy_id: &str,
        only_with_updates: bool,
    ) -> Result<Vec<crate::types::Negotiation>, JobBoardError> {
        let mut all_items = Vec::new();
        let mut page = 0u32;

        loop {
            let _permit = self.limiter.acquire().await;
            let mut query = vec![
                ("vacancy_id".to_string(), vacancy_id.to_string()),
                ("page".to_string(), page.to_string()),
                ("per_page".to_string(), PER_PAGE.to_string()),
                ("order_by".to_string(), "created_at".to_string()),
                ("order".to_string(), "desc".to_string()),
            ];
            if only_with_updates {
                let key = if folder == "response" {
                    "show_only_new_responses"
                } else {
                    "show_only_new"
                };
                query.push((key.to_string(), "true".to_string()));
            }

            let response = self
                .http
                .get(format!("{API_BASE}/negotiations/{folder}"))
                .bearer_auth(access_token)
                .query(&query)
                .send()
                .await?;

            let parsed: NegotiationsPage = Self::parse_json(response).await?;
            let is_last_page = page + 1 >= parsed.pages.max(1);
            all_items.extend(parsed.items);

            if is_last_page {
                break;
            }
            page += 1;
        }

        Ok(all_items)
    }

    pub async fn get_messages(
        &self,
        access_token: &str,
        messages_url: &str,
    ) -> Result<Vec<crate::types::Message>, JobBoardError> {
        let mut all_items = Vec::new();
        let mut page = 0u32;

        loop {
            let _permit = self.limiter.acquire().await;
            let response = self
                .http
                .get(messages_url)
                .bearer_auth(access_token)
                .query(&[("page", page.to_string()), ("per_page", PER_PAGE.to_string())])
                .send()
                .await?;

            let parsed: MessagesPage = Self::parse_json(response).await?;
            if parsed.items.is_empty() {
                break;
            }
            let is_last_page = page + 1 >= parsed.pages.max(1);
            all_items.extend(parsed.items);

            if is_last_page {
                break;
            }
            page += 1;
        }

        all_items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(all_items)
    }

    pub async fn send_message(
        &self,
        access_token: &str,
        negotiation_id: &str,
        text: &str,
    ) -> Result<(), JobBoardError> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .post(format!("{API_BASE}/negotiations/{negotiation_id}/messages"))
            .bearer_auth(access_token)
            .json(&json!({ "message": text }))
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let fatal = body
                .get("errors")
                .and_then(|errs| errs.as_array())
                .map(|errs| {
                    errs.iter().any(|e| {
                        matches!(
                            e.get("value").and_then(|v| v.as_str()),
                            Some("invalid_vacancy") | Some("resume_not_found")
                        )
                    })
                })
                .unwrap_or(false);

            if fatal {
                return Err(JobBoardError::NegotiationGone {
                    negotiation_id: negotiation_id.to_string(),
                });
            }
            return Err(JobBoardError::Api {
                status: 403,
                body: body.to_string(),
            });
        }

        Self::check_status(response).await?;
        Ok(())
    }

    pub async fn move_to_folder(
        &self,
        access_token: &str,
        negotiation_id: &str,
        folder: &str,
    ) -> Result<(), JobBoardError> {
        let _permit = self.limiter.acquire().await;
        let response = self
            .http
            .put(format!("{API_BASE}/negotiations/{folder}/{negotiation_id}"))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, JobBoardError> {
        let response = Self::check_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(JobBoardError::Decode)
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, JobBoardError> {
        match response.status() {
            StatusCode::UNAUTHORIZED => Err(JobBoardError::TokenRevoked),
            StatusCode::NOT_FOUND => Err(JobBoardError::NotFound),
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after_secs = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(JobBoardError::RateLimited { retry_after_secs })
            }
            status if status.is_success() => Ok(response),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(JobBoardError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
