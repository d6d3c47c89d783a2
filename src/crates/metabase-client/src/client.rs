//! Read-only HTTP client for the Metabase API.
//!
//! Every request carries the `x-api-key` header and waits out a minimum
//! delay since the previous request, on top of the executor's own pacing.
//! Transient failures (5xx, 429, connect errors, timeouts) are retried with
//! exponential backoff.

use crate::card::Card;
use crate::collection::Collection;
use crate::config::MetabaseConfig;
use crate::error::{MetabaseError, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

const USER_AGENT: &str = concat!("reportctx-metabase-reader/", env!("CARGO_PKG_VERSION"));
const BACKOFF_MULTIPLIER: f32 = 2.0;

/// Source of card details keyed by card id.
#[async_trait]
pub trait CardLookup: Send + Sync {
    /// `Ok(None)` when the card does not exist.
    async fn get_card(&self, id: u64) -> Result<Option<Card>>;
}

#[async_trait]
impl<T: CardLookup + ?Sized> CardLookup for &T {
    async fn get_card(&self, id: u64) -> Result<Option<Card>> {
        (**self).get_card(id).await
    }
}

#[async_trait]
impl<T: CardLookup + ?Sized> CardLookup for Arc<T> {
    async fn get_card(&self, id: u64) -> Result<Option<Card>> {
        (**self).get_card(id).await
    }
}

/// Source of whole-instance listings, used to discover catalogs.
#[async_trait]
pub trait CardListing: Send + Sync {
    /// Every card visible to the key, with list-level fields only.
    async fn list_cards(&self) -> Result<Vec<Card>>;

    async fn list_collections(&self) -> Result<Vec<Collection>>;
}

#[async_trait]
impl<T: CardListing + ?Sized> CardListing for &T {
    async fn list_cards(&self) -> Result<Vec<Card>> {
        (**self).list_cards().await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        (**self).list_collections().await
    }
}

#[async_trait]
impl<T: CardListing + ?Sized> CardListing for Arc<T> {
    async fn list_cards(&self) -> Result<Vec<Card>> {
        (**self).list_cards().await
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        (**self).list_collections().await
    }
}

/// The user the API key belongs to.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentUser {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub email: Option<String>,
}

pub struct MetabaseClient {
    config: MetabaseConfig,
    client: Client,
    last_request: Mutex<Option<Instant>>,
}

impl std::fmt::Debug for MetabaseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetabaseClient")
            .field("base_url", &self.config.base_url)
            .field("api_delay", &self.config.api_delay)
            .field("request_timeout", &self.config.request_timeout)
            .finish_non_exhaustive()
    }
}

impl MetabaseClient {
    pub fn new(config: MetabaseConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MetabaseError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            config,
            client,
            last_request: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &MetabaseConfig {
        &self.config
    }

    /// Absolute URL for an API path such as `card/42`.
    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url, path.trim_start_matches('/'))
    }

    /// Verify the key works; returns the user it authenticates as.
    pub async fn test_connection(&self) -> Result<CurrentUser> {
        let response = self.get("user/current").await?;
        let user: CurrentUser = parse_success(response).await?;
        tracing::info!(
            email = user.email.as_deref().unwrap_or("unknown"),
            "Connected to Metabase"
        );
        Ok(user)
    }

    async fn get(&self, path: &str) -> Result<Response> {
        let url = self.api_url(path);
        let req = self
            .client
            .get(&url)
            .header("x-api-key", &self.config.api_key)
            .header("Content-Type", "application/json");
        self.send_with_retry(req).await
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.config.api_delay;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    async fn send_with_retry(&self, req: reqwest::RequestBuilder) -> Result<Response> {
        let mut attempts = 0;
        let mut delay = self.config.retry_delay;

        loop {
            let request = req.try_clone().ok_or_else(|| {
                MetabaseError::ConfigError("Failed to clone request".to_string())
            })?;

            self.throttle().await;

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if !is_retryable_status(status) || attempts >= self.config.max_retries {
                        return Ok(response);
                    }
                    tracing::warn!(status = status.as_u16(), attempt = attempts + 1, "Retrying Metabase request");
                }
                Err(e) => {
                    if attempts >= self.config.max_retries || !(e.is_timeout() || e.is_connect()) {
                        if e.is_timeout() {
                            return Err(MetabaseError::Timeout(e.to_string()));
                        }
                        return Err(MetabaseError::HttpError(e));
                    }
                    tracing::warn!(error = %e, attempt = attempts + 1, "Retrying Metabase request");
                }
            }

            attempts += 1;
            tokio::time::sleep(delay).await;
            delay = Duration::from_secs_f32(delay.as_secs_f32() * BACKOFF_MULTIPLIER);
        }
    }
}

#[async_trait]
impl CardLookup for MetabaseClient {
    async fn get_card(&self, id: u64) -> Result<Option<Card>> {
        let response = self.get(&format!("card/{}", id)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!(card_id = id, "Card not found");
            return Ok(None);
        }
        parse_success(response).await.map(Some)
    }
}

#[async_trait]
impl CardListing for MetabaseClient {
    async fn list_cards(&self) -> Result<Vec<Card>> {
        let cards: Vec<Card> = parse_success(self.get("card").await?).await?;
        tracing::info!(cards = cards.len(), "Listed Metabase cards");
        Ok(cards)
    }

    async fn list_collections(&self) -> Result<Vec<Collection>> {
        let collections: Vec<Collection> = parse_success(self.get("collection").await?).await?;
        tracing::debug!(collections = collections.len(), "Listed Metabase collections");
        Ok(collections)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Map a non-success status to the matching error.
pub fn classify_status(status: StatusCode, body: String) -> MetabaseError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            MetabaseError::AuthenticationError(format!("{}: {}", status.as_u16(), body))
        }
        _ => MetabaseError::ApiError {
            status: status.as_u16(),
            body,
        },
    }
}

async fn parse_success<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(classify_status(status, body));
    }
    Ok(serde_json::from_str(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> MetabaseClient {
        MetabaseClient::new(
            MetabaseConfig::new("https://bi.example.com/", "mb_key")
                .with_api_delay(Duration::from_millis(50)),
        )
        .unwrap()
    }

    #[test]
    fn test_api_url() {
        let c = client();
        assert_eq!(c.api_url("card/42"), "https://bi.example.com/api/card/42");
        assert_eq!(c.api_url("/user/current"), "https://bi.example.com/api/user/current");
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        assert!(MetabaseClient::new(MetabaseConfig::new("", "k")).is_err());
    }

    #[test]
    fn test_debug_hides_api_key() {
        let rendered = format!("{:?}", client());
        assert!(!rendered.contains("mb_key"));
        assert!(rendered.contains("bi.example.com"));
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, String::new()),
            MetabaseError::AuthenticationError(_)
        ));
        let err = classify_status(StatusCode::BAD_GATEWAY, "upstream".into());
        assert!(err.is_retryable());
        let err = classify_status(StatusCode::BAD_REQUEST, "nope".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_requests() {
        let c = client();
        let start = Instant::now();
        c.throttle().await;
        c.throttle().await;
        c.throttle().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }
}
