//! HTTP client for the activity collector.
//!
//! The collector exposes two endpoints: an unauthenticated one for
//! token-mode records and a bearer-authenticated one for login-mode
//! records. Only the response status is inspected; failure bodies are
//! carried in the error for logging.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use super::payload::{AuthLogPayload, TokenLogPayload};
use crate::config::CollectorConfig;

/// Errors that can occur while delivering a record.
#[derive(Error, Debug)]
pub enum DeliveryError {
    /// Transport failure (connection refused, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success status from the collector.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The collector rejected the bearer credential.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DeliveryError {
    /// Whether the failure indicates an expired or revoked credential
    pub fn is_credential_rejected(&self) -> bool {
        matches!(self, DeliveryError::Unauthorized(_))
    }

    /// Whether a later attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            DeliveryError::Http(_) => true,
            DeliveryError::Api { status, .. } => *status >= 500 || *status == 429 || *status == 408,
            DeliveryError::Unauthorized(_) => true,
        }
    }

    /// Status code, when the collector answered
    pub fn status(&self) -> Option<u16> {
        match self {
            DeliveryError::Http(e) => e.status().map(|s| s.as_u16()),
            DeliveryError::Api { status, .. } => Some(*status),
            DeliveryError::Unauthorized(_) => Some(StatusCode::UNAUTHORIZED.as_u16()),
        }
    }
}

/// Delivery side of the dispatcher
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Collector: Send + Sync {
    /// POST a token-mode record
    async fn send_token_log(&self, payload: &TokenLogPayload) -> Result<(), DeliveryError>;

    /// POST a login-mode record with `bearer` as the credential
    async fn send_auth_log(
        &self,
        payload: &AuthLogPayload,
        bearer: &str,
    ) -> Result<(), DeliveryError>;
}

/// [`Collector`] backed by `reqwest`
pub struct HttpCollector {
    client: Client,
    token_log_url: String,
    auth_log_url: String,
}

impl HttpCollector {
    /// Creates a new collector client.
    ///
    /// # Errors
    ///
    /// Returns `DeliveryError::Http` if the HTTP client cannot be created.
    pub fn new(config: &CollectorConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client,
            token_log_url: config.token_log_url(),
            auth_log_url: config.auth_log_url(),
        })
    }

    async fn check(response: reqwest::Response) -> Result<(), DeliveryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(DeliveryError::Unauthorized(body))
            }
            _ => Err(DeliveryError::Api {
                status: status.as_u16(),
                message: body,
            }),
        }
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn send_token_log(&self, payload: &TokenLogPayload) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.token_log_url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;
        Self::check(response).await?;
        debug!(url = %payload.url, duration = payload.duration, "Token log delivered");
        Ok(())
    }

    async fn send_auth_log(
        &self,
        payload: &AuthLogPayload,
        bearer: &str,
    ) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.auth_log_url)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await?;
        Self::check(response).await?;
        debug!(url = %payload.url, duration = payload.duration, "Auth log delivered");
        Ok(())
    }
}
