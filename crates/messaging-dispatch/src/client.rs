//! HTTP client for webhook delivery.
//!
//! Posts one JSON payload per message to the configured endpoint and treats
//! only `202 Accepted` with a well-formed body as success. No retries happen
//! here; a retry policy, if ever added, belongs in a layer above.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{error::WebhookError, DEFAULT_WEBHOOK_TIMEOUT_SECS};

/// Upper bound on response-body text kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 2048;

/// Configuration for the webhook client.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    /// Destination endpoint.
    pub url: String,

    /// Per-request deadline, applied in addition to caller cancellation.
    pub timeout: Duration,

    /// User agent string for requests.
    pub user_agent: String,
}

impl WebhookConfig {
    /// Creates a configuration with default timeout and user agent.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            user_agent: "automatic-messaging/0.1".to_string(),
        }
    }
}

/// Outbound request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest<'a> {
    phone_number: &'a str,
    message: &'a str,
}

/// Expected `202 Accepted` response body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    #[allow(dead_code)]
    message: String,
    #[serde(default)]
    message_id: String,
}

/// HTTP client posting messages to the remote webhook.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl WebhookClient {
    /// Creates a new client from the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::Configuration` if the underlying HTTP client
    /// cannot be built.
    pub fn new(config: WebhookConfig) -> Result<Self, WebhookError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| WebhookError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, url: config.url, timeout: config.timeout })
    }

    /// Sends one message and returns the webhook-assigned remote id.
    ///
    /// Success requires a `202 Accepted` status and a JSON body carrying a
    /// non-empty `messageId`. Every other outcome is an error whose text
    /// carries the status code and (truncated) body for diagnostics.
    ///
    /// Cancellation is observed while the request is in flight; the request
    /// also carries its own fixed deadline.
    ///
    /// # Errors
    ///
    /// See [`WebhookError`] for the full taxonomy.
    pub async fn send(
        &self,
        phone_number: &str,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<String, WebhookError> {
        let (status, body) = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(WebhookError::Cancelled),
            outcome = self.dispatch(phone_number, content) => outcome?,
        };

        debug!(status, "webhook responded");

        if status != 202 {
            return Err(WebhookError::UnexpectedStatus { status, body });
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| WebhookError::InvalidBody { reason: e.to_string(), body: body.clone() })?;

        if parsed.message_id.is_empty() {
            return Err(WebhookError::MissingMessageId { body });
        }

        Ok(parsed.message_id)
    }

    /// Performs the POST and reads the response, classifying transport
    /// failures.
    async fn dispatch(
        &self,
        phone_number: &str,
        content: &str,
    ) -> Result<(u16, String), WebhookError> {
        let request = SendRequest { phone_number, message: content };

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify_transport_error(&e))?;

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(text) => truncate_body(text),
            Err(e) => return Err(self.classify_transport_error(&e)),
        };

        Ok((status, body))
    }

    fn classify_transport_error(&self, error: &reqwest::Error) -> WebhookError {
        if error.is_timeout() {
            WebhookError::Timeout { seconds: self.timeout.as_secs() }
        } else if error.is_connect() {
            WebhookError::Network(format!("connection failed: {error}"))
        } else {
            WebhookError::Network(error.to_string())
        }
    }
}

/// Bounds body text kept in error messages and logs.
fn truncate_body(body: String) -> String {
    if body.len() <= MAX_DIAGNOSTIC_BODY {
        return body;
    }

    let mut cut = MAX_DIAGNOSTIC_BODY;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... (truncated)", &body[..cut])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_bodies_pass_through() {
        assert_eq!(truncate_body("ok".to_string()), "ok");
    }

    #[test]
    fn long_bodies_are_truncated_on_char_boundaries() {
        let body = "é".repeat(MAX_DIAGNOSTIC_BODY);
        let truncated = truncate_body(body);
        assert!(truncated.ends_with("... (truncated)"));
        assert!(truncated.len() < MAX_DIAGNOSTIC_BODY + 20);
    }
}
