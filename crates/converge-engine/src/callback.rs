//! Provider callback client.
//!
//! Fire-and-continue HTTP calls to the provider procedures that resolve
//! diffs. Requests carry a bounded timeout; the resolver never blocks
//! waiting for a diff to actually resolve.

use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use converge_core::{Diff, Entity};

/// Default bound on a single callback request.
pub const DEFAULT_CALLBACK_TIMEOUT_SECS: u64 = 10;

/// Errors from provider callback invocations.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// Request failed to complete.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Handler responded with a non-success status.
    #[error("handler returned status {0}")]
    UnexpectedStatus(u16),

    /// Handler responded with a body that is neither empty nor a number.
    #[error("handler returned an invalid delay: {0:?}")]
    InvalidDelay(String),
}

/// Result type for callback operations.
pub type CallbackResult<T> = Result<T, CallbackError>;

/// Liveness-probe address for a diff fired at a signature's handler.
#[must_use]
pub fn handler_url(base_callback_url: &str) -> String {
    format!("{}/healthcheck", base_callback_url.trim_end_matches('/'))
}

/// HTTP client for provider diff handlers.
#[derive(Debug, Clone)]
pub struct CallbackClient {
    http_client: Client,
}

impl CallbackClient {
    /// Create a client with a bounded request timeout.
    pub fn new(timeout: Duration) -> CallbackResult<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent("converge-resolver/0.1")
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http_client })
    }

    /// Invoke the procedure resolving a diff.
    ///
    /// The body carries the entity's identity and both state documents
    /// plus the matched diff fields. A non-empty response body is the
    /// number of seconds to wait before the next liveness check.
    pub async fn invoke_diff_handler(
        &self,
        diff: &Diff,
        entity: &Entity,
    ) -> CallbackResult<Option<u64>> {
        let body = json!({
            "metadata": entity.metadata,
            "spec": entity.spec,
            "status": entity.status,
            "input": diff.diff_fields,
        });

        let response = self
            .http_client
            .post(diff.intentful_signature.procedural_callback_url.as_str())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CallbackError::UnexpectedStatus(status.as_u16()));
        }

        let text = response.text().await?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        trimmed
            .parse::<f64>()
            .map(|seconds| Some(seconds.max(0.0).round() as u64))
            .map_err(|_| CallbackError::InvalidDelay(trimmed.to_string()))
    }

    /// Probe a diff handler's liveness at its healthcheck address.
    pub async fn probe_handler(&self, handler_url: &str) -> CallbackResult<()> {
        debug!(url = %handler_url, "Probing diff handler liveness");
        let response = self.http_client.get(handler_url).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(CallbackError::UnexpectedStatus(status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_url_normalizes_trailing_slash() {
        assert_eq!(
            handler_url("http://provider/"),
            "http://provider/healthcheck"
        );
        assert_eq!(
            handler_url("http://provider"),
            "http://provider/healthcheck"
        );
    }
}
