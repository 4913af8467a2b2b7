//! DM dispatch — rate-limited Slack calls, vendor-error classification with
//! operator-facing remediation text, and bounded exponential-backoff retries.

use std::sync::Arc;
use std::time::Duration;

use dmcast_core::config::SlackConfig;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::{HttpSlackApi, SlackApi};
use crate::directory::DirectoryCache;

/// Synthetic code for faults below the Slack API (connect/decode failures).
pub const TRANSPORT_ERROR: &str = "transport_error";

/// Spaces out API calls: every call through one client waits until at least
/// `min_interval` has passed since the previous call, whatever the operation.
pub(crate) struct RateGate {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl RateGate {
    pub(crate) fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::new(None),
        }
    }

    pub(crate) async fn wait(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Outcome of one DM delivery attempt (or a whole retry run).
#[derive(Debug, Clone, Serialize)]
pub struct DispatchResult {
    pub success: bool,
    pub message_ts: Option<String>,
    pub channel: Option<String>,
    pub error: Option<String>,
    pub error_code: Option<String>,
    pub remediation: Option<String>,
}

impl DispatchResult {
    fn sent(message_ts: Option<String>, channel: String) -> Self {
        Self {
            success: true,
            message_ts,
            channel: Some(channel),
            error: None,
            error_code: None,
            remediation: None,
        }
    }

    fn failed(error: String, code: &str) -> Self {
        Self {
            success: false,
            message_ts: None,
            channel: None,
            error: Some(error),
            error_code: Some(code.to_string()),
            remediation: Some(remediation_for(code)),
        }
    }
}

/// Operator-facing remediation text for a vendor error code.
pub fn remediation_for(code: &str) -> String {
    match code {
        "missing_scope" => "Missing permission scopes. The Slack app needs chat:write, \
            users:read, and im:write. Add the scopes under OAuth & Permissions, reinstall \
            the app to the workspace, and use the newly issued token."
            .to_string(),
        "not_authed" => "The token is invalid or expired. Check that a valid User OAuth \
            token (xoxp-) is configured."
            .to_string(),
        "token_revoked" => {
            "The token has been revoked. Issue a new token and reconfigure.".to_string()
        }
        "account_inactive" => {
            "The authenticated account is deactivated in this workspace.".to_string()
        }
        "channel_not_found" => "Could not open a DM channel. Check that the recipient \
            exists and is a member of the workspace."
            .to_string(),
        "user_not_found" => "User not found. Check the user name or ID and that the user \
            is a member of the workspace."
            .to_string(),
        "cant_dm_bot" => "Direct messages cannot be sent to bots.".to_string(),
        "user_disabled" => "The recipient account is deactivated.".to_string(),
        "rate_limited" => {
            "Slack API rate limit reached. Wait a while before retrying.".to_string()
        }
        "team_access_not_granted" => {
            "The token does not have access to this workspace.".to_string()
        }
        other => format!(
            "Unrecognized Slack error '{other}'. See the Slack API documentation for details."
        ),
    }
}

/// Whether a failed attempt with this code is worth retrying. Permanent
/// rejections (bad token, unknown user, bot recipient) short-circuit the
/// retry loop; rate limits, transport faults, and unknown codes are retried.
pub fn is_retryable(code: &str) -> bool {
    !matches!(
        code,
        "missing_scope"
            | "not_authed"
            | "token_revoked"
            | "account_inactive"
            | "channel_not_found"
            | "user_not_found"
            | "cant_dm_bot"
            | "user_disabled"
            | "team_access_not_granted"
    )
}

/// One Slack session: a transport, a shared rate gate, and a directory cache.
/// Each batch job owns its own client (and therefore its own rate gate).
pub struct SlackClient {
    pub(crate) api: Arc<dyn SlackApi>,
    pub(crate) gate: RateGate,
    pub(crate) directory: DirectoryCache,
    max_retries: u32,
    base_delay: Duration,
}

impl SlackClient {
    pub fn new(token: &str, config: &SlackConfig) -> Self {
        Self::with_api(Arc::new(HttpSlackApi::new(token)), config)
    }

    /// Build on an explicit transport. Tests use this with an in-memory fake.
    pub fn with_api(api: Arc<dyn SlackApi>, config: &SlackConfig) -> Self {
        let delay = Duration::from_millis(config.rate_limit_delay_ms);
        Self {
            api,
            gate: RateGate::new(delay),
            directory: DirectoryCache::new(Duration::from_secs(config.directory_ttl_secs)),
            max_retries: config.max_retries,
            base_delay: delay,
        }
    }

    /// Lightweight identity check. Never propagates transport faults.
    pub async fn validate_token(&self) -> bool {
        self.gate.wait().await;
        match self.api.auth_test().await {
            Ok(response) if response.ok => true,
            Ok(response) => {
                tracing::error!(
                    "Token validation failed: {}",
                    response.error.unwrap_or_else(|| "unknown".into())
                );
                false
            }
            Err(e) => {
                tracing::error!("Token validation error: {e}");
                false
            }
        }
    }

    /// Send one DM: open the private channel, then post the message. Every
    /// failure carries the vendor code and remediation text.
    pub async fn send_dm(&self, user_id: &str, text: &str) -> DispatchResult {
        self.gate.wait().await;
        let channel = match self.api.conversations_open(user_id).await {
            Ok(response) if response.ok => match response.channel {
                Some(channel) => channel.id,
                None => {
                    return DispatchResult::failed(
                        "Failed to open DM channel: malformed response".to_string(),
                        TRANSPORT_ERROR,
                    );
                }
            },
            Ok(response) => {
                let code = response.error.unwrap_or_else(|| "unknown".into());
                return DispatchResult::failed(
                    format!("Failed to open DM channel: {code}"),
                    &code,
                );
            }
            Err(e) => {
                return DispatchResult::failed(format!("Slack API error: {e}"), TRANSPORT_ERROR);
            }
        };

        self.gate.wait().await;
        match self.api.chat_post_message(&channel, text).await {
            Ok(response) if response.ok => {
                tracing::debug!("DM posted to {user_id} via {channel}");
                DispatchResult::sent(response.ts, channel)
            }
            Ok(response) => {
                let code = response.error.unwrap_or_else(|| "unknown".into());
                DispatchResult::failed(format!("Failed to send message: {code}"), &code)
            }
            Err(e) => DispatchResult::failed(format!("Slack API error: {e}"), TRANSPORT_ERROR),
        }
    }

    /// Send with bounded retries and exponential backoff
    /// (`base_delay * 2^attempt` before each retry, none after the last).
    /// Permanent vendor errors stop the loop immediately.
    pub async fn send_dm_with_retry(
        &self,
        user_id: &str,
        text: &str,
        max_retries: Option<u32>,
    ) -> DispatchResult {
        let max_retries = max_retries.unwrap_or(self.max_retries);
        let mut last_error = String::new();

        for attempt in 0..=max_retries {
            let result = self.send_dm(user_id, text).await;
            if result.success {
                if attempt > 0 {
                    tracing::info!("Sent DM to {user_id} after {attempt} retries");
                }
                return result;
            }

            if let Some(code) = result.error_code.clone()
                && !is_retryable(&code)
            {
                tracing::warn!("Permanent error for {user_id}: {code}, not retrying");
                return result;
            }

            last_error = result
                .error
                .unwrap_or_else(|| "unknown error".to_string());

            if attempt < max_retries {
                let wait = self.base_delay * 2u32.saturating_pow(attempt);
                tracing::warn!(
                    "Attempt {} failed for {user_id}: {last_error}. Retrying in {wait:?}...",
                    attempt + 1
                );
                tokio::time::sleep(wait).await;
            }
        }

        tracing::error!(
            "All {} attempts failed for {user_id}: {last_error}",
            max_retries + 1
        );
        DispatchResult {
            success: false,
            message_ts: None,
            channel: None,
            error: Some(format!(
                "Failed after {} attempts: {last_error}",
                max_retries + 1
            )),
            error_code: None,
            remediation: None,
        }
    }
}
