//! Slack Web API transport — wire types, the call trait, and the reqwest
//! implementation.
//!
//! Slack reports vendor errors in-band (`ok: false` plus an error code), so
//! every call decodes into an envelope; only transport faults become `Err`.

use async_trait::async_trait;
use dmcast_core::error::{DmCastError, Result};
use dmcast_core::types::Recipient;
use serde::{Deserialize, Serialize};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// `auth.test` response.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthTestResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

/// A workspace member as returned by `users.list` / `users.info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub profile: MemberProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub real_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl Member {
    /// Collapse the profile into the domain `Recipient` shape: best display
    /// name wins (profile display name, else real name, else account name).
    pub fn to_recipient(&self) -> Recipient {
        let display_name = self
            .profile
            .display_name
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| self.real_name.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| self.name.clone());
        Recipient {
            id: self.id.clone(),
            name: self.name.clone(),
            display_name,
            real_name: self.real_name.clone(),
            email: self.profile.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsersListResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub members: Vec<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserInfoResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub user: Option<Member>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConversationsOpenResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub channel: Option<ChannelRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostMessageResponse {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub ts: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
}

/// The Slack Web API calls the sender needs. Object-safe so tests can swap
/// an in-memory fake for the HTTP transport.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<AuthTestResponse>;
    async fn users_list(&self) -> Result<UsersListResponse>;
    async fn users_info(&self, user_id: &str) -> Result<UserInfoResponse>;
    async fn conversations_open(&self, user_id: &str) -> Result<ConversationsOpenResponse>;
    async fn chat_post_message(&self, channel_id: &str, text: &str)
    -> Result<PostMessageResponse>;
}

/// reqwest-backed transport with Bearer-token auth.
pub struct HttpSlackApi {
    token: String,
    client: reqwest::Client,
}

impl HttpSlackApi {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{SLACK_API_BASE}/{method}")
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(self.api_url(method))
            .header("Authorization", format!("Bearer {}", self.token))
            .json(body)
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| DmCastError::Api(format!("{method} request failed: {e}")))?;

        response
            .json()
            .await
            .map_err(|e| DmCastError::Api(format!("Invalid {method} response: {e}")))
    }
}

#[async_trait]
impl SlackApi for HttpSlackApi {
    async fn auth_test(&self) -> Result<AuthTestResponse> {
        self.call("auth.test", &serde_json::json!({})).await
    }

    async fn users_list(&self) -> Result<UsersListResponse> {
        self.call("users.list", &serde_json::json!({})).await
    }

    async fn users_info(&self, user_id: &str) -> Result<UserInfoResponse> {
        self.call("users.info", &serde_json::json!({ "user": user_id }))
            .await
    }

    async fn conversations_open(&self, user_id: &str) -> Result<ConversationsOpenResponse> {
        self.call("conversations.open", &serde_json::json!({ "users": user_id }))
            .await
    }

    async fn chat_post_message(
        &self,
        channel_id: &str,
        text: &str,
    ) -> Result<PostMessageResponse> {
        self.call(
            "chat.postMessage",
            &serde_json::json!({ "channel": channel_id, "text": text }),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_deserializes_with_sparse_profile() {
        let member: Member =
            serde_json::from_str(r#"{"id": "U1", "name": "jdoe"}"#).unwrap();
        assert!(!member.deleted);
        assert!(member.profile.display_name.is_none());
    }

    #[test]
    fn test_to_recipient_display_name_fallbacks() {
        let mut member: Member = serde_json::from_value(serde_json::json!({
            "id": "U1",
            "name": "jdoe",
            "real_name": "John Doe",
            "profile": {"display_name": "", "email": "jd@acme.test"}
        }))
        .unwrap();
        assert_eq!(member.to_recipient().display_name, "John Doe");

        member.profile.display_name = Some("JD".into());
        assert_eq!(member.to_recipient().display_name, "JD");

        member.profile.display_name = None;
        member.real_name = None;
        assert_eq!(member.to_recipient().display_name, "jdoe");
    }

    #[test]
    fn test_vendor_error_envelope() {
        let response: PostMessageResponse =
            serde_json::from_str(r#"{"ok": false, "error": "channel_not_found"}"#).unwrap();
        assert!(!response.ok);
        assert_eq!(response.error.as_deref(), Some("channel_not_found"));
    }
}
