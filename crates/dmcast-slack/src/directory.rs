//! Workspace directory resolution — a TTL-cached bulk member listing plus
//! name and id lookups.
//!
//! One normalization rule applies to every lookup path: a single leading `@`
//! is stripped and the input trimmed, then matching is exact and
//! case-sensitive. `find_by_name` itself matches verbatim.

use std::time::Duration;

use dmcast_core::importer::ImportRecord;
use dmcast_core::types::{Recipient, UserVariables};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::api::Member;
use crate::client::SlackClient;

/// Platform user ids follow a fixed convention: marker prefix + fixed length.
const USER_ID_PREFIX: char = 'U';
const USER_ID_LEN: usize = 11;

/// A cached snapshot of the full member directory.
pub(crate) struct DirectoryCache {
    snapshot: Mutex<CachedSnapshot>,
    ttl: Duration,
}

struct CachedSnapshot {
    members: Vec<Member>,
    fetched_at: Option<Instant>,
}

impl DirectoryCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        Self {
            snapshot: Mutex::new(CachedSnapshot {
                members: Vec::new(),
                fetched_at: None,
            }),
            ttl,
        }
    }
}

/// Strip a single leading `@` and surrounding whitespace. Matching stays
/// case-sensitive.
pub fn normalize_handle(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed.strip_prefix('@').unwrap_or(trimmed)
}

/// Whether an identifier already looks like a platform user id.
pub fn looks_like_user_id(identifier: &str) -> bool {
    identifier.len() == USER_ID_LEN && identifier.starts_with(USER_ID_PREFIX)
}

/// Exact-match lookup against canonical name, real name, and the two
/// profile-derived name fields. Deactivated members are skipped; first match
/// wins.
pub fn find_by_name<'a>(members: &'a [Member], name: &str) -> Option<&'a Member> {
    members
        .iter()
        .filter(|member| !member.deleted)
        .find(|member| {
            member.name == name
                || member.real_name.as_deref() == Some(name)
                || member.profile.display_name.as_deref() == Some(name)
                || member.profile.real_name.as_deref() == Some(name)
        })
}

impl SlackClient {
    /// Bulk-fetch the member directory, reusing a snapshot younger than the
    /// TTL. A failed refetch falls back to the previous (possibly empty)
    /// snapshot; callers must tolerate a degraded directory.
    pub async fn directory_snapshot(&self) -> Vec<Member> {
        {
            let cached = self.directory.snapshot.lock().await;
            if let Some(fetched_at) = cached.fetched_at
                && fetched_at.elapsed() < self.directory.ttl
            {
                return cached.members.clone();
            }
        }

        self.gate.wait().await;
        match self.api.users_list().await {
            Ok(response) if response.ok => {
                let mut cached = self.directory.snapshot.lock().await;
                cached.members = response.members;
                cached.fetched_at = Some(Instant::now());
                cached.members.clone()
            }
            Ok(response) => {
                tracing::error!(
                    "users.list failed: {}",
                    response.error.unwrap_or_else(|| "unknown".into())
                );
                self.directory.snapshot.lock().await.members.clone()
            }
            Err(e) => {
                tracing::error!("users.list error: {e}");
                self.directory.snapshot.lock().await.members.clone()
            }
        }
    }

    /// Look up one member by (normalized) name via the cached directory.
    pub async fn get_user_by_name(&self, name: &str) -> Option<Recipient> {
        let members = self.directory_snapshot().await;
        find_by_name(&members, normalize_handle(name)).map(Member::to_recipient)
    }

    /// Direct lookup by stable platform id; bypasses the directory cache.
    pub async fn get_user_info(&self, user_id: &str) -> Option<Recipient> {
        self.gate.wait().await;
        match self.api.users_info(user_id).await {
            Ok(response) if response.ok => response.user.map(|m| m.to_recipient()),
            Ok(response) => {
                tracing::error!(
                    "Failed to get user info for {user_id}: {}",
                    response.error.unwrap_or_else(|| "unknown".into())
                );
                None
            }
            Err(e) => {
                tracing::error!("Error getting user info for {user_id}: {e}");
                None
            }
        }
    }

    /// Resolve extracted mentions against one directory snapshot. Output
    /// recipients follow input order; each unmatched mention yields one error
    /// naming the original text.
    pub async fn resolve_mentions(&self, mentions: &[String]) -> (Vec<Recipient>, Vec<String>) {
        let members = self.directory_snapshot().await;
        let mut recipients = Vec::new();
        let mut errors = Vec::new();

        for mention in mentions {
            let handle = normalize_handle(mention);
            if handle.is_empty() {
                continue;
            }
            match find_by_name(&members, handle) {
                Some(member) => recipients.push(member.to_recipient()),
                None => errors.push(format!("User not found: {mention}")),
            }
        }

        (recipients, errors)
    }

    /// Resolve importer records to recipients, carrying each record's
    /// variables keyed by the resolved platform id. Identifiers that already
    /// look like platform ids go through the direct lookup.
    pub async fn resolve_records(
        &self,
        records: &[ImportRecord],
    ) -> (Vec<Recipient>, UserVariables, Vec<String>) {
        let mut recipients = Vec::new();
        let mut variables = UserVariables::new();
        let mut errors = Vec::new();

        for record in records {
            let handle = normalize_handle(&record.identifier);
            let resolved = if record.identifier_field == "user_id" || looks_like_user_id(handle) {
                self.get_user_info(handle).await
            } else {
                self.get_user_by_name(handle).await
            };

            match resolved {
                Some(recipient) => {
                    if !record.variables.is_empty() {
                        variables.insert(recipient.id.clone(), record.variables.clone());
                    }
                    recipients.push(recipient);
                }
                None => errors.push(format!("User not found: {}", record.identifier)),
            }
        }

        (recipients, variables, errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{
        AuthTestResponse, ConversationsOpenResponse, MemberProfile, PostMessageResponse,
        SlackApi, UserInfoResponse, UsersListResponse,
    };
    use async_trait::async_trait;
    use dmcast_core::config::SlackConfig;
    use dmcast_core::error::Result;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn member(id: &str, name: &str, display: Option<&str>, deleted: bool) -> Member {
        Member {
            id: id.to_string(),
            name: name.to_string(),
            real_name: None,
            deleted,
            profile: MemberProfile {
                display_name: display.map(String::from),
                real_name: None,
                email: None,
            },
        }
    }

    struct FakeDirectoryApi {
        members: Vec<Member>,
        list_calls: AtomicUsize,
    }

    impl FakeDirectoryApi {
        fn new(members: Vec<Member>) -> Self {
            Self {
                members,
                list_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SlackApi for FakeDirectoryApi {
        async fn auth_test(&self) -> Result<AuthTestResponse> {
            Ok(AuthTestResponse {
                ok: true,
                error: None,
                user_id: None,
                team: None,
            })
        }

        async fn users_list(&self) -> Result<UsersListResponse> {
            self.list_calls.fetch_add(1, Ordering::SeqCst);
            Ok(UsersListResponse {
                ok: true,
                error: None,
                members: self.members.clone(),
            })
        }

        async fn users_info(&self, user_id: &str) -> Result<UserInfoResponse> {
            let user = self.members.iter().find(|m| m.id == user_id).cloned();
            Ok(UserInfoResponse {
                ok: user.is_some(),
                error: user.is_none().then(|| "user_not_found".to_string()),
                user,
            })
        }

        async fn conversations_open(&self, _user_id: &str) -> Result<ConversationsOpenResponse> {
            Ok(ConversationsOpenResponse {
                ok: false,
                error: Some("unused".into()),
                channel: None,
            })
        }

        async fn chat_post_message(
            &self,
            _channel_id: &str,
            _text: &str,
        ) -> Result<PostMessageResponse> {
            Ok(PostMessageResponse {
                ok: false,
                error: Some("unused".into()),
                ts: None,
                channel: None,
            })
        }
    }

    fn config() -> SlackConfig {
        SlackConfig {
            rate_limit_delay_ms: 0,
            max_retries: 0,
            directory_ttl_secs: 300,
        }
    }

    #[test]
    fn test_normalize_handle() {
        assert_eq!(normalize_handle(" @john.doe "), "john.doe");
        assert_eq!(normalize_handle("jane"), "jane");
        // Only one marker is stripped.
        assert_eq!(normalize_handle("@@x"), "@x");
    }

    #[test]
    fn test_looks_like_user_id() {
        assert!(looks_like_user_id("U123ABC4567"));
        assert!(!looks_like_user_id("U12"));
        assert!(!looks_like_user_id("W123ABC4567"));
    }

    #[test]
    fn test_find_by_name_skips_deleted() {
        let members = vec![
            member("U1", "ghost", Some("Casper"), true),
            member("U2", "ghost", Some("Casper"), false),
        ];
        assert_eq!(find_by_name(&members, "ghost").map(|m| m.id.as_str()), Some("U2"));
    }

    #[test]
    fn test_find_by_name_is_case_sensitive() {
        let members = vec![member("U1", "alice", None, false)];
        assert!(find_by_name(&members, "Alice").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_directory_cache_respects_ttl() {
        let api = Arc::new(FakeDirectoryApi::new(vec![member(
            "U1", "alice", None, false,
        )]));
        let client = SlackClient::with_api(api.clone(), &config());

        assert!(client.get_user_by_name("alice").await.is_some());
        assert!(client.get_user_by_name("@alice").await.is_some());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(std::time::Duration::from_secs(301)).await;
        assert!(client.get_user_by_name("alice").await.is_some());
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resolve_mentions_order_and_errors() {
        let api = Arc::new(FakeDirectoryApi::new(vec![
            member("U1", "alice", None, false),
            member("U2", "bob", Some("Bobby"), false),
        ]));
        let client = SlackClient::with_api(api.clone(), &config());

        let mentions = vec!["@bob".to_string(), "@nobody".to_string(), "alice".to_string()];
        let (recipients, errors) = client.resolve_mentions(&mentions).await;
        assert_eq!(
            recipients.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(),
            vec!["U2", "U1"]
        );
        assert_eq!(errors, vec!["User not found: @nobody"]);
        // A single bulk fetch for the whole batch.
        assert_eq!(api.list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_resolve_records_mixed_identifiers() {
        let api = Arc::new(FakeDirectoryApi::new(vec![
            member("U123ABC4567", "alice", None, false),
            member("U2", "bob", None, false),
        ]));
        let client = SlackClient::with_api(api, &config());

        let records = vec![
            ImportRecord {
                identifier: "U123ABC4567".into(),
                identifier_field: "user_id".into(),
                variables: [("company".to_string(), serde_json::json!("ACME"))]
                    .into_iter()
                    .collect(),
            },
            ImportRecord {
                identifier: "@bob".into(),
                identifier_field: "username".into(),
                variables: Default::default(),
            },
            ImportRecord {
                identifier: "nobody".into(),
                identifier_field: "name".into(),
                variables: Default::default(),
            },
        ];

        let (recipients, variables, errors) = client.resolve_records(&records).await;
        assert_eq!(recipients.len(), 2);
        assert_eq!(variables["U123ABC4567"]["company"], serde_json::json!("ACME"));
        assert_eq!(errors, vec!["User not found: nobody"]);
    }
}
