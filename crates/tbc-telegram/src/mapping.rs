//! Bot API payloads and errors -> protocol-neutral directory types.

use std::time::Duration;

use tbc_core::directory::{EntityHandle, LookupOutcome, RawEntity};

/// Chat type as reported by `getChat`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatKindTag {
    Private,
    Group,
    Supergroup,
    Channel,
}

/// The fields of a Bot API `Chat` the checker cares about.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatView {
    pub id: i64,
    pub kind: ChatKindTag,
    pub username: Option<String>,
    pub title: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub join_by_request: Option<bool>,
}

impl ChatView {
    pub fn from_chat(chat: &teloxide::types::Chat) -> Self {
        let kind = if chat.is_channel() {
            ChatKindTag::Channel
        } else if chat.is_supergroup() {
            ChatKindTag::Supergroup
        } else if chat.is_group() {
            ChatKindTag::Group
        } else {
            ChatKindTag::Private
        };

        // `join_by_request` is only sent when true; read it off the wire shape.
        let join_by_request = serde_json::to_value(chat)
            .ok()
            .and_then(|v| v.get("join_by_request").and_then(|b| b.as_bool()));

        Self {
            id: chat.id.0,
            kind,
            username: chat.username().map(str::to_string),
            title: chat.title().map(str::to_string),
            first_name: chat.first_name().map(str::to_string),
            last_name: chat.last_name().map(str::to_string),
            join_by_request,
        }
    }

    pub fn into_entity(self) -> RawEntity {
        let handle = EntityHandle(self.id.to_string());
        // Only an explicit `true` is a gate; absence says nothing.
        let gate = self.join_by_request.filter(|b| *b);
        match self.kind {
            ChatKindTag::Channel | ChatKindTag::Supergroup => RawEntity::Channel {
                handle,
                broadcast: self.kind == ChatKindTag::Channel,
                megagroup: self.kind == ChatKindTag::Supergroup,
                username: self.username,
                title: self.title,
                // The Bot API has no verification flag.
                verified: None,
                participants_count: None,
                join_request_gate: gate,
            },
            ChatKindTag::Group => RawEntity::BasicGroup {
                handle,
                title: self.title,
                participants_count: None,
            },
            ChatKindTag::Private => {
                let display_name = match (self.first_name, self.last_name) {
                    (Some(f), Some(l)) => Some(format!("{f} {l}")),
                    (f, l) => f.or(l),
                };
                RawEntity::Person {
                    handle,
                    username: self.username,
                    display_name,
                    verified: None,
                }
            }
        }
    }
}

/// Map a teloxide request error to a lookup outcome.
pub fn map_request_error<T>(e: teloxide::RequestError) -> LookupOutcome<T> {
    use teloxide::{ApiError, RequestError};

    match e {
        RequestError::RetryAfter(d) => LookupOutcome::RateLimited(d),
        RequestError::Api(ApiError::ChatNotFound | ApiError::UserNotFound) => {
            LookupOutcome::NotFound
        }
        RequestError::Api(ApiError::NotFound) => {
            LookupOutcome::session_fatal("invalid session, sign in again")
        }
        RequestError::Api(ApiError::Unknown(text)) => classify_api_text(&text),
        RequestError::Api(other) => classify_api_text(&other.to_string()),
        RequestError::Network(e) => LookupOutcome::TransientError(format!("network: {e}")),
        RequestError::Io(e) => LookupOutcome::TransientError(format!("i/o: {e}")),
        RequestError::InvalidJson { source, .. } => {
            LookupOutcome::TransientError(format!("bad response: {source}"))
        }
        other => LookupOutcome::permanent(other.to_string()),
    }
}

/// Classify a Bot API error description.
pub fn classify_api_text<T>(text: &str) -> LookupOutcome<T> {
    let t = text.to_ascii_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| t.contains(n));

    if has(&["unauthorized", "auth_key", "session revoked"]) {
        return LookupOutcome::session_fatal("invalid session, sign in again");
    }
    if has(&["too many requests", "flood"]) {
        let wait = retry_after_hint(&t).unwrap_or(Duration::from_secs(1));
        return LookupOutcome::RateLimited(wait);
    }
    if has(&[
        "not found",
        "username_invalid",
        "username_not_occupied",
        "invalid username",
        "peer_id_invalid",
    ]) {
        return LookupOutcome::NotFound;
    }
    if has(&["invite_hash_expired"]) {
        return LookupOutcome::permanent("invite expired");
    }
    if has(&["internal server error", "bad gateway", "gateway timeout", "timed out"]) {
        return LookupOutcome::TransientError(text.to_string());
    }
    if has(&["chat_admin_required", "not enough rights", "admin"]) {
        return LookupOutcome::permanent("admin rights required");
    }
    if has(&["channel_private", "private"]) {
        return LookupOutcome::permanent("private chat");
    }
    LookupOutcome::permanent(text.to_string())
}

/// `... retry after 17` -> 17s.
fn retry_after_hint(lower: &str) -> Option<Duration> {
    let idx = lower.find("retry after")?;
    let secs: String = lower[idx + "retry after".len()..]
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    secs.parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(kind: ChatKindTag) -> ChatView {
        ChatView {
            id: -1001005640892,
            kind,
            username: Some("telegram".to_string()),
            title: Some("Telegram News".to_string()),
            first_name: None,
            last_name: None,
            join_by_request: None,
        }
    }

    #[test]
    fn channel_view_maps_to_broadcast_entity() {
        match view(ChatKindTag::Channel).into_entity() {
            RawEntity::Channel {
                handle,
                broadcast,
                megagroup,
                username,
                verified,
                join_request_gate,
                ..
            } => {
                assert_eq!(handle, EntityHandle("-1001005640892".to_string()));
                assert!(broadcast);
                assert!(!megagroup);
                assert_eq!(username.as_deref(), Some("telegram"));
                assert_eq!(verified, None);
                assert_eq!(join_request_gate, None);
            }
            other => panic!("unexpected entity: {other:?}"),
        }
    }

    #[test]
    fn supergroup_gate_only_when_explicit() {
        let mut v = view(ChatKindTag::Supergroup);
        v.join_by_request = Some(true);
        assert!(matches!(
            v.clone().into_entity(),
            RawEntity::Channel {
                megagroup: true,
                join_request_gate: Some(true),
                ..
            }
        ));

        v.join_by_request = Some(false);
        assert!(matches!(
            v.into_entity(),
            RawEntity::Channel {
                join_request_gate: None,
                ..
            }
        ));
    }

    #[test]
    fn private_chat_is_a_person() {
        let mut v = view(ChatKindTag::Private);
        v.title = None;
        v.first_name = Some("Pavel".to_string());
        v.last_name = Some("Durov".to_string());
        match v.into_entity() {
            RawEntity::Person { display_name, .. } => {
                assert_eq!(display_name.as_deref(), Some("Pavel Durov"));
            }
            other => panic!("unexpected entity: {other:?}"),
        }
        assert!(matches!(
            view(ChatKindTag::Group).into_entity(),
            RawEntity::BasicGroup { .. }
        ));
    }

    #[test]
    fn api_text_classification() {
        assert_eq!(
            classify_api_text::<()>("Bad Request: chat not found"),
            LookupOutcome::NotFound
        );
        assert_eq!(
            classify_api_text::<()>("Too Many Requests: retry after 17"),
            LookupOutcome::RateLimited(Duration::from_secs(17))
        );
        assert_eq!(
            classify_api_text::<()>("Unauthorized"),
            LookupOutcome::session_fatal("invalid session, sign in again")
        );
        assert_eq!(
            classify_api_text::<()>("Internal Server Error"),
            LookupOutcome::TransientError("Internal Server Error".to_string())
        );
        assert_eq!(
            classify_api_text::<()>("Bad Request: CHANNEL_PRIVATE"),
            LookupOutcome::permanent("private chat")
        );
        assert_eq!(
            classify_api_text::<()>("Bad Request: something odd"),
            LookupOutcome::permanent("Bad Request: something odd")
        );
    }
}
