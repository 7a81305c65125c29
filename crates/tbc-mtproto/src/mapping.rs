//! MTProto (TL) payloads and RPC errors -> protocol-neutral directory types.

use std::time::Duration;

use grammers_mtsender::InvocationError;
use grammers_tl_types as tl;
use tbc_core::directory::{EntityHandle, FullInfo, LookupOutcome, RawEntity};

const INVALID_SESSION: &str = "invalid session, sign in again";

/// What an [`EntityHandle`] points at. Channels carry the access hash
/// `channels.getFullChannel` needs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PeerRef {
    User(i64),
    Chat(i64),
    Channel { id: i64, access_hash: i64 },
}

impl PeerRef {
    pub fn to_handle(self) -> EntityHandle {
        EntityHandle(match self {
            PeerRef::User(id) => format!("user:{id}"),
            PeerRef::Chat(id) => format!("chat:{id}"),
            PeerRef::Channel { id, access_hash } => format!("channel:{id}:{access_hash}"),
        })
    }

    pub fn parse(handle: &EntityHandle) -> Option<Self> {
        let mut parts = handle.0.split(':');
        let kind = parts.next()?;
        let id = parts.next()?.parse().ok()?;
        let peer = match kind {
            "user" => PeerRef::User(id),
            "chat" => PeerRef::Chat(id),
            "channel" => PeerRef::Channel {
                id,
                access_hash: parts.next()?.parse().ok()?,
            },
            _ => return None,
        };
        parts.next().is_none().then_some(peer)
    }
}

fn count(n: i32) -> Option<u64> {
    u64::try_from(n).ok()
}

fn chat_id(chat: &tl::enums::Chat) -> i64 {
    match chat {
        tl::enums::Chat::Empty(c) => c.id,
        tl::enums::Chat::Chat(c) => c.id,
        tl::enums::Chat::Forbidden(c) => c.id,
        tl::enums::Chat::Channel(c) => c.id,
        tl::enums::Chat::ChannelForbidden(c) => c.id,
    }
}

/// Map a chat object. Chats we were removed from or that no longer exist
/// are reported as outcomes rather than entities.
pub fn chat_entity(chat: &tl::enums::Chat) -> LookupOutcome<RawEntity> {
    match chat {
        tl::enums::Chat::Channel(c) => LookupOutcome::Success(RawEntity::Channel {
            handle: PeerRef::Channel {
                id: c.id,
                access_hash: c.access_hash.unwrap_or(0),
            }
            .to_handle(),
            broadcast: c.broadcast,
            megagroup: c.megagroup,
            username: c.username.clone(),
            title: Some(c.title.clone()),
            verified: Some(c.verified),
            participants_count: c.participants_count.and_then(count),
            // The flag only says something when set.
            join_request_gate: c.join_request.then_some(true),
        }),
        tl::enums::Chat::Chat(c) => LookupOutcome::Success(RawEntity::BasicGroup {
            handle: PeerRef::Chat(c.id).to_handle(),
            title: Some(c.title.clone()),
            participants_count: count(c.participants_count),
        }),
        tl::enums::Chat::Forbidden(_) | tl::enums::Chat::ChannelForbidden(_) => {
            LookupOutcome::permanent("private chat")
        }
        tl::enums::Chat::Empty(_) => LookupOutcome::NotFound,
    }
}

pub fn user_entity(user: &tl::types::User) -> RawEntity {
    let display_name = match (user.first_name.clone(), user.last_name.clone()) {
        (Some(f), Some(l)) => Some(format!("{f} {l}")),
        (f, l) => f.or(l),
    };
    RawEntity::Person {
        handle: PeerRef::User(user.id).to_handle(),
        username: user.username.clone(),
        display_name,
        verified: Some(user.verified),
    }
}

/// Pick the resolved peer out of a `contacts.resolveUsername` answer.
pub fn resolved_entity(resolved: &tl::types::contacts::ResolvedPeer) -> LookupOutcome<RawEntity> {
    let wanted_chat = match &resolved.peer {
        tl::enums::Peer::User(p) => {
            return resolved
                .users
                .iter()
                .find_map(|u| match u {
                    tl::enums::User::User(user) if user.id == p.user_id => {
                        Some(LookupOutcome::Success(user_entity(user)))
                    }
                    _ => None,
                })
                .unwrap_or(LookupOutcome::NotFound);
        }
        tl::enums::Peer::Chat(p) => p.chat_id,
        tl::enums::Peer::Channel(p) => p.channel_id,
    };
    resolved
        .chats
        .iter()
        .find(|c| chat_id(c) == wanted_chat)
        .map_or(LookupOutcome::NotFound, chat_entity)
}

/// Map a `messages.checkChatInvite` answer.
pub fn invite_entity(invite: &tl::enums::ChatInvite) -> LookupOutcome<RawEntity> {
    match invite {
        tl::enums::ChatInvite::Invite(i) => LookupOutcome::Success(RawEntity::InvitePreview {
            channel: i.channel,
            megagroup: i.megagroup,
            title: Some(i.title.clone()),
            participants_count: count(i.participants_count),
            verified: Some(i.verified),
            request_needed: Some(i.request_needed),
        }),
        tl::enums::ChatInvite::Already(a) => match chat_entity(&a.chat) {
            LookupOutcome::Success(e) => {
                LookupOutcome::Success(RawEntity::InviteAlreadyMember(Box::new(e)))
            }
            other => other,
        },
        // Chats that allow a preview before joining.
        tl::enums::ChatInvite::Peek(p) => chat_entity(&p.chat),
    }
}

pub fn full_info(full: &tl::enums::ChatFull) -> FullInfo {
    match full {
        tl::enums::ChatFull::ChannelFull(c) => {
            full_info_from_counts(c.participants_count, c.requests_pending)
        }
        tl::enums::ChatFull::Full(_) => FullInfo::default(),
    }
}

/// Pending join requests prove the gate is on; none proves nothing.
pub fn full_info_from_counts(participants: Option<i32>, requests_pending: Option<i32>) -> FullInfo {
    FullInfo {
        participants_count: participants.and_then(count),
        join_request_gate: requests_pending.filter(|n| *n > 0).map(|_| true),
    }
}

pub fn map_invocation_error<T>(e: InvocationError) -> LookupOutcome<T> {
    match e {
        InvocationError::Rpc(rpc) => classify_rpc(rpc.code, &rpc.name, rpc.value),
        other => LookupOutcome::TransientError(other.to_string()),
    }
}

/// Classify an RPC error by code and name (`FLOOD_WAIT` with its seconds
/// in `value`, or still suffixed as `FLOOD_WAIT_17`).
pub fn classify_rpc<T>(code: i32, name: &str, value: Option<u32>) -> LookupOutcome<T> {
    let name = name.to_ascii_uppercase();

    if ["FLOOD_WAIT", "FLOOD_PREMIUM_WAIT", "SLOWMODE_WAIT"]
        .iter()
        .any(|p| name.starts_with(p))
    {
        let secs = value
            .map(u64::from)
            .or_else(|| trailing_number(&name))
            .unwrap_or(1);
        return LookupOutcome::RateLimited(Duration::from_secs(secs));
    }

    match name.as_str() {
        "USERNAME_NOT_OCCUPIED" | "INVITE_HASH_INVALID" | "INVITE_HASH_EMPTY" => {
            LookupOutcome::NotFound
        }
        "USERNAME_INVALID" => LookupOutcome::permanent("invalid username"),
        "INVITE_HASH_EXPIRED" => LookupOutcome::permanent("invite expired"),
        "CHANNEL_PRIVATE" | "CHANNEL_PUBLIC_GROUP_NA" => LookupOutcome::permanent("private chat"),
        "CHAT_ADMIN_REQUIRED" => LookupOutcome::permanent("admin rights required"),
        "AUTH_KEY_UNREGISTERED"
        | "AUTH_KEY_INVALID"
        | "AUTH_KEY_PERMANENTLY_INVALID"
        | "SESSION_REVOKED"
        | "SESSION_EXPIRED"
        | "USER_DEACTIVATED"
        | "USER_DEACTIVATED_BAN" => LookupOutcome::session_fatal(INVALID_SESSION),
        _ if code == 401 => LookupOutcome::session_fatal(INVALID_SESSION),
        _ if code == 420 => LookupOutcome::RateLimited(Duration::from_secs(1)),
        _ if code >= 500 || code == -503 || name.contains("TIMEOUT") => {
            LookupOutcome::TransientError(name)
        }
        _ => LookupOutcome::permanent(name),
    }
}

fn trailing_number(name: &str) -> Option<u64> {
    name.rsplit('_').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_survive_a_round_trip() {
        for peer in [
            PeerRef::User(777000),
            PeerRef::Chat(123),
            PeerRef::Channel {
                id: 1005640892,
                access_hash: -42,
            },
        ] {
            assert_eq!(PeerRef::parse(&peer.to_handle()), Some(peer));
        }
        assert_eq!(PeerRef::parse(&EntityHandle("channel:1".to_string())), None);
        assert_eq!(PeerRef::parse(&EntityHandle("user:1:2".to_string())), None);
        assert_eq!(PeerRef::parse(&EntityHandle("-1001005640892".to_string())), None);
    }

    #[test]
    fn flood_waits_carry_their_delay() {
        assert_eq!(
            classify_rpc::<()>(420, "FLOOD_WAIT", Some(17)),
            LookupOutcome::RateLimited(Duration::from_secs(17))
        );
        assert_eq!(
            classify_rpc::<()>(420, "FLOOD_WAIT_30", None),
            LookupOutcome::RateLimited(Duration::from_secs(30))
        );
        assert_eq!(
            classify_rpc::<()>(420, "SOMETHING_NEW", None),
            LookupOutcome::RateLimited(Duration::from_secs(1))
        );
    }

    #[test]
    fn lookup_errors_by_name() {
        assert_eq!(
            classify_rpc::<()>(400, "USERNAME_NOT_OCCUPIED", None),
            LookupOutcome::NotFound
        );
        assert_eq!(
            classify_rpc::<()>(400, "INVITE_HASH_INVALID", None),
            LookupOutcome::NotFound
        );
        assert_eq!(
            classify_rpc::<()>(400, "INVITE_HASH_EXPIRED", None),
            LookupOutcome::permanent("invite expired")
        );
        assert_eq!(
            classify_rpc::<()>(400, "USERNAME_INVALID", None),
            LookupOutcome::permanent("invalid username")
        );
        assert_eq!(
            classify_rpc::<()>(406, "CHANNEL_PRIVATE", None),
            LookupOutcome::permanent("private chat")
        );
    }

    #[test]
    fn session_errors_are_fatal_and_server_errors_transient() {
        assert_eq!(
            classify_rpc::<()>(401, "AUTH_KEY_UNREGISTERED", None),
            LookupOutcome::session_fatal(INVALID_SESSION)
        );
        assert_eq!(
            classify_rpc::<()>(401, "SOMETHING_ELSE", None),
            LookupOutcome::session_fatal(INVALID_SESSION)
        );
        assert_eq!(
            classify_rpc::<()>(500, "INTERNAL", None),
            LookupOutcome::TransientError("INTERNAL".to_string())
        );
        assert_eq!(
            classify_rpc::<()>(-503, "TIMEOUT", None),
            LookupOutcome::TransientError("TIMEOUT".to_string())
        );
        assert_eq!(
            classify_rpc::<()>(400, "PEER_ID_INVALID", None),
            LookupOutcome::permanent("PEER_ID_INVALID")
        );
    }

    #[test]
    fn full_info_only_trusts_positive_request_counts() {
        assert_eq!(
            full_info_from_counts(Some(11_915_542), Some(3)),
            FullInfo {
                participants_count: Some(11_915_542),
                join_request_gate: Some(true),
            }
        );
        assert_eq!(
            full_info_from_counts(None, Some(0)),
            FullInfo {
                participants_count: None,
                join_request_gate: None,
            }
        );
        assert_eq!(full_info_from_counts(Some(-1), None), FullInfo::default());
    }
}
