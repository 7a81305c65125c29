use crate::{
    directory::{FullInfo, RawEntity},
    domain::{ChatInfo, ChatType, Visibility},
};

/// Map a resolved entity (plus optional second-phase details) to [`ChatInfo`].
///
/// Unknown stays unknown: counts and the approval gate are only set when the
/// service reported them. `verified` is the one exception and defaults to
/// false, since the flag is always present when the service knows the entity.
pub fn classify(entity: &RawEntity, full: Option<&FullInfo>) -> ChatInfo {
    let full_count = full.and_then(|f| f.participants_count);
    let full_gate = full.and_then(|f| f.join_request_gate);

    match entity {
        RawEntity::Channel {
            broadcast,
            megagroup,
            username,
            title,
            verified,
            participants_count,
            join_request_gate,
            ..
        } => ChatInfo {
            chat_type: channel_type(*broadcast, *megagroup),
            visibility: visibility_of(username.as_deref()),
            member_count: participants_count.or(full_count),
            verified: verified.unwrap_or(false),
            requires_approval: join_request_gate.or(full_gate),
            title: title.clone(),
            resolved_username: username.clone(),
            is_member: None,
        },
        RawEntity::BasicGroup {
            title,
            participants_count,
            ..
        } => ChatInfo {
            chat_type: ChatType::Group,
            visibility: Visibility::Private,
            member_count: participants_count.or(full_count),
            verified: false,
            requires_approval: full_gate,
            title: title.clone(),
            resolved_username: None,
            is_member: None,
        },
        RawEntity::Person {
            username,
            display_name,
            verified,
            ..
        } => ChatInfo {
            chat_type: ChatType::User,
            visibility: visibility_of(username.as_deref()),
            member_count: None,
            verified: verified.unwrap_or(false),
            requires_approval: None,
            title: display_name.clone(),
            resolved_username: username.clone(),
            is_member: None,
        },
        RawEntity::InvitePreview {
            channel,
            megagroup,
            title,
            participants_count,
            verified,
            request_needed,
        } => ChatInfo {
            chat_type: if *channel {
                channel_type(!*megagroup, *megagroup)
            } else {
                ChatType::Group
            },
            visibility: Visibility::Private,
            member_count: *participants_count,
            verified: verified.unwrap_or(false),
            requires_approval: *request_needed,
            title: title.clone(),
            resolved_username: None,
            is_member: Some(false),
        },
        RawEntity::InviteAlreadyMember(inner) => ChatInfo {
            is_member: Some(true),
            ..classify(inner, full)
        },
    }
}

fn channel_type(broadcast: bool, megagroup: bool) -> ChatType {
    if megagroup {
        ChatType::Supergroup
    } else if broadcast {
        ChatType::Channel
    } else {
        // Channel-model chat with neither flag: a supergroup in all but name.
        ChatType::Supergroup
    }
}

fn visibility_of(username: Option<&str>) -> Visibility {
    match username {
        Some(u) if !u.trim().is_empty() => Visibility::Public,
        _ => Visibility::Private,
    }
}
