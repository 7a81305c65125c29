//! Directory-service port.
//!
//! The remote protocol lives entirely behind [`DirectoryClient`]. Core logic
//! only ever sees the closed [`LookupOutcome`] tags and the protocol-neutral
//! [`RawEntity`] / [`FullInfo`] payloads.

use std::time::Duration;

use async_trait::async_trait;

use crate::identifier::Identifier;

/// Feature flags of a directory implementation.
#[derive(Clone, Copy, Debug)]
pub struct DirectoryCapabilities {
    /// Can preview private invite links without joining.
    pub supports_invite_links: bool,
    /// Exposes a second lookup with participant counts / join gates.
    pub supports_full_info: bool,
}

/// Result of a single adapter call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LookupOutcome<T> {
    Success(T),
    NotFound,
    /// The service asked us to wait at least this long.
    RateLimited(Duration),
    TransientError(String),
    PermanentError {
        reason: String,
        /// The session itself is unusable; nothing else in the run can succeed.
        session_fatal: bool,
    },
}

impl<T> LookupOutcome<T> {
    pub fn permanent(reason: impl Into<String>) -> Self {
        LookupOutcome::PermanentError {
            reason: reason.into(),
            session_fatal: false,
        }
    }

    pub fn session_fatal(reason: impl Into<String>) -> Self {
        LookupOutcome::PermanentError {
            reason: reason.into(),
            session_fatal: true,
        }
    }
}

/// Opaque reference the adapter can use to fetch more about an entity.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(pub String);

/// What the service returned for a resolved identifier, stripped of wire
/// details.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawEntity {
    /// Channel-model chat (broadcast channel or megagroup).
    Channel {
        handle: EntityHandle,
        broadcast: bool,
        megagroup: bool,
        username: Option<String>,
        title: Option<String>,
        verified: Option<bool>,
        participants_count: Option<u64>,
        join_request_gate: Option<bool>,
    },
    /// Legacy basic group.
    BasicGroup {
        handle: EntityHandle,
        title: Option<String>,
        participants_count: Option<u64>,
    },
    /// A person or bot account.
    Person {
        handle: EntityHandle,
        username: Option<String>,
        display_name: Option<String>,
        verified: Option<bool>,
    },
    /// Preview of a private invite the session has not joined.
    InvitePreview {
        channel: bool,
        megagroup: bool,
        title: Option<String>,
        participants_count: Option<u64>,
        verified: Option<bool>,
        request_needed: Option<bool>,
    },
    /// Invite to a chat the session is already a member of.
    InviteAlreadyMember(Box<RawEntity>),
}

impl RawEntity {
    /// Handle for a follow-up `fetch_full_info`, if the entity has one.
    pub fn handle(&self) -> Option<&EntityHandle> {
        match self {
            RawEntity::Channel { handle, .. }
            | RawEntity::BasicGroup { handle, .. }
            | RawEntity::Person { handle, .. } => Some(handle),
            RawEntity::InvitePreview { .. } => None,
            RawEntity::InviteAlreadyMember(inner) => inner.handle(),
        }
    }

    /// Whether a full-info lookup can add anything the first phase lacks.
    pub fn wants_full_info(&self) -> bool {
        match self {
            RawEntity::Channel {
                participants_count,
                join_request_gate,
                ..
            } => participants_count.is_none() || join_request_gate.is_none(),
            RawEntity::BasicGroup {
                participants_count, ..
            } => participants_count.is_none(),
            RawEntity::Person { .. } | RawEntity::InvitePreview { .. } => false,
            RawEntity::InviteAlreadyMember(inner) => inner.wants_full_info(),
        }
    }
}

/// Second-phase details for a resolved chat.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FullInfo {
    pub participants_count: Option<u64>,
    pub join_request_gate: Option<bool>,
}

/// Authenticated session to the directory service.
///
/// One instance is shared read-only by every pipeline worker. Only the
/// pipeline calls [`DirectoryClient::disconnect`], once, after all workers
/// have finished.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    fn capabilities(&self) -> DirectoryCapabilities;

    async fn resolve(&self, id: &Identifier) -> LookupOutcome<RawEntity>;

    async fn fetch_full_info(&self, entity: &RawEntity) -> LookupOutcome<FullInfo>;

    async fn disconnect(&self);
}
