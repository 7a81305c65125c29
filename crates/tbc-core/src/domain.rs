use chrono::{DateTime, Utc};
use serde::Serialize;

/// What a resolved identity turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Channel,
    Supergroup,
    Group,
    User,
}

impl ChatType {
    pub fn label(self) -> &'static str {
        match self {
            ChatType::Channel => "Channel",
            ChatType::Supergroup => "Supergroup",
            ChatType::Group => "Group",
            ChatType::User => "User",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Private,
}

impl Visibility {
    pub fn label(self) -> &'static str {
        match self {
            Visibility::Public => "Public",
            Visibility::Private => "Private",
        }
    }
}

/// Classified metadata for one resolved chat or user.
///
/// `None` always means "the service did not tell us", never zero or false.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatInfo {
    pub chat_type: ChatType,
    pub visibility: Visibility,
    pub member_count: Option<u64>,
    pub verified: bool,
    pub requires_approval: Option<bool>,
    pub title: Option<String>,
    pub resolved_username: Option<String>,
    /// Set only when an invite link reports the session already joined.
    pub is_member: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Valid(ChatInfo),
    Invalid(String),
    Unknown(String),
}

impl CheckStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, CheckStatus::Valid(_))
    }

    pub fn info(&self) -> Option<&ChatInfo> {
        match self {
            CheckStatus::Valid(info) => Some(info),
            _ => None,
        }
    }

    /// Human-readable failure reason; `None` for valid results.
    pub fn reason(&self) -> Option<&str> {
        match self {
            CheckStatus::Valid(_) => None,
            CheckStatus::Invalid(r) | CheckStatus::Unknown(r) => Some(r),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CheckStatus::Valid(_) => "valid",
            CheckStatus::Invalid(_) => "invalid",
            CheckStatus::Unknown(_) => "unknown",
        }
    }
}

/// Outcome for one input line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    /// The input exactly as supplied (before trimming).
    pub input: String,
    pub status: CheckStatus,
    /// Wall-clock time of the final attempt (or of normalization for
    /// inputs that never reached the network).
    pub finished_at: DateTime<Utc>,
    /// Directory calls spent on this item, including full-info fetches.
    pub attempts: u32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub processed: usize,
    pub valid: usize,
    pub invalid: usize,
    pub unknown: usize,
}

impl RunSummary {
    pub fn from_results(results: &[CheckResult]) -> Self {
        let mut s = Self {
            processed: results.len(),
            ..Self::default()
        };
        for r in results {
            match r.status {
                CheckStatus::Valid(_) => s.valid += 1,
                CheckStatus::Invalid(_) => s.invalid += 1,
                CheckStatus::Unknown(_) => s.unknown += 1,
            }
        }
        s
    }
}

/// Everything a run produces: one result per input, in input order.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub results: Vec<CheckResult>,
    pub summary: RunSummary,
    pub aborted: bool,
}
