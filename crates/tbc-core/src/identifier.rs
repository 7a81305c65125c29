//! Input normalization: raw text -> canonical username or invite hash.
//!
//! Everything here is pure; nothing that fails these rules ever reaches the
//! directory service.

use std::{fmt, sync::OnceLock};

use regex::Regex;

const USERNAME_MIN: usize = 5;
const USERNAME_MAX: usize = 32;
const INVITE_HASH_MIN: usize = 16;

/// `t.me` paths that are links to client features, not chats.
const RESERVED_PATHS: &[&str] = &[
    "joinchat",
    "addstickers",
    "addemoji",
    "addtheme",
    "share",
    "proxy",
    "socks",
    "login",
    "setlanguage",
    "confirmphone",
    "boost",
];

/// A syntactically valid chat reference.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Public username without the leading `@`.
    Username(String),
    /// Opaque token of a private invite link.
    Invite(String),
}

impl Identifier {
    pub fn username(&self) -> Option<&str> {
        match self {
            Identifier::Username(u) => Some(u),
            Identifier::Invite(_) => None,
        }
    }

    pub fn invite_hash(&self) -> Option<&str> {
        match self {
            Identifier::Invite(h) => Some(h),
            Identifier::Username(_) => None,
        }
    }

    /// Canonical text form. Feeding it back into [`normalize`] yields `self`.
    pub fn canonical(&self) -> String {
        match self {
            Identifier::Username(u) => format!("@{u}"),
            Identifier::Invite(h) => format!("+{h}"),
        }
    }

    /// Key under which two inputs are the same lookup.
    ///
    /// Usernames are case-insensitive on Telegram; invite hashes are not.
    pub fn dedup_key(&self) -> String {
        match self {
            Identifier::Username(u) => format!("@{}", u.to_ascii_lowercase()),
            Identifier::Invite(h) => format!("+{h}"),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("empty input")]
    Empty,
    #[error("malformed identifier")]
    Malformed,
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:https?://)?(?:www\.)?(?:t|telegram)\.(?:me|dog)/([^?#]*)(?:[?#].*)?$")
            .expect("valid regex")
    })
}

fn deep_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^tg://(join|resolve)\?(.*)$").expect("valid regex"))
}

/// Parse one raw input line.
pub fn normalize(raw: &str) -> Result<Identifier, InputError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(InputError::Empty);
    }

    if let Some(caps) = link_re().captures(value) {
        let path = caps.get(1).map_or("", |m| m.as_str());
        return from_link_path(path);
    }

    if let Some(caps) = deep_link_re().captures(value) {
        let action = caps[1].to_ascii_lowercase();
        let param = if action == "join" { "invite" } else { "domain" };
        let Some(v) = query_param(&caps[2], param) else {
            return Err(InputError::Malformed);
        };
        return if action == "join" {
            invite(v)
        } else {
            username(v)
        };
    }

    if let Some(rest) = value.strip_prefix('@') {
        return username(rest);
    }
    if let Some(rest) = value.strip_prefix('+') {
        return invite(rest);
    }
    username(value)
}

fn from_link_path(path: &str) -> Result<Identifier, InputError> {
    let path = path.trim_end_matches('/');
    if let Some(hash) = path.strip_prefix('+') {
        return invite(hash);
    }
    let mut segments = path.split('/');
    let first = segments.next().unwrap_or("");
    if first.eq_ignore_ascii_case("joinchat") {
        return match (segments.next(), segments.next()) {
            (Some(hash), None) => invite(hash),
            _ => Err(InputError::Malformed),
        };
    }
    // `t.me/name/123` links a post; the chat is still `name`.
    username(first)
}

fn query_param<'a>(query: &'a str, key: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

fn username(candidate: &str) -> Result<Identifier, InputError> {
    if is_valid_username(candidate) {
        Ok(Identifier::Username(candidate.to_string()))
    } else {
        Err(InputError::Malformed)
    }
}

fn invite(candidate: &str) -> Result<Identifier, InputError> {
    if is_valid_invite_hash(candidate) {
        Ok(Identifier::Invite(candidate.to_string()))
    } else {
        Err(InputError::Malformed)
    }
}

/// Telegram username rules: 5-32 of `[A-Za-z0-9_]`, leading letter, no
/// trailing or doubled underscore.
pub fn is_valid_username(s: &str) -> bool {
    let len = s.len();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&len) {
        return false;
    }
    if !s.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return false;
    }
    if !s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return false;
    }
    if s.ends_with('_') || s.contains("__") {
        return false;
    }
    !RESERVED_PATHS.iter().any(|r| r.eq_ignore_ascii_case(s))
}

pub fn is_valid_invite_hash(s: &str) -> bool {
    s.len() >= INVITE_HASH_MIN
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(s: &str) -> Identifier {
        Identifier::Username(s.to_string())
    }

    fn inv(s: &str) -> Identifier {
        Identifier::Invite(s.to_string())
    }

    #[test]
    fn recognizes_username_forms() {
        assert_eq!(normalize("@telegram"), Ok(user("telegram")));
        assert_eq!(normalize("  telegram \n"), Ok(user("telegram")));
        assert_eq!(normalize("https://t.me/testerror1234"), Ok(user("testerror1234")));
        assert_eq!(normalize("t.me/durov/"), Ok(user("durov")));
        assert_eq!(normalize("HTTP://Telegram.Me/durov"), Ok(user("durov")));
        assert_eq!(normalize("https://t.me/durov/42?single"), Ok(user("durov")));
        assert_eq!(normalize("tg://resolve?domain=durov&post=1"), Ok(user("durov")));
    }

    #[test]
    fn recognizes_invite_forms() {
        let hash = "AAAAAEHbEkejzxUjAUCzYA";
        assert_eq!(normalize(&format!("https://t.me/+{hash}")), Ok(inv(hash)));
        assert_eq!(normalize(&format!("t.me/joinchat/{hash}")), Ok(inv(hash)));
        assert_eq!(normalize(&format!("tg://join?invite={hash}")), Ok(inv(hash)));
        assert_eq!(normalize(&format!("+{hash}")), Ok(inv(hash)));
    }

    #[test]
    fn rejects_empty_and_malformed() {
        assert_eq!(normalize("   "), Err(InputError::Empty));
        assert_eq!(normalize("not a valid handle!!"), Err(InputError::Malformed));
        assert_eq!(normalize("@abc"), Err(InputError::Malformed));
        assert_eq!(normalize("@1telegram"), Err(InputError::Malformed));
        assert_eq!(normalize("@telegram_"), Err(InputError::Malformed));
        assert_eq!(normalize("@tele__gram"), Err(InputError::Malformed));
        assert_eq!(normalize(&format!("@{}", "a".repeat(33))), Err(InputError::Malformed));
        assert_eq!(normalize("https://t.me/joinchat"), Err(InputError::Malformed));
        assert_eq!(normalize("https://t.me/+short"), Err(InputError::Malformed));
        assert_eq!(normalize("tg://join?foo=bar"), Err(InputError::Malformed));
        assert_eq!(normalize("https://example.com/telegram"), Err(InputError::Malformed));
    }

    #[test]
    fn reason_strings_match_report_wording() {
        assert_eq!(InputError::Empty.to_string(), "empty input");
        assert_eq!(InputError::Malformed.to_string(), "malformed identifier");
    }

    #[test]
    fn normalization_is_idempotent_on_canonical_form() {
        for raw in [
            "@telegram",
            "https://t.me/Durov",
            "t.me/joinchat/AAAAAEHbEkejzxUjAUCzYA",
            "tg://join?invite=AAAAAEHbEkejzxUjAUCzYA",
        ] {
            let first = normalize(raw).unwrap();
            let second = normalize(&first.canonical()).unwrap();
            assert_eq!(first, second, "{raw}");
        }
    }

    #[test]
    fn dedup_key_ignores_username_case_only() {
        assert_eq!(user("Telegram").dedup_key(), user("telegram").dedup_key());
        assert_ne!(
            inv("AAAAAEHbEkejzxUjAUCzYA").dedup_key(),
            inv("aaaaaehbekejzxujauczya").dedup_key()
        );
    }
}
