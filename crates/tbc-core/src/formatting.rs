//! Rendering of results: console lines, JSON lines, CSV rows.
//!
//! The pipeline only produces structured [`CheckResult`]s; everything about
//! how they look lives here.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    csv,
    domain::{ChatInfo, ChatType, CheckResult, CheckStatus, RunSummary, Visibility},
};

/// Columns of the results CSV, in order.
pub const CSV_HEADERS: [&str; 8] = [
    "input",
    "kind",
    "visibility",
    "member_count",
    "verified",
    "username",
    "requires_approval",
    "title",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    #[default]
    Compact,
    Minimal,
    Jsonl,
}

impl OutputMode {
    /// Unrecognized values fall back to `compact`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "minimal" => OutputMode::Minimal,
            "jsonl" | "json" => OutputMode::Jsonl,
            _ => OutputMode::Compact,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Color {
    Green,
    Yellow,
    Red,
    Cyan,
}

fn paint(text: &str, color: Color, enabled: bool) -> String {
    if !enabled {
        return text.to_string();
    }
    let code = match color {
        Color::Green => "32",
        Color::Yellow => "33",
        Color::Red => "31",
        Color::Cyan => "36",
    };
    format!("\x1b[{code}m{text}\x1b[0m")
}

fn yes_no(v: bool) -> &'static str {
    if v {
        "Yes"
    } else {
        "No"
    }
}

/// `type: Channel | visibility: Public | members: 10 | ...`
pub fn format_compact(info: &ChatInfo) -> String {
    let mut parts = vec![
        format!("type: {}", info.chat_type.label()),
        format!("visibility: {}", info.visibility.label()),
    ];
    if let Some(n) = info.member_count {
        parts.push(format!("members: {n}"));
    }
    if let Some(a) = info.requires_approval {
        parts.push(format!("approval: {}", yes_no(a)));
    }
    parts.push(format!("verified: {}", yes_no(info.verified)));
    if let Some(m) = info.is_member {
        parts.push(format!("member: {}", yes_no(m)));
    }
    if let Some(u) = &info.resolved_username {
        parts.push(format!("username: @{u}"));
    }
    parts.join(" | ")
}

/// `Channel Public +verified +@name m=10`
pub fn format_minimal(info: &ChatInfo) -> String {
    let mut out = format!("{} {}", info.chat_type.label(), info.visibility.label());
    let mut tokens = Vec::new();
    if info.verified {
        tokens.push("+verified".to_string());
    }
    if info.requires_approval == Some(true) {
        tokens.push("+approval".to_string());
    }
    if let Some(u) = &info.resolved_username {
        tokens.push(format!("+@{u}"));
    }
    if let Some(n) = info.member_count {
        tokens.push(format!("m={n}"));
    }
    if !tokens.is_empty() {
        out.push(' ');
        out.push_str(&tokens.join(" "));
    }
    out
}

/// Flat record used for JSON lines output.
#[derive(Debug, Serialize)]
pub struct ResultRecord<'a> {
    pub input: &'a str,
    pub status: &'static str,
    pub kind: Option<&'static str>,
    pub visibility: Option<&'static str>,
    pub verified: Option<bool>,
    pub requires_approval: Option<bool>,
    pub member_count: Option<u64>,
    pub title: Option<&'a str>,
    pub username: Option<&'a str>,
    pub is_member: Option<bool>,
    pub reason: Option<&'a str>,
    pub attempts: u32,
    pub finished_at: DateTime<Utc>,
}

impl<'a> From<&'a CheckResult> for ResultRecord<'a> {
    fn from(r: &'a CheckResult) -> Self {
        let info = r.status.info();
        Self {
            input: &r.input,
            status: r.status.tag(),
            kind: info.map(kind_key),
            visibility: info.map(visibility_key),
            verified: info.map(|i| i.verified),
            requires_approval: info.and_then(|i| i.requires_approval),
            member_count: info.and_then(|i| i.member_count),
            title: info.and_then(|i| i.title.as_deref()),
            username: info.and_then(|i| i.resolved_username.as_deref()),
            is_member: info.and_then(|i| i.is_member),
            reason: r.status.reason(),
            attempts: r.attempts,
            finished_at: r.finished_at,
        }
    }
}

fn kind_key(info: &ChatInfo) -> &'static str {
    match info.chat_type {
        ChatType::Channel => "channel",
        ChatType::Supergroup => "supergroup",
        ChatType::Group => "group",
        ChatType::User => "user",
    }
}

fn visibility_key(info: &ChatInfo) -> &'static str {
    match info.visibility {
        Visibility::Public => "public",
        Visibility::Private => "private",
    }
}

/// One console line for a result (no trailing newline).
pub fn format_console_line(
    r: &CheckResult,
    mode: OutputMode,
    color: bool,
) -> serde_json::Result<String> {
    if mode == OutputMode::Jsonl {
        return serde_json::to_string(&ResultRecord::from(r));
    }
    let input = r.input.trim();
    let line = match &r.status {
        CheckStatus::Valid(info) => {
            let body = match mode {
                OutputMode::Minimal => format_minimal(info),
                _ => format_compact(info),
            };
            format!("{} {input} -> {body}", paint("[VALID]", Color::Green, color))
        }
        CheckStatus::Invalid(reason) => {
            format!("{} {input} -> {reason}", paint("[INVALID]", Color::Red, color))
        }
        CheckStatus::Unknown(reason) => {
            let label = paint("[UNKNOWN]", Color::Yellow, color);
            format!("{label} {input} -> {reason}")
        }
    };
    Ok(line)
}

pub fn format_summary(s: &RunSummary, color: bool) -> String {
    format!(
        "{}: processed={}  ok={}  unknown={}  invalid={}",
        paint("Summary", Color::Cyan, color),
        s.processed,
        s.valid,
        s.unknown,
        s.invalid
    )
}

/// CSV cells for a result, matching [`CSV_HEADERS`]. Unknown values are empty.
pub fn csv_row(r: &CheckResult) -> [String; 8] {
    let opt = |v: Option<String>| v.unwrap_or_default();
    let info = r.status.info();
    [
        r.input.trim().to_string(),
        info.map_or("unknown", kind_key).to_string(),
        info.map_or("unknown", visibility_key).to_string(),
        opt(info.and_then(|i| i.member_count).map(|n| n.to_string())),
        opt(info.map(|i| i.verified.to_string())),
        opt(info.and_then(|i| i.resolved_username.clone())),
        opt(info.and_then(|i| i.requires_approval).map(|b| b.to_string())),
        opt(info.and_then(|i| i.title.clone())),
    ]
}

/// Full CSV document (header + rows). With `only_valid`, failed rows are left out.
pub fn format_csv<'a>(
    results: impl IntoIterator<Item = &'a CheckResult>,
    only_valid: bool,
) -> String {
    let mut out = csv::format_record(&CSV_HEADERS);
    for r in results {
        if only_valid && !r.status.is_valid() {
            continue;
        }
        out.push_str(&csv::format_record(&csv_row(r)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info() -> ChatInfo {
        ChatInfo {
            chat_type: ChatType::Channel,
            visibility: Visibility::Public,
            member_count: Some(11_915_542),
            verified: true,
            requires_approval: None,
            title: Some("Telegram News".to_string()),
            resolved_username: Some("telegram".to_string()),
            is_member: None,
        }
    }

    fn result(status: CheckStatus) -> CheckResult {
        CheckResult {
            input: "@telegram".to_string(),
            status,
            finished_at: Utc::now(),
            attempts: 1,
        }
    }

    #[test]
    fn compact_skips_unknown_fields() {
        assert_eq!(
            format_compact(&info()),
            "type: Channel | visibility: Public | members: 11915542 | verified: Yes | \
             username: @telegram"
        );
    }

    #[test]
    fn minimal_uses_tokens() {
        assert_eq!(
            format_minimal(&info()),
            "Channel Public +verified +@telegram m=11915542"
        );
    }

    #[test]
    fn console_lines_per_status() {
        let valid = result(CheckStatus::Valid(info()));
        assert_eq!(
            format_console_line(&valid, OutputMode::Minimal, false).unwrap(),
            "[VALID] @telegram -> Channel Public +verified +@telegram m=11915542"
        );

        let invalid = format_console_line(
            &result(CheckStatus::Invalid("username not found".to_string())),
            OutputMode::Compact,
            false,
        )
        .unwrap();
        assert_eq!(invalid, "[INVALID] @telegram -> username not found");

        let colored = format_console_line(
            &result(CheckStatus::Unknown("run aborted".to_string())),
            OutputMode::Compact,
            true,
        )
        .unwrap();
        assert!(colored.starts_with("\x1b[33m[UNKNOWN]\x1b[0m"));
    }

    #[test]
    fn jsonl_keeps_absent_values_null() {
        let valid = result(CheckStatus::Valid(info()));
        let line = format_console_line(&valid, OutputMode::Jsonl, true).unwrap();
        let v: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(v["status"], "valid");
        assert_eq!(v["kind"], "channel");
        assert_eq!(v["member_count"], 11_915_542);
        assert!(v["requires_approval"].is_null());
        assert!(v["reason"].is_null());
    }

    #[test]
    fn csv_leaves_unknowns_empty_and_filters_failures() {
        let rows = vec![
            result(CheckStatus::Valid(info())),
            result(CheckStatus::Invalid("username not found".to_string())),
        ];
        let only_valid = format_csv(&rows, true);
        assert_eq!(
            only_valid,
            "input,kind,visibility,member_count,verified,username,requires_approval,title\n\
             @telegram,channel,public,11915542,true,telegram,,Telegram News\n"
        );

        let all = format_csv(&rows, false);
        assert!(all.ends_with("@telegram,unknown,unknown,,,,,\n"));
    }

    #[test]
    fn output_mode_parse_falls_back_to_compact() {
        assert_eq!(OutputMode::parse("JSONL"), OutputMode::Jsonl);
        assert_eq!(OutputMode::parse("minimal"), OutputMode::Minimal);
        assert_eq!(OutputMode::parse("fancy"), OutputMode::Compact);
    }
}
