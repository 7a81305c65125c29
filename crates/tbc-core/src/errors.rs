/// Application-level error type.
///
/// Per-item lookup failures never surface here; they are folded into
/// `CheckResult` statuses by the pipeline. This type covers what stops the
/// tool itself (bad config, a session that cannot connect).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
