use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    errors::Error, formatting::OutputMode, pipeline::PipelineConfig, retry::RetryPolicy, Result,
};

/// How to sign in to Telegram.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionConfig {
    /// MTProto user session. Can preview invite links and sees the
    /// verified flag.
    User {
        api_id: i32,
        api_hash: String,
        session_file: PathBuf,
        /// Used for the interactive login when the session is not yet
        /// authorized; prompted for when absent.
        phone: Option<String>,
    },
    /// Bot API token. Public usernames only.
    Bot { token: String },
}

/// Typed configuration, read from the environment (and `.env` if present).
#[derive(Clone, Debug)]
pub struct Config {
    // Session
    pub session: SessionConfig,
    pub request_timeout: Duration,

    // Files
    pub input_file: PathBuf,
    /// `None` disables the results CSV.
    pub output_file: Option<PathBuf>,
    pub csv_only_valid: bool,

    // Console
    pub output_mode: OutputMode,
    pub no_color: bool,
    pub wait_before_exit: Duration,

    // Pipeline
    pub concurrency: usize,
    /// Minimum spacing between any two directory calls.
    pub min_request_interval: Duration,
    pub retry: RetryPolicy,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_env()
    }

    /// Build from the current process environment without touching `.env`.
    pub fn from_env() -> Result<Self> {
        let session = session_from_env()?;

        let request_timeout =
            Duration::from_millis(env_u64("REQUEST_TIMEOUT_MS").unwrap_or(15_000));

        let input_file = PathBuf::from(
            env_str("INPUT_FILE")
                .and_then(non_empty)
                .unwrap_or("inputs.csv".to_string()),
        );
        // Empty OUTPUT_FILE means "no CSV"; unset means the default file.
        let output_file = match env_str("OUTPUT_FILE") {
            Some(v) if v.trim().is_empty() => None,
            Some(v) => Some(PathBuf::from(v.trim())),
            None => Some(PathBuf::from("results.csv")),
        };
        let csv_only_valid = env_bool("CSV_ONLY_VALID").unwrap_or(true);

        let output_mode = env_str("OUTPUT_MODE")
            .map(|s| OutputMode::parse(&s))
            .unwrap_or_default();
        let no_color = env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        let wait_before_exit =
            Duration::from_secs(env_u64("WAIT_BEFORE_EXIT_SECONDS").unwrap_or(0));

        let concurrency = env_usize("CONCURRENCY").unwrap_or(5).max(1);
        let min_request_interval =
            Duration::from_millis(env_u64("MIN_REQUEST_INTERVAL_MS").unwrap_or(50));

        let defaults = RetryPolicy::default();
        let multiplier = env_f64("BACKOFF_MULTIPLIER").unwrap_or(defaults.multiplier);
        if multiplier < 1.0 {
            return Err(Error::Config(format!(
                "BACKOFF_MULTIPLIER must be >= 1.0 (got {multiplier})"
            )));
        }
        let jitter = env_f64("BACKOFF_JITTER").unwrap_or(defaults.jitter);
        if !(0.0..=1.0).contains(&jitter) {
            return Err(Error::Config(format!(
                "BACKOFF_JITTER must be between 0 and 1 (got {jitter})"
            )));
        }
        let retry = RetryPolicy {
            max_retries: env_u32("MAX_RETRIES").unwrap_or(defaults.max_retries),
            base_delay: env_u64("BACKOFF_BASE_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_delay),
            multiplier,
            max_delay: env_u64("BACKOFF_MAX_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_delay),
            jitter,
        };

        Ok(Self {
            session,
            request_timeout,
            input_file,
            output_file,
            csv_only_valid,
            output_mode,
            no_color,
            wait_before_exit,
            concurrency,
            min_request_interval,
            retry,
        })
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            concurrency: self.concurrency,
            retry: self.retry.clone(),
        }
    }
}

/// API_ID/API_HASH select a user session; otherwise TELEGRAM_BOT_TOKEN.
fn session_from_env() -> Result<SessionConfig> {
    let api_id = env_str("API_ID").and_then(non_empty);
    let api_hash = env_str("API_HASH").and_then(non_empty);

    if api_id.is_some() || api_hash.is_some() {
        let (Some(api_id), Some(api_hash)) = (api_id, api_hash) else {
            return Err(Error::Config(
                "API_ID and API_HASH must be set together".to_string(),
            ));
        };
        let api_id = api_id
            .trim()
            .parse::<i32>()
            .map_err(|_| Error::Config(format!("API_ID must be a number (got {api_id})")))?;
        let name = env_str("SESSION_NAME")
            .and_then(non_empty)
            .unwrap_or("bulk_checker".to_string());
        let name = name.trim();
        let session_file = if name.ends_with(".session") {
            PathBuf::from(name)
        } else {
            PathBuf::from(format!("{name}.session"))
        };
        return Ok(SessionConfig::User {
            api_id,
            api_hash: api_hash.trim().to_string(),
            session_file,
            phone: env_str("TELEGRAM_PHONE").and_then(non_empty),
        });
    }

    match env_str("TELEGRAM_BOT_TOKEN").and_then(non_empty) {
        Some(token) => Ok(SessionConfig::Bot {
            token: token.trim().to_string(),
        }),
        None => Err(Error::Config(
            "set API_ID and API_HASH for a user session, or TELEGRAM_BOT_TOKEN for a bot session"
                .to_string(),
        )),
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_str(key)
        .and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests mutate process env; run them one at a time.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const KEYS: &[&str] = &[
        "TELEGRAM_BOT_TOKEN",
        "API_ID",
        "API_HASH",
        "SESSION_NAME",
        "TELEGRAM_PHONE",
        "OUTPUT_FILE",
        "OUTPUT_MODE",
        "CONCURRENCY",
        "MAX_RETRIES",
        "BACKOFF_BASE_MS",
        "BACKOFF_MULTIPLIER",
        "BACKOFF_JITTER",
        "CSV_ONLY_VALID",
    ];

    fn with_env(vars: &[(&str, &str)], f: impl FnOnce()) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        for k in KEYS {
            env::remove_var(k);
        }
        for (k, v) in vars {
            env::set_var(k, v);
        }
        f();
        for k in KEYS {
            env::remove_var(k);
        }
    }

    #[test]
    fn credentials_are_required() {
        with_env(&[], || {
            let err = Config::from_env().unwrap_err().to_string();
            assert!(err.contains("API_ID"));
            assert!(err.contains("TELEGRAM_BOT_TOKEN"));
        });
    }

    #[test]
    fn bot_token_selects_bot_session() {
        with_env(&[("TELEGRAM_BOT_TOKEN", " 123:abc ")], || {
            let cfg = Config::from_env().unwrap();
            assert_eq!(
                cfg.session,
                SessionConfig::Bot {
                    token: "123:abc".to_string()
                }
            );
        });
    }

    #[test]
    fn api_credentials_win_over_bot_token() {
        with_env(
            &[
                ("TELEGRAM_BOT_TOKEN", "123:abc"),
                ("API_ID", "12345"),
                ("API_HASH", "0123456789abcdef"),
                ("SESSION_NAME", "checker"),
            ],
            || {
                let cfg = Config::from_env().unwrap();
                assert_eq!(
                    cfg.session,
                    SessionConfig::User {
                        api_id: 12345,
                        api_hash: "0123456789abcdef".to_string(),
                        session_file: PathBuf::from("checker.session"),
                        phone: None,
                    }
                );
            },
        );
    }

    #[test]
    fn half_or_bad_api_credentials_are_rejected() {
        with_env(&[("API_ID", "12345")], || {
            assert!(Config::from_env().is_err());
        });
        with_env(&[("API_ID", "abc"), ("API_HASH", "0123456789abcdef")], || {
            let err = Config::from_env().unwrap_err();
            assert!(err.to_string().contains("API_ID must be a number"));
        });
    }

    #[test]
    fn defaults_apply() {
        with_env(&[("TELEGRAM_BOT_TOKEN", "123:abc")], || {
            let cfg = Config::from_env().unwrap();
            assert_eq!(cfg.concurrency, 5);
            assert_eq!(cfg.retry, RetryPolicy::default());
            assert_eq!(cfg.output_file, Some(PathBuf::from("results.csv")));
            assert_eq!(cfg.output_mode, OutputMode::Compact);
            assert!(cfg.csv_only_valid);
        });
    }

    #[test]
    fn overrides_are_parsed() {
        with_env(
            &[
                ("TELEGRAM_BOT_TOKEN", "123:abc"),
                ("OUTPUT_FILE", ""),
                ("OUTPUT_MODE", "jsonl"),
                ("CONCURRENCY", "0"),
                ("MAX_RETRIES", "2"),
                ("BACKOFF_BASE_MS", "250"),
                ("CSV_ONLY_VALID", "0"),
            ],
            || {
                let cfg = Config::from_env().unwrap();
                assert_eq!(cfg.output_file, None);
                assert_eq!(cfg.output_mode, OutputMode::Jsonl);
                assert_eq!(cfg.concurrency, 1);
                assert_eq!(cfg.retry.max_retries, 2);
                assert_eq!(cfg.retry.base_delay, Duration::from_millis(250));
                assert!(!cfg.csv_only_valid);
            },
        );
    }

    #[test]
    fn rejects_shrinking_backoff() {
        with_env(
            &[("TELEGRAM_BOT_TOKEN", "123:abc"), ("BACKOFF_MULTIPLIER", "0.5")],
            || {
                assert!(Config::from_env().is_err());
            },
        );
    }
}
