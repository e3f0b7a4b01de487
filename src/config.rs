//! Configuration types.
//!
//! Read once from the environment at startup and passed down; nothing below
//! `main` looks at the environment again.

use std::time::Duration;

use chrono::FixedOffset;
use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default trigger phrase: "an application has been received".
pub const DEFAULT_TRIGGER_PHRASE: &str = "の応募がございました";

/// Where rows are written.
#[derive(Debug, Clone)]
pub enum SheetsBackend {
    Google {
        service_account_json: SecretString,
        spreadsheet_key: String,
    },
    /// In-process store; rows are lost on exit. For local runs.
    Memory,
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Bot token for threaded replies. `None` disables replies.
    pub slack_bot_token: Option<SecretString>,
    pub sheets: SheetsBackend,
    pub llm: LlmConfig,
    /// Substrings that mark a message as an application notification.
    pub trigger_phrases: Vec<String>,
    /// Offset used to turn event timestamps into calendar dates.
    pub timezone_offset: FixedOffset,
    /// Delay before the single extraction retry.
    pub extraction_retry_delay: Duration,
    /// Number of recent event keys remembered for duplicate suppression.
    pub dedup_capacity: usize,
}

impl AppConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = parse_or(&get, "PORT", 5000u16)?;

        let slack_bot_token = get("SLACK_BOT_TOKEN").map(SecretString::from);

        let sheets = match get("SHEETS_BACKEND").as_deref().unwrap_or("google") {
            "google" => SheetsBackend::Google {
                service_account_json: get("GCP_SERVICE_ACCOUNT_JSON")
                    .map(SecretString::from)
                    .ok_or_else(|| ConfigError::MissingEnvVar("GCP_SERVICE_ACCOUNT_JSON".into()))?,
                spreadsheet_key: get("SPREADSHEET_KEY")
                    .ok_or_else(|| ConfigError::MissingEnvVar("SPREADSHEET_KEY".into()))?,
            },
            "memory" => SheetsBackend::Memory,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "SHEETS_BACKEND".into(),
                    message: format!("expected google or memory, got '{other}'"),
                });
            }
        };

        let llm = llm_config(&get)?;

        let trigger_phrases: Vec<String> = get("TRIGGER_PHRASES")
            .unwrap_or_else(|| DEFAULT_TRIGGER_PHRASE.to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if trigger_phrases.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "TRIGGER_PHRASES".into(),
                message: "at least one phrase is required".into(),
            });
        }

        let offset_hours: i32 = parse_or(&get, "TIMEZONE_OFFSET_HOURS", 9)?;
        let timezone_offset = offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "TIMEZONE_OFFSET_HOURS".into(),
                message: format!("{offset_hours} is out of range"),
            })?;

        let retry_ms: u64 = parse_or(&get, "EXTRACTION_RETRY_DELAY_MS", 1000)?;
        let dedup_capacity: usize = parse_or(&get, "DEDUP_CAPACITY", 1024)?;

        Ok(Self {
            port,
            slack_bot_token,
            sheets,
            llm,
            trigger_phrases,
            timezone_offset,
            extraction_retry_delay: Duration::from_millis(retry_ms),
            dedup_capacity,
        })
    }
}

fn llm_config<G>(get: &G) -> Result<LlmConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let backend = match get("LLM_BACKEND").as_deref() {
        Some("anthropic") => LlmBackend::Anthropic,
        Some("openai") => LlmBackend::OpenAi,
        Some("none") => LlmBackend::Disabled,
        Some(other) => {
            return Err(ConfigError::InvalidValue {
                key: "LLM_BACKEND".into(),
                message: format!("expected anthropic, openai or none, got '{other}'"),
            });
        }
        None if get("OPENAI_API_KEY").is_some() => LlmBackend::OpenAi,
        None if get("ANTHROPIC_API_KEY").is_some() => LlmBackend::Anthropic,
        None => LlmBackend::Disabled,
    };

    let api_key = match backend {
        LlmBackend::OpenAi => get("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".into()))?,
        LlmBackend::Anthropic => get("ANTHROPIC_API_KEY")
            .ok_or_else(|| ConfigError::MissingEnvVar("ANTHROPIC_API_KEY".into()))?,
        LlmBackend::Disabled => String::new(),
    };

    Ok(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model: get("LLM_MODEL").unwrap_or_else(|| backend.default_model().to_string()),
    })
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}
