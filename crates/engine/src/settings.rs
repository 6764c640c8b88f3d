//! Environment-driven configuration.

use std::fmt;

/// Which provider adapter backs the deliberation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Mock,
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    fn parse(value: &str) -> Result<Self, SettingsError> {
        match value.to_ascii_lowercase().as_str() {
            "mock" => Ok(ProviderKind::Mock),
            "openai" => Ok(ProviderKind::OpenAi),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "gemini" => Ok(ProviderKind::Gemini),
            other => Err(SettingsError::UnknownProvider(other.to_string())),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Mock => f.write_str("mock"),
            ProviderKind::OpenAi => f.write_str("openai"),
            ProviderKind::Anthropic => f.write_str("anthropic"),
            ProviderKind::Gemini => f.write_str("gemini"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Unsupported LLM provider '{0}'")]
    UnknownProvider(String),
    #[error("{0} is required when LLM_PROVIDER={1}")]
    MissingApiKey(&'static str, ProviderKind),
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, String),
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub provider_timeout_secs: u64,
    pub api_key: Option<String>,
    pub db_path: String,
    pub server_host: String,
    pub server_port: u16,
    pub cors_allowed_origins: Option<String>,
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        let provider = ProviderKind::parse(
            &std::env::var("LLM_PROVIDER").unwrap_or_else(|_| "mock".into()),
        )?;
        let model = std::env::var("LLM_MODEL").ok().filter(|s| !s.is_empty());

        let temperature = parse_env("LLM_TEMPERATURE", 0.7)?;
        let max_output_tokens = parse_env("LLM_MAX_OUTPUT_TOKENS", 900)?;
        let provider_timeout_secs = parse_env("LLM_TIMEOUT_SECS", 60)?;

        let api_key = match provider {
            ProviderKind::Mock => None,
            ProviderKind::OpenAi => Some(require_key("OPENAI_API_KEY", provider)?),
            ProviderKind::Anthropic => Some(require_key("ANTHROPIC_API_KEY", provider)?),
            ProviderKind::Gemini => Some(require_key("GEMINI_API_KEY", provider)?),
        };

        let db_path = std::env::var("WBA_DB_PATH").unwrap_or_else(|_| "data/worldbuild.sqlite3".into());
        let server_host = std::env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let server_port = std::env::var("SERVER_PORT")
            .or_else(|_| std::env::var("PORT"))
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .unwrap_or(3000);
        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Settings {
            provider,
            model,
            temperature,
            max_output_tokens,
            provider_timeout_secs,
            api_key,
            db_path,
            server_host,
            server_port,
            cors_allowed_origins,
        })
    }
}

fn require_key(name: &'static str, provider: ProviderKind) -> Result<String, SettingsError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or(SettingsError::MissingApiKey(name, provider))
}

fn parse_env<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, SettingsError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| SettingsError::Invalid(name, raw)),
        Err(_) => Ok(default),
    }
}
