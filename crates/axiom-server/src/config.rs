use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use axiom_engine::OpenAiConfig;

/// Placeholder session secrets that MUST NOT be used outside dev mode.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub session_ttl: chrono::Duration,
    pub threads_public_by_default: bool,
    pub openai: OpenAiConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Missing keys take defaults;
    /// a missing AI credential or a placeholder session secret (outside
    /// dev mode) is an error.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let api_key = lookup("OPENAI_API_KEY").unwrap_or_default();
        if api_key.trim().is_empty() {
            bail!("OPENAI_API_KEY is not set. Add OPENAI_API_KEY='sk-yourkey' to your .env file and restart.");
        }

        let dev_mode = parse_flag(&var("AXIOM_DEV_MODE", "false"));
        let jwt_secret = match lookup("AXIOM_JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) if !PLACEHOLDER_SECRETS.contains(&secret.as_str()) => secret,
            _ if dev_mode => DEV_SECRET.to_string(),
            _ => bail!("AXIOM_JWT_SECRET is unset or still a placeholder. Set it, or AXIOM_DEV_MODE=1 for local use."),
        };

        let port: u16 = var("AXIOM_PORT", "5001").parse().context("AXIOM_PORT")?;
        let session_days: i64 = var("AXIOM_SESSION_DAYS", "30").parse().context("AXIOM_SESSION_DAYS")?;

        let mut openai = OpenAiConfig::new(api_key);
        if let Some(base_url) = lookup("AXIOM_OPENAI_BASE_URL") {
            openai.base_url = base_url;
        }
        if let Some(model) = lookup("AXIOM_OPENAI_MODEL") {
            openai.model = model;
        }
        if let Some(max_tokens) = lookup("AXIOM_OPENAI_MAX_TOKENS") {
            openai.max_tokens = max_tokens.parse().context("AXIOM_OPENAI_MAX_TOKENS")?;
        }
        if let Some(temperature) = lookup("AXIOM_OPENAI_TEMPERATURE") {
            openai.temperature = temperature.parse().context("AXIOM_OPENAI_TEMPERATURE")?;
        }
        if let Some(timeout) = lookup("AXIOM_OPENAI_TIMEOUT_SECS") {
            openai.timeout = Duration::from_secs(timeout.parse().context("AXIOM_OPENAI_TIMEOUT_SECS")?);
        }

        Ok(Self {
            host: var("AXIOM_HOST", "0.0.0.0"),
            port,
            db_path: var("AXIOM_DB_PATH", "axiom.db").into(),
            jwt_secret,
            session_ttl: chrono::Duration::days(session_days),
            threads_public_by_default: parse_flag(&var("AXIOM_THREADS_PUBLIC_BY_DEFAULT", "false")),
            openai,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
