use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use secrecy::Secret;
use serde::Deserialize;

use crate::cli::*;

pub const DEFAULT_PRICE_INPUT_PER_MILLION: f64 = 0.075;
pub const DEFAULT_PRICE_OUTPUT_PER_MILLION: f64 = 0.30;

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub profile: String,
    pub config_path: String,
    pub provider: Provider,
    pub model: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub max_concurrency: usize,
    pub schedule: ScheduleMode,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: u64,
    pub price_input_per_million: f64,
    pub price_output_per_million: f64,
    pub venue_country_set: String,
    pub telemetry_enabled: bool,
    pub telemetry_path: String,
    pub show_sensitive_config: bool,
}

impl RuntimeConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_secs)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfilesFile {
    #[serde(default)]
    pub profiles: HashMap<String, ProfileConfig>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    pub provider: Option<Provider>,
    pub model: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_timeout_secs: Option<u64>,
    pub tool_timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub schedule: Option<ScheduleMode>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_max_entries: Option<u64>,
    pub price_input_per_million: Option<f64>,
    pub price_output_per_million: Option<f64>,
    pub venue_country_set: Option<String>,
    pub telemetry_enabled: Option<bool>,
    pub telemetry_path: Option<String>,
}

/// Upstream credentials, read from the environment only.
#[derive(Debug, Clone, Default)]
pub struct ToolCredentials {
    pub weather_api_key: Option<Secret<String>>,
    pub news_api_key: Option<Secret<String>>,
    pub exchange_rate_key: Option<Secret<String>>,
    pub tomtom_api_key: Option<Secret<String>>,
    pub github_token: Option<Secret<String>>,
}

pub const WEATHER_API_KEY_ENV: &str = "WEATHER_API_KEY";
pub const NEWS_API_KEY_ENV: &str = "NEWS_API_KEY";
pub const EXCHANGE_RATE_KEY_ENV: &str = "EXCHANGE_RATE_KEY";
pub const TOMTOM_API_KEY_ENV: &str = "TOMTOM_API_KEY";
pub const GITHUB_TOKEN_ENVS: &[&str] = &["GITHUB_TOKEN", "GH_TOKEN"];

impl ToolCredentials {
    pub fn from_env() -> Self {
        Self {
            weather_api_key: env_secret(WEATHER_API_KEY_ENV),
            news_api_key: env_secret(NEWS_API_KEY_ENV),
            exchange_rate_key: env_secret(EXCHANGE_RATE_KEY_ENV),
            tomtom_api_key: env_secret(TOMTOM_API_KEY_ENV),
            github_token: GITHUB_TOKEN_ENVS.iter().find_map(|key| env_secret(key)),
        }
    }
}

pub fn env_secret(key: &str) -> Option<Secret<String>> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(Secret::new)
}

/// Outcome of `.env` loading, reported once logging is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DotenvStatus {
    Loaded(PathBuf),
    Missing,
    Invalid(String),
}

impl DotenvStatus {
    fn from_result(result: std::result::Result<PathBuf, dotenvy::Error>) -> Self {
        match result {
            Ok(path) => DotenvStatus::Loaded(path),
            Err(err) if err.not_found() => DotenvStatus::Missing,
            Err(err) => DotenvStatus::Invalid(err.to_string()),
        }
    }

    pub fn log(&self) {
        match self {
            DotenvStatus::Loaded(path) => {
                tracing::debug!(path = %path.display(), "Loaded .env file")
            }
            DotenvStatus::Missing => {}
            DotenvStatus::Invalid(error) => {
                eprintln!("Warning: failed to parse .env file: {error}");
                tracing::warn!(error = %error, "failed to parse .env file")
            }
        }
    }
}

/// Loads `.env` from the working directory. Existing variables win.
pub fn load_dotenv() -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::dotenv())
}

pub fn load_dotenv_from(path: &Path) -> DotenvStatus {
    DotenvStatus::from_result(dotenvy::from_path(path).map(|()| path.to_path_buf()))
}

pub fn load_profiles(config_path: &str) -> Result<ProfilesFile> {
    let path = Path::new(config_path);
    if !path.exists() {
        return Ok(ProfilesFile::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read profile config file at '{}'", path.display()))?;
    toml::from_str::<ProfilesFile>(&content).with_context(|| {
        format!(
            "invalid profile configuration in '{}'. Check provider/schedule values and field names.",
            path.display()
        )
    })
}

pub fn resolve_runtime_config(cli: &Cli, profiles: &ProfilesFile) -> Result<RuntimeConfig> {
    let selected = cli.profile.trim();
    if selected.is_empty() {
        return Err(anyhow::anyhow!(
            "profile name cannot be empty. Set --profile <name>."
        ));
    }

    let profile = if selected == "default" && !profiles.profiles.contains_key("default") {
        ProfileConfig::default()
    } else {
        profiles.profiles.get(selected).cloned().ok_or_else(|| {
            let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
            names.sort();
            if names.is_empty() {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. No profiles are defined yet.",
                    selected,
                    cli.config_path
                )
            } else {
                anyhow::anyhow!(
                    "profile '{}' not found in '{}'. Available profiles: {}",
                    selected,
                    cli.config_path,
                    names.join(", ")
                )
            }
        })?
    };

    let provider = if cli.provider != Provider::Auto {
        cli.provider
    } else {
        profile.provider.unwrap_or(Provider::Auto)
    };

    Ok(RuntimeConfig {
        profile: selected.to_string(),
        config_path: cli.config_path.clone(),
        provider,
        model: cli.model.clone().or(profile.model),
        llm_base_url: cli.llm_base_url.clone().or(profile.llm_base_url),
        llm_timeout_secs: cli
            .llm_timeout_secs
            .or(profile.llm_timeout_secs)
            .unwrap_or(60)
            .max(1),
        tool_timeout_secs: cli
            .tool_timeout_secs
            .or(profile.tool_timeout_secs)
            .unwrap_or(20)
            .max(1),
        max_concurrency: cli
            .max_concurrency
            .or(profile.max_concurrency)
            .unwrap_or(8)
            .max(1),
        schedule: cli
            .schedule
            .or(profile.schedule)
            .unwrap_or(ScheduleMode::Batched),
        cache_ttl_secs: cli
            .cache_ttl_secs
            .or(profile.cache_ttl_secs)
            .unwrap_or(3600),
        cache_max_entries: profile.cache_max_entries.unwrap_or(256).max(1),
        price_input_per_million: profile
            .price_input_per_million
            .unwrap_or(DEFAULT_PRICE_INPUT_PER_MILLION),
        price_output_per_million: profile
            .price_output_per_million
            .unwrap_or(DEFAULT_PRICE_OUTPUT_PER_MILLION),
        venue_country_set: profile
            .venue_country_set
            .map(|value| value.trim().to_ascii_uppercase())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| "IN".to_string()),
        telemetry_enabled: cli
            .telemetry_enabled
            .or(profile.telemetry_enabled)
            .unwrap_or(true),
        telemetry_path: cli
            .telemetry_path
            .clone()
            .or(profile.telemetry_path)
            .unwrap_or_else(|| ".ops-assistant/telemetry/events.jsonl".to_string()),
        show_sensitive_config: cli.show_sensitive_config,
    })
}
