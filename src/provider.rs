use std::sync::Arc;

use anyhow::{Context, Result};
use secrecy::Secret;

use crate::cli::Provider;
use crate::config::{RuntimeConfig, env_secret};
use crate::llm::gemini::{DEFAULT_GEMINI_MODEL, GeminiBackend, GeminiConfig};
use crate::llm::openai::{DEFAULT_OPENAI_MODEL, OpenAiBackend, OpenAiConfig};
use crate::llm::{GenerationBackend, LlmClient};

pub const GEMINI_KEY_ENVS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const OPENAI_KEY_ENV: &str = "OPENAI_API_KEY";

pub fn validate_model_for_provider(
    provider: Provider,
    model_name: &str,
    custom_base_url: bool,
) -> Result<()> {
    let is_valid = match provider {
        Provider::Gemini => model_name.starts_with("gemini"),
        // Compatible endpoints serve arbitrary model names.
        Provider::Openai if custom_base_url => !model_name.trim().is_empty(),
        Provider::Openai => {
            model_name.starts_with("gpt-")
                || model_name.starts_with("o1")
                || model_name.starts_with("o3")
                || model_name.starts_with("o4")
        }
        Provider::Auto => true,
    };

    if is_valid {
        return Ok(());
    }

    Err(anyhow::anyhow!(
        "model '{}' is not compatible with provider '{:?}'",
        model_name,
        provider
    ))
}

pub fn resolve_backend(cfg: &RuntimeConfig) -> Result<(Arc<dyn GenerationBackend>, Provider)> {
    let provider = match cfg.provider {
        Provider::Auto => detect_provider().context(
            "no provider could be auto-detected. Set GEMINI_API_KEY (or GOOGLE_API_KEY) \
             or OPENAI_API_KEY, or pass --provider",
        )?,
        p => p,
    };
    let custom_base_url = cfg.llm_base_url.is_some();

    match provider {
        Provider::Gemini => {
            let api_key = gemini_key().context("GEMINI_API_KEY is required for Gemini provider")?;
            let model_name = cfg
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
            validate_model_for_provider(provider, &model_name, custom_base_url)?;
            let mut config = GeminiConfig::new(api_key)
                .with_model(model_name)
                .with_timeout(cfg.llm_timeout());
            if let Some(url) = &cfg.llm_base_url {
                config = config.with_base_url(url);
            }
            let backend = GeminiBackend::new(config).context("failed to build Gemini provider")?;
            Ok((Arc::new(backend), provider))
        }
        Provider::Openai => {
            let api_key = env_secret(OPENAI_KEY_ENV)
                .context("OPENAI_API_KEY is required for OpenAI provider")?;
            let model_name = cfg
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string());
            validate_model_for_provider(provider, &model_name, custom_base_url)?;
            let mut config = OpenAiConfig::new(api_key)
                .with_model(model_name)
                .with_timeout(cfg.llm_timeout());
            if let Some(url) = &cfg.llm_base_url {
                config = config.with_base_url(url);
            }
            let backend = OpenAiBackend::new(config).context("failed to build OpenAI provider")?;
            Ok((Arc::new(backend), provider))
        }
        Provider::Auto => Err(anyhow::anyhow!(
            "auto provider must be resolved before building a backend"
        )),
    }
}

pub fn resolve_llm_client(cfg: &RuntimeConfig) -> Result<LlmClient> {
    let (backend, provider) = resolve_backend(cfg)?;
    tracing::info!(
        provider = ?provider,
        model = backend.model(),
        "Resolved generation backend"
    );
    Ok(LlmClient::new(backend))
}

fn gemini_key() -> Option<Secret<String>> {
    GEMINI_KEY_ENVS.iter().find_map(|key| env_secret(key))
}

pub fn detect_provider() -> Option<Provider> {
    if GEMINI_KEY_ENVS.iter().any(|key| env_present(key)) {
        return Some(Provider::Gemini);
    }
    if env_present(OPENAI_KEY_ENV) {
        return Some(Provider::Openai);
    }
    None
}

pub fn env_present(key: &str) -> bool {
    std::env::var(key)
        .map(|v| !v.trim().is_empty())
        .unwrap_or(false)
}
