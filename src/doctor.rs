use anyhow::Result;

use crate::config::{
    EXCHANGE_RATE_KEY_ENV, GITHUB_TOKEN_ENVS, NEWS_API_KEY_ENV, RuntimeConfig, TOMTOM_API_KEY_ENV,
    WEATHER_API_KEY_ENV,
};
use crate::provider::{GEMINI_KEY_ENVS, OPENAI_KEY_ENV, detect_provider, env_present};
use crate::tools::{
    CURRENCY_TOOL_NAME, DATE_PLANNER_TOOL_NAME, GITHUB_TOOL_NAME, NEWS_TOOL_NAME,
    WEATHER_TOOL_NAME,
};

/// Tools whose upstream needs a credential, and the variable each reads.
pub const TOOL_KEY_CHECKS: &[(&str, &str)] = &[
    (WEATHER_TOOL_NAME, WEATHER_API_KEY_ENV),
    (NEWS_TOOL_NAME, NEWS_API_KEY_ENV),
    (CURRENCY_TOOL_NAME, EXCHANGE_RATE_KEY_ENV),
    (DATE_PLANNER_TOOL_NAME, TOMTOM_API_KEY_ENV),
];

pub fn run_doctor(cfg: &RuntimeConfig) -> Result<()> {
    println!(
        "Active profile: '{}' (config: {})",
        cfg.profile, cfg.config_path
    );

    println!("Provider environment check:");
    for key in GEMINI_KEY_ENVS.iter().chain(std::iter::once(&OPENAI_KEY_ENV)) {
        let status = if env_present(key) { "set" } else { "missing" };
        println!("- {key}: {status}");
    }

    match detect_provider() {
        Some(provider) => println!("Auto provider resolution: {:?}", provider),
        None => {
            println!("Auto provider resolution: none");
            println!("Tip: export GEMINI_API_KEY or OPENAI_API_KEY before running ask/chat/serve");
        }
    }

    println!("Tool credential check:");
    for (tool, key) in TOOL_KEY_CHECKS {
        let status = if env_present(key) {
            "set"
        } else {
            "missing (tool calls will fail)"
        };
        println!("- {tool}: {key} {status}");
    }
    let github = if GITHUB_TOKEN_ENVS.iter().any(|key| env_present(key)) {
        "token set"
    } else {
        "anonymous (lower rate limit)"
    };
    println!("- {GITHUB_TOOL_NAME}: {github}");

    println!(
        "Model: {} (provider={:?}, timeout_secs={})",
        cfg.model.as_deref().unwrap_or("<provider-default>"),
        cfg.provider,
        cfg.llm_timeout_secs
    );
    println!(
        "Executor: schedule={:?} max_concurrency={} tool_timeout_secs={}",
        cfg.schedule, cfg.max_concurrency, cfg.tool_timeout_secs
    );
    println!(
        "Cache: ttl_secs={} max_entries={}",
        cfg.cache_ttl_secs, cfg.cache_max_entries
    );
    println!(
        "Telemetry: enabled={} path={}",
        cfg.telemetry_enabled, cfg.telemetry_path
    );

    Ok(())
}
