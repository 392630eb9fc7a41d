use anyhow::Result;

use crate::config::{ProfilesFile, RuntimeConfig};

pub fn run_profiles_list(profiles: &ProfilesFile, cfg: &RuntimeConfig) -> Result<()> {
    let mut names = profiles.profiles.keys().cloned().collect::<Vec<String>>();
    if !names.iter().any(|name| name == "default") {
        names.push("default".to_string());
    }
    names.sort();

    println!("Configured profiles (active='{}'):", cfg.profile);
    for name in names {
        let marker = if name == cfg.profile { "*" } else { " " };
        let source = if profiles.profiles.contains_key(&name) {
            "configured"
        } else {
            "implicit"
        };
        println!("{marker} {name} ({source})");
    }

    Ok(())
}

pub fn run_profiles_show(cfg: &RuntimeConfig) -> Result<()> {
    println!("Active profile: {}", cfg.profile);
    println!("Config path: {}", cfg.config_path);
    println!("Provider: {:?}", cfg.provider);
    println!(
        "Model: {}",
        cfg.model.as_deref().unwrap_or("<provider-default>")
    );
    println!(
        "Model base URL: {}",
        display_base_url(cfg.llm_base_url.as_deref(), cfg.show_sensitive_config)
    );
    println!("Model timeout (secs): {}", cfg.llm_timeout_secs);
    println!("Tool timeout (secs): {}", cfg.tool_timeout_secs);
    println!("Max concurrency: {}", cfg.max_concurrency);
    println!("Schedule: {:?}", cfg.schedule);
    println!("Cache TTL (secs): {}", cfg.cache_ttl_secs);
    println!("Cache max entries: {}", cfg.cache_max_entries);
    println!(
        "Pricing (USD per 1M tokens): input={} output={}",
        cfg.price_input_per_million, cfg.price_output_per_million
    );
    println!("Venue country set: {}", cfg.venue_country_set);
    println!("Telemetry enabled: {}", cfg.telemetry_enabled);
    println!("Telemetry path: {}", cfg.telemetry_path);
    Ok(())
}

/// Hides query strings, which some gateways use for keys.
pub fn display_base_url(url: Option<&str>, show_sensitive: bool) -> String {
    match url {
        None => "<provider-default>".to_string(),
        Some(url) if show_sensitive => url.to_string(),
        Some(url) => match url.split_once('?') {
            Some((base, _)) => format!("{base}?<redacted>"),
            None => url.to_string(),
        },
    }
}
