use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use crate::agents::cache::PipelineCache;
use crate::agents::plan::{Plan, parse_plan};
use crate::agents::{Assistant, AssistantReply, Executor, ExecutorSettings, Pricing, SessionLedger};
use crate::config::{RuntimeConfig, ToolCredentials};
use crate::provider::resolve_llm_client;
use crate::telemetry::TelemetrySink;
use crate::theme::{self, BOLD, DIM, RESET};
use crate::tools::{ToolRegistry, build_builtin_tools};

pub fn build_registry(cfg: &RuntimeConfig) -> Result<Arc<ToolRegistry>> {
    let creds = ToolCredentials::from_env();
    let registry = build_builtin_tools(cfg, &creds).context("failed to build tool registry")?;
    Ok(Arc::new(registry))
}

pub fn build_assistant(cfg: &RuntimeConfig, telemetry: &TelemetrySink) -> Result<Assistant> {
    let llm = resolve_llm_client(cfg)?;
    telemetry.emit(
        "model.resolved",
        json!({ "backend": llm.backend_name(), "model": llm.model() }),
    );
    let registry = build_registry(cfg)?;

    Ok(
        Assistant::new(llm, registry, ExecutorSettings::from_config(cfg))
            .with_cache(PipelineCache::from_config(cfg))
            .with_pricing(Pricing::from_config(cfg))
            .with_telemetry(telemetry.clone()),
    )
}

pub fn load_plan_file(path: &str) -> Result<Plan> {
    let content = std::fs::read_to_string(Path::new(path))
        .with_context(|| format!("failed to read plan file '{path}'"))?;
    parse_plan(&content).with_context(|| format!("plan file '{path}' is not a valid plan"))
}

pub fn print_reply(reply: &AssistantReply, trace: bool) {
    if trace {
        println!("{}", theme::format_plan(&reply.plan));
        println!("{}", theme::format_results(&reply.results));
        println!("{}", theme::format_answer(&reply.answer, reply.status));
        let hits = &reply.cache;
        println!(
            "{DIM}cost=${:.6} cache(plan={}, results={}, verdict={}){RESET}",
            reply.cost_usd, hits.plan, hits.results, hits.verdict
        );
    } else {
        println!("{}", reply.answer);
    }
}

pub async fn run_ask(
    cfg: &RuntimeConfig,
    telemetry: &TelemetrySink,
    prompt: &str,
    trace: bool,
) -> Result<()> {
    let assistant = build_assistant(cfg, telemetry)?;
    let mut ledger = SessionLedger::new();
    let reply = assistant.handle(prompt, &mut ledger).await;
    print_reply(&reply, trace);
    tracing::info!(ledger = %ledger.summary_line(), "Request finished");
    Ok(())
}

pub async fn run_plan(cfg: &RuntimeConfig, telemetry: &TelemetrySink, prompt: &str) -> Result<()> {
    let assistant = build_assistant(cfg, telemetry)?;
    let mut ledger = SessionLedger::new();
    let planned = assistant.plan(prompt, &mut ledger).await;
    let rendered = serde_json::to_string_pretty(&planned.plan).context("failed to render plan")?;
    println!("{rendered}");
    if planned.failure.as_ref().is_some_and(|f| f.rate_limited) {
        eprintln!("{}", crate::agents::orchestrator::QUOTA_EXCEEDED_MESSAGE);
    }
    Ok(())
}

/// Runs a wire-format plan without a generation backend.
pub async fn run_execute(
    cfg: &RuntimeConfig,
    telemetry: &TelemetrySink,
    plan_file: &str,
) -> Result<()> {
    let plan = load_plan_file(plan_file)?;
    let executor = Executor::new(build_registry(cfg)?, ExecutorSettings::from_config(cfg))
        .with_telemetry(telemetry.clone());
    let results = executor.execute_plan(plan).await;

    let rendered = serde_json::to_string_pretty(&json!({
        "results": results,
        "by_tool": results.by_tool(),
        "failures": results.failure_count(),
    }))
    .context("failed to render execution results")?;
    println!("{rendered}");
    Ok(())
}

pub fn run_tools(cfg: &RuntimeConfig) -> Result<()> {
    let registry = build_registry(cfg)?;
    println!("{BOLD}Registered tools ({}){RESET}", registry.len());
    for schema in registry.schemas() {
        println!("- {}: {}", schema.name, schema.description);
        for (name, hint) in &schema.parameters {
            println!("    {name}: {DIM}{hint}{RESET}");
        }
    }
    Ok(())
}
