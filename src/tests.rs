use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde_json::{Map, Value, json};
use tempfile::tempdir;

use crate::agents::cache::PipelineCache;
use crate::agents::orchestrator::{GENERIC_FAILURE_MESSAGE, QUOTA_EXCEEDED_MESSAGE};
use crate::agents::{
    Assistant, ExecutionResult, Executor, ExecutorSettings, Plan, PlanStep, Planner, Pricing,
    SessionLedger, StepOutput, VerificationStatus,
};
use crate::cli::{Provider, ScheduleMode};
use crate::config::RuntimeConfig;
use crate::llm::{BackendOutput, GenerationBackend, GenerationRequest, LlmClient, LlmError, TokenUsage};
use crate::server::{
    ServerPromptRequest, ServerState, handle_server_execute, handle_server_plan,
    handle_server_session, handle_server_session_reset,
};
use crate::telemetry::{TelemetrySink, summarize_telemetry_lines};
use crate::tools::{Tool, ToolError, ToolRegistry, ToolSchema};

fn base_cfg() -> RuntimeConfig {
    RuntimeConfig {
        profile: "default".to_string(),
        config_path: ".ops-assistant/config.toml".to_string(),
        provider: Provider::Auto,
        model: None,
        llm_base_url: None,
        llm_timeout_secs: 60,
        tool_timeout_secs: 20,
        max_concurrency: 8,
        schedule: ScheduleMode::Batched,
        cache_ttl_secs: 3600,
        cache_max_entries: 256,
        price_input_per_million: 0.075,
        price_output_per_million: 0.30,
        venue_country_set: "IN".to_string(),
        telemetry_enabled: false,
        telemetry_path: ".ops-assistant/test-telemetry.jsonl".to_string(),
        show_sensitive_config: false,
    }
}

// ---------------------------------------------------------------------------
// Scripted generation backend
// ---------------------------------------------------------------------------

type Scripted = Result<BackendOutput, LlmError>;

struct ScriptedBackend {
    replies: Mutex<VecDeque<Scripted>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Scripted>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: GenerationRequest) -> Result<BackendOutput, LlmError> {
        self.prompts.lock().unwrap().push(request.system_prompt);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Malformed("script exhausted".to_string())))
    }
}

fn reply(text: &str) -> Scripted {
    Ok(BackendOutput {
        text: text.to_string(),
        usage: Some(TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 100,
        }),
    })
}

fn llm(backend: &Arc<ScriptedBackend>) -> LlmClient {
    LlmClient::new(Arc::clone(backend) as Arc<dyn GenerationBackend>)
}

// ---------------------------------------------------------------------------
// Fake tools
// ---------------------------------------------------------------------------

/// Sleeps, then echoes its arguments. Tracks calls and peak concurrency.
struct SleepTool {
    schema: ToolSchema,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
}

impl SleepTool {
    fn new(name: &str, delay: Duration) -> Arc<Self> {
        Self::with_log(name, delay, Arc::new(Mutex::new(Vec::new())))
    }

    fn with_log(name: &str, delay: Duration, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            schema: ToolSchema::new(name, "test tool").param("delay_ms", "number"),
            delay,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            log,
        })
    }
}

#[async_trait]
impl Tool for SleepTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = args
            .get("delay_ms")
            .and_then(Value::as_u64)
            .map(Duration::from_millis)
            .unwrap_or(self.delay);
        tokio::time::sleep(delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.log.lock().unwrap().push(self.schema.name.clone());
        Ok(json!({ "tool": self.schema.name, "args": args }))
    }
}

struct FailingTool {
    schema: ToolSchema,
}

#[async_trait]
impl Tool for FailingTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        Err(ToolError::Upstream {
            status: 401,
            message: "Invalid API key".to_string(),
        })
    }
}

struct PanickingTool {
    schema: ToolSchema,
}

#[async_trait]
impl Tool for PanickingTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, _args: &Map<String, Value>) -> Result<Value, ToolError> {
        panic!("tool bug");
    }
}

fn args(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn settings(max_concurrency: usize, step_timeout: Duration) -> ExecutorSettings {
    ExecutorSettings {
        max_concurrency,
        step_timeout,
        schedule: ScheduleMode::Batched,
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn parallel_steps_finish_in_the_time_of_the_slowest() {
    let tool = SleepTool::new("sleep_tool", Duration::from_millis(100));
    let registry = Arc::new(ToolRegistry::new().with_tool(tool.clone()));
    let executor = Executor::new(registry, settings(8, Duration::from_secs(20)));

    let plan = Plan::new(vec![
        PlanStep::new("sleep_tool", args(json!({"delay_ms": 100}))),
        PlanStep::new("sleep_tool", args(json!({"delay_ms": 300}))),
        PlanStep::new("sleep_tool", args(json!({"delay_ms": 200}))),
    ]);

    let started = tokio::time::Instant::now();
    let results = executor.execute_plan(plan).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 3);
    assert_eq!(results.failure_count(), 0);
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(400), "took {elapsed:?}");
    assert_eq!(tool.peak.load(Ordering::SeqCst), 3);
    assert_eq!(
        results.get(1).map(|entry| entry.output.to_value()),
        Some(json!({"tool": "sleep_tool", "args": {"delay_ms": 300}}))
    );
}

#[tokio::test(start_paused = true)]
async fn hung_step_times_out_without_blocking_others() {
    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(SleepTool::new("fast_tool", Duration::from_millis(10)))
            .with_tool(SleepTool::new("hung_tool", Duration::from_secs(3600))),
    );
    let executor = Executor::new(registry, settings(8, Duration::from_secs(2)));

    let started = tokio::time::Instant::now();
    let results = executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("hung_tool", Map::new()),
            PlanStep::new("fast_tool", Map::new()),
        ]))
        .await;

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(
        results.get(0).map(|entry| entry.output.clone()),
        Some(StepOutput::Failure {
            error: "Timed out after 2s".to_string()
        })
    );
    assert!(!results.get(1).is_some_and(|entry| entry.output.is_failure()));
}

#[tokio::test(start_paused = true)]
async fn concurrency_is_capped_by_the_semaphore() {
    let tool = SleepTool::new("sleep_tool", Duration::from_millis(100));
    let registry = Arc::new(ToolRegistry::new().with_tool(tool.clone()));
    let executor = Executor::new(registry, settings(2, Duration::from_secs(20)));

    let steps = (0..5)
        .map(|_| PlanStep::new("sleep_tool", Map::new()))
        .collect();
    let started = tokio::time::Instant::now();
    let results = executor.execute_plan(Plan::new(steps)).await;

    assert_eq!(results.len(), 5);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 5);
    assert!(tool.peak.load(Ordering::SeqCst) <= 2);
    assert!(started.elapsed() >= Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn sequential_step_waits_for_earlier_steps() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(SleepTool::with_log("slow_tool", Duration::from_millis(200), log.clone()))
            .with_tool(SleepTool::with_log("quick_tool", Duration::from_millis(1), log.clone())),
    );
    let executor = Executor::new(registry, settings(8, Duration::from_secs(20)));

    let results = executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("slow_tool", Map::new()),
            PlanStep::new("quick_tool", Map::new()).sequential(),
        ]))
        .await;

    assert_eq!(results.failure_count(), 0);
    assert_eq!(*log.lock().unwrap(), vec!["slow_tool", "quick_tool"]);
}

#[tokio::test(start_paused = true)]
async fn flat_schedule_ignores_parallel_hints() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(SleepTool::with_log("slow_tool", Duration::from_millis(200), log.clone()))
            .with_tool(SleepTool::with_log("quick_tool", Duration::from_millis(1), log.clone())),
    );
    let executor = Executor::new(
        registry,
        ExecutorSettings {
            schedule: ScheduleMode::Flat,
            ..settings(8, Duration::from_secs(20))
        },
    );

    executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("slow_tool", Map::new()),
            PlanStep::new("quick_tool", Map::new()).sequential(),
        ]))
        .await;

    assert_eq!(*log.lock().unwrap(), vec!["quick_tool", "slow_tool"]);
}

#[tokio::test]
async fn failures_are_isolated_to_their_own_step() {
    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(SleepTool::new("ok_tool", Duration::from_millis(1)))
            .with_tool(Arc::new(FailingTool {
                schema: ToolSchema::new("failing_tool", "always fails"),
            }))
            .with_tool(Arc::new(PanickingTool {
                schema: ToolSchema::new("panicking_tool", "always panics"),
            })),
    );
    let executor = Executor::new(registry, ExecutorSettings::default());

    let results = executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("failing_tool", Map::new()),
            PlanStep::new("panicking_tool", Map::new()),
            PlanStep::new("nonexistent_tool", Map::new()),
            PlanStep::new("ok_tool", Map::new()),
        ]))
        .await;

    assert_eq!(results.len(), 4);
    assert_eq!(results.failure_count(), 3);
    let errors: Vec<Value> = results
        .entries
        .iter()
        .map(|entry| entry.output.to_value())
        .collect();
    assert_eq!(errors[0], json!({"error": "API Error 401: Invalid API key"}));
    assert_eq!(
        errors[1],
        json!({"error": "worker for step 1 terminated unexpectedly"})
    );
    assert_eq!(errors[2], json!({"error": "Tool nonexistent_tool not found"}));
    assert!(errors[3].get("error").is_none());
}

#[tokio::test]
async fn empty_plan_invokes_no_tools() {
    let tool = SleepTool::new("sleep_tool", Duration::from_millis(1));
    let registry = Arc::new(ToolRegistry::new().with_tool(tool.clone()));
    let executor = Executor::new(registry, ExecutorSettings::default());

    let results = executor.execute_plan(Plan::default()).await;

    assert!(results.is_empty());
    assert_eq!(results.to_wire(), "[]");
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn repeated_tool_keeps_every_step_result() {
    let tool = SleepTool::new("weather_tool", Duration::from_millis(1));
    let registry = Arc::new(ToolRegistry::new().with_tool(tool.clone()));
    let executor = Executor::new(registry, ExecutorSettings::default());

    let results = executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("weather_tool", args(json!({"city": "Delhi"}))),
            PlanStep::new("weather_tool", args(json!({"city": "Pune"}))),
        ]))
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(
        results.get(0).map(|entry| entry.output.to_value()["args"]["city"].clone()),
        Some(json!("Delhi"))
    );
    assert_eq!(
        results.by_tool()["weather_tool"]["args"]["city"],
        json!("Pune")
    );
}

#[tokio::test(start_paused = true)]
async fn rerunning_a_plan_gives_identical_results() {
    let registry = Arc::new(
        ToolRegistry::new().with_tool(SleepTool::new("weather_tool", Duration::from_millis(10))),
    );
    let executor = Executor::new(registry, ExecutorSettings::default());
    let plan = Plan::new(vec![
        PlanStep::new("weather_tool", args(json!({"city": "Delhi"}))),
        PlanStep::new("nonexistent_tool", Map::new()),
        PlanStep::new("weather_tool", args(json!({"city": "Pune"}))).sequential(),
    ]);

    let first = executor.execute_plan(plan.clone()).await;
    let second = executor.execute_plan(plan).await;

    assert_eq!(first, second);
    assert_eq!(first.to_wire(), second.to_wire());
    assert_eq!(first.failure_count(), 1);
}

// ---------------------------------------------------------------------------
// Planner
// ---------------------------------------------------------------------------

#[tokio::test]
async fn planner_accepts_fenced_json() {
    let backend = ScriptedBackend::new(vec![reply(
        "```json\n{\"steps\": [{\"tool\": \"weather_tool\", \"args\": {\"city\": \"Delhi\"}, \"parallel\": true}]}\n```",
    )]);
    let planner = Planner::new(llm(&backend));

    let outcome = planner
        .create_plan("weather in Delhi", &[ToolSchema::new("weather_tool", "weather")])
        .await;

    assert!(outcome.plan.error.is_none());
    assert_eq!(outcome.plan.steps.len(), 1);
    assert_eq!(outcome.plan.steps[0].args["city"], json!("Delhi"));
    assert!(backend.prompt(0).contains("User Query: weather in Delhi"));
    assert!(backend.prompt(0).contains("weather_tool"));
}

#[tokio::test]
async fn planner_reports_unparseable_output_as_plan_error() {
    let backend = ScriptedBackend::new(vec![reply("Sure! I'd check the weather first.")]);
    let planner = Planner::new(llm(&backend));

    let outcome = planner.create_plan("weather in Delhi", &[]).await;

    assert!(outcome.plan.steps.is_empty());
    assert!(outcome.plan.error.is_some());
    assert!(outcome.failure.is_none());
    assert!(outcome.usage.is_some());
}

#[tokio::test]
async fn planner_backend_failure_yields_failed_plan() {
    let backend = ScriptedBackend::new(vec![Err(LlmError::Network("connection refused".to_string()))]);
    let planner = Planner::new(llm(&backend));

    let outcome = planner.create_plan("anything", &[]).await;

    assert!(outcome.plan.steps.is_empty());
    let error = outcome.plan.error.unwrap_or_default();
    assert!(error.starts_with("planner backend unavailable"), "{error}");
    assert!(outcome.failure.is_some_and(|failure| !failure.rate_limited));
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

fn assistant(backend: &Arc<ScriptedBackend>, tool: Arc<SleepTool>) -> Assistant {
    let registry = Arc::new(ToolRegistry::new().with_tool(tool));
    Assistant::new(llm(backend), registry, ExecutorSettings::default())
}

const WEATHER_PLAN: &str =
    r#"{"steps": [{"tool": "weather_tool", "args": {"city": "Delhi"}, "parallel": true}]}"#;
const SUCCESS_VERDICT: &str = r#"{"status": "success", "final_answer": "Delhi is 31°C and hazy."}"#;

#[tokio::test]
async fn full_pipeline_returns_verified_answer() {
    let backend = ScriptedBackend::new(vec![reply(WEATHER_PLAN), reply(SUCCESS_VERDICT)]);
    let tool = SleepTool::new("weather_tool", Duration::from_millis(1));
    let assistant = assistant(&backend, tool.clone());
    let mut ledger = SessionLedger::new();

    let reply = assistant.handle("weather in Delhi", &mut ledger).await;

    assert_eq!(reply.answer, "Delhi is 31°C and hazy.");
    assert_eq!(reply.status, VerificationStatus::Success);
    assert!(!reply.rate_limited);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    assert!(backend.prompt(1).contains("Original Query: weather in Delhi"));
    assert!(backend.prompt(1).contains(r#""step":0"#));
    assert_eq!(ledger.requests, 1);
    assert_eq!(ledger.llm_calls, 2);
    assert_eq!(ledger.prompt_tokens, 2000);
    let expected = 2.0 * Pricing::default().cost(TokenUsage {
        prompt_tokens: 1000,
        completion_tokens: 100,
    });
    assert!((reply.cost_usd - expected).abs() < 1e-12);
}

#[tokio::test]
async fn planner_rate_limit_short_circuits_with_quota_message() {
    let backend = ScriptedBackend::new(vec![Err(LlmError::RateLimited(
        "RESOURCE_EXHAUSTED".to_string(),
    ))]);
    let tool = SleepTool::new("weather_tool", Duration::from_millis(1));
    let assistant = assistant(&backend, tool.clone());
    let mut ledger = SessionLedger::new();

    let reply = assistant.handle("weather in Delhi", &mut ledger).await;

    assert_eq!(reply.answer, QUOTA_EXCEEDED_MESSAGE);
    assert!(reply.rate_limited);
    assert!(reply.results.is_empty());
    assert!(reply.verdict.is_none());
    assert_eq!(backend.calls(), 1);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn verifier_rate_limit_yields_quota_message() {
    let backend = ScriptedBackend::new(vec![
        reply(WEATHER_PLAN),
        Err(LlmError::RateLimited("429".to_string())),
    ]);
    let assistant = assistant(&backend, SleepTool::new("weather_tool", Duration::from_millis(1)));

    let reply = assistant
        .handle("weather in Delhi", &mut SessionLedger::new())
        .await;

    assert_eq!(reply.answer, QUOTA_EXCEEDED_MESSAGE);
    assert!(reply.rate_limited);
    assert_eq!(reply.results.len(), 1);
}

#[tokio::test]
async fn free_text_verifier_output_is_passed_through() {
    let backend = ScriptedBackend::new(vec![
        reply(WEATHER_PLAN),
        reply("It is warm in Delhi today."),
    ]);
    let assistant = assistant(&backend, SleepTool::new("weather_tool", Duration::from_millis(1)));

    let reply = assistant
        .handle("weather in Delhi", &mut SessionLedger::new())
        .await;

    assert_eq!(reply.answer, "It is warm in Delhi today.");
    assert_eq!(reply.status, VerificationStatus::Failure);
}

#[tokio::test]
async fn verifier_backend_error_yields_generic_message() {
    let backend = ScriptedBackend::new(vec![
        reply(WEATHER_PLAN),
        Err(LlmError::Http {
            status: 500,
            message: "internal".to_string(),
        }),
    ]);
    let assistant = assistant(&backend, SleepTool::new("weather_tool", Duration::from_millis(1)));

    let reply = assistant
        .handle("weather in Delhi", &mut SessionLedger::new())
        .await;

    assert_eq!(reply.answer, GENERIC_FAILURE_MESSAGE);
    assert!(!reply.rate_limited);
}

#[tokio::test]
async fn empty_plan_still_reaches_the_verifier() {
    let backend = ScriptedBackend::new(vec![
        reply(r#"{"steps": []}"#),
        reply(r#"{"status": "failure", "final_answer": "I have no tool for that."}"#),
    ]);
    let tool = SleepTool::new("weather_tool", Duration::from_millis(1));
    let assistant = assistant(&backend, tool.clone());

    let reply = assistant
        .handle("write me a poem", &mut SessionLedger::new())
        .await;

    assert_eq!(reply.answer, "I have no tool for that.");
    assert_eq!(reply.status, VerificationStatus::Failure);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
    assert!(backend.prompt(1).contains("Execution Results: []"));
}

#[tokio::test]
async fn cached_requests_are_not_charged_again() {
    let backend = ScriptedBackend::new(vec![reply(WEATHER_PLAN), reply(SUCCESS_VERDICT)]);
    let tool = SleepTool::new("weather_tool", Duration::from_millis(1));
    let assistant = assistant(&backend, tool.clone())
        .with_cache(Some(PipelineCache::new(Duration::from_secs(60), 16)));
    let mut ledger = SessionLedger::new();

    let first = assistant.handle("weather in Delhi", &mut ledger).await;
    let second = assistant.handle("weather in Delhi", &mut ledger).await;

    assert_eq!(first.answer, second.answer);
    assert!(second.cache.plan && second.cache.results && second.cache.verdict);
    assert_eq!(second.cost_usd, 0.0);
    assert_eq!(backend.calls(), 2);
    assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ledger.requests, 2);
    assert_eq!(ledger.llm_calls, 2);
}

#[tokio::test]
async fn failed_results_are_not_cached() {
    let backend = ScriptedBackend::new(vec![
        reply(r#"{"steps": [{"tool": "failing_tool", "args": {}}]}"#),
        reply(r#"{"status": "failure", "final_answer": "The key is invalid."}"#),
    ]);
    let registry = Arc::new(ToolRegistry::new().with_tool(Arc::new(FailingTool {
        schema: ToolSchema::new("failing_tool", "always fails"),
    })));
    let assistant = Assistant::new(llm(&backend), registry, ExecutorSettings::default())
        .with_cache(Some(PipelineCache::new(Duration::from_secs(60), 16)));

    let first = assistant.handle("q", &mut SessionLedger::new()).await;
    let plan = first.plan.clone();
    let (_, cached) = assistant.execute(&plan).await;

    assert_eq!(first.results.failure_count(), 1);
    assert!(!cached);
}

// ---------------------------------------------------------------------------
// Server handlers
// ---------------------------------------------------------------------------

fn server_state(backend: &Arc<ScriptedBackend>) -> Arc<ServerState> {
    let assistant = assistant(backend, SleepTool::new("weather_tool", Duration::from_millis(1)));
    Arc::new(ServerState::new(
        "default".to_string(),
        assistant,
        TelemetrySink::disabled(),
    ))
}

#[tokio::test]
async fn server_plan_rejects_empty_prompt() {
    let backend = ScriptedBackend::new(Vec::new());
    let state = server_state(&backend);

    let err = handle_server_plan(
        State(state),
        Json(ServerPromptRequest {
            prompt: "   ".to_string(),
        }),
    )
    .await
    .err()
    .map(|(status, _)| status);

    assert_eq!(err, Some(StatusCode::BAD_REQUEST));
    assert_eq!(backend.calls(), 0);
}

#[tokio::test]
async fn server_plan_charges_the_shared_ledger() {
    let backend = ScriptedBackend::new(vec![reply(WEATHER_PLAN)]);
    let state = server_state(&backend);

    let response = handle_server_plan(
        State(state.clone()),
        Json(ServerPromptRequest {
            prompt: "weather in Delhi".to_string(),
        }),
    )
    .await
    .map(|Json(body)| body);

    let body = response.map_err(|(status, _)| status).unwrap();
    assert_eq!(body.plan.steps.len(), 1);
    assert!(!body.rate_limited);

    let Json(ledger) = handle_server_session(State(state.clone())).await;
    assert_eq!(ledger.llm_calls, 1);

    let Json(reset) = handle_server_session_reset(State(state)).await;
    assert_eq!(reset.llm_calls, 0);
}

#[tokio::test]
async fn server_execute_runs_plan_without_backend() {
    let backend = ScriptedBackend::new(Vec::new());
    let state = server_state(&backend);

    let Json(body) = handle_server_execute(
        State(state),
        Json(Plan::new(vec![
            PlanStep::new("weather_tool", args(json!({"city": "Pune"}))),
            PlanStep::new("nonexistent_tool", Map::new()),
        ])),
    )
    .await;

    assert_eq!(body.results.len(), 2);
    assert_eq!(body.failures, 1);
    assert_eq!(body.by_tool["weather_tool"]["args"]["city"], json!("Pune"));
    assert_eq!(backend.calls(), 0);
}

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

#[tokio::test]
async fn executor_events_feed_the_telemetry_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("events.jsonl");
    let cfg = RuntimeConfig {
        telemetry_enabled: true,
        telemetry_path: path.display().to_string(),
        ..base_cfg()
    };
    let telemetry = TelemetrySink::new(&cfg, "ask".to_string());

    let registry = Arc::new(
        ToolRegistry::new()
            .with_tool(SleepTool::new("ok_tool", Duration::from_millis(1)))
            .with_tool(Arc::new(FailingTool {
                schema: ToolSchema::new("failing_tool", "always fails"),
            })),
    );
    let executor =
        Executor::new(registry, ExecutorSettings::from_config(&cfg)).with_telemetry(telemetry);
    let results: ExecutionResult = executor
        .execute_plan(Plan::new(vec![
            PlanStep::new("ok_tool", Map::new()),
            PlanStep::new("failing_tool", Map::new()),
        ]))
        .await;
    assert_eq!(results.failure_count(), 1);

    let lines = std::fs::read_to_string(&path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect::<Vec<_>>();
    let summary = summarize_telemetry_lines(lines, 100);

    assert_eq!(summary.tool_succeeded, 1);
    assert_eq!(summary.tool_failed, 1);
    assert_eq!(summary.tool_failures.get("failing_tool"), Some(&1));
    assert_eq!(summary.command_counts.get("ask"), Some(&2));
    assert_eq!(summary.unique_runs.len(), 1);
}
