//! Executor: runs plan steps against the tool registry.
//!
//! Steps are grouped into dependency batches. Each batch fans out onto a
//! `JoinSet`, bounded by a shared semaphore, and is fully joined before the
//! next batch starts. A failing, hung, or panicking step only ever affects
//! its own result slot.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::plan::{Plan, PlanStep, schedule_batches};
use crate::cli::ScheduleMode;
use crate::config::RuntimeConfig;
use crate::telemetry::TelemetrySink;
use crate::tools::{ToolError, ToolRegistry};

/// Result of one step: the tool's payload or an error record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StepOutput {
    Success(Value),
    Failure { error: String },
}

impl StepOutput {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepOutput::Failure { .. })
    }

    pub fn to_value(&self) -> Value {
        match self {
            StepOutput::Success(value) => value.clone(),
            StepOutput::Failure { error } => json!({ "error": error }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutcome {
    #[serde(rename = "step")]
    pub index: usize,
    pub tool: String,
    #[serde(rename = "result")]
    pub output: StepOutput,
    #[serde(skip)]
    pub elapsed_ms: u64,
}

impl StepOutcome {
    fn failure(index: usize, tool: &str, error: impl Into<String>) -> Self {
        Self {
            index,
            tool: tool.to_string(),
            output: StepOutput::Failure {
                error: error.into(),
            },
            elapsed_ms: 0,
        }
    }
}

/// Per-step results, one entry per plan step in plan order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ExecutionResult {
    pub entries: Vec<StepOutcome>,
}

impl ExecutionResult {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, index: usize) -> Option<&StepOutcome> {
        self.entries.get(index)
    }

    pub fn failure_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.output.is_failure())
            .count()
    }

    /// Tool-name keyed view; a later step overwrites an earlier one.
    pub fn by_tool(&self) -> Map<String, Value> {
        let mut map = Map::new();
        for entry in &self.entries {
            map.insert(entry.tool.clone(), entry.output.to_value());
        }
        map
    }

    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub max_concurrency: usize,
    pub step_timeout: Duration,
    pub schedule: ScheduleMode,
}

impl ExecutorSettings {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            max_concurrency: cfg.max_concurrency,
            step_timeout: cfg.tool_timeout(),
            schedule: cfg.schedule,
        }
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            step_timeout: Duration::from_secs(20),
            schedule: ScheduleMode::Batched,
        }
    }
}

pub struct Executor {
    registry: Arc<ToolRegistry>,
    settings: ExecutorSettings,
    permits: Arc<Semaphore>,
    telemetry: TelemetrySink,
}

impl Executor {
    pub fn new(registry: Arc<ToolRegistry>, settings: ExecutorSettings) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));
        Self {
            registry,
            settings,
            permits,
            telemetry: TelemetrySink::disabled(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Runs every step and returns once all workers have finished.
    ///
    /// Accepts a bare [`Plan`], a [`super::plan::PlanOutcome`], or a
    /// `(Plan, usage)` pair.
    pub async fn execute_plan(&self, plan: impl Into<Plan>) -> ExecutionResult {
        let plan = plan.into();
        if plan.steps.is_empty() {
            tracing::debug!("Empty plan; no tools invoked");
            return ExecutionResult::default();
        }

        let batches = schedule_batches(&plan.steps, self.settings.schedule);
        tracing::info!(
            steps = plan.steps.len(),
            batches = batches.len(),
            max_concurrency = self.settings.max_concurrency,
            "Executing plan"
        );

        let mut slots: Vec<Option<StepOutcome>> = vec![None; plan.steps.len()];
        for (batch_index, batch) in batches.iter().enumerate() {
            let mut workers = JoinSet::new();
            for &index in batch {
                let step = plan.steps[index].clone();
                let registry = Arc::clone(&self.registry);
                let permits = Arc::clone(&self.permits);
                let step_timeout = self.settings.step_timeout;
                workers.spawn(async move {
                    run_step(index, step, registry, permits, step_timeout).await
                });
            }

            while let Some(joined) = workers.join_next().await {
                match joined {
                    Ok(outcome) => {
                        self.record_outcome(&outcome);
                        let index = outcome.index;
                        slots[index] = Some(outcome);
                    }
                    Err(err) => {
                        tracing::error!(batch = batch_index, error = %err, "step worker terminated");
                    }
                }
            }
        }

        let entries = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let outcome = StepOutcome::failure(
                        index,
                        &plan.steps[index].tool,
                        format!("worker for step {index} terminated unexpectedly"),
                    );
                    self.record_outcome(&outcome);
                    outcome
                })
            })
            .collect();

        ExecutionResult { entries }
    }

    fn record_outcome(&self, outcome: &StepOutcome) {
        match &outcome.output {
            StepOutput::Success(_) => {
                tracing::debug!(
                    step = outcome.index,
                    tool = %outcome.tool,
                    elapsed_ms = outcome.elapsed_ms,
                    "Step succeeded"
                );
                self.telemetry.emit(
                    "tool.succeeded",
                    json!({
                        "step": outcome.index,
                        "tool": outcome.tool,
                        "elapsed_ms": outcome.elapsed_ms,
                    }),
                );
            }
            StepOutput::Failure { error } => {
                tracing::warn!(
                    step = outcome.index,
                    tool = %outcome.tool,
                    elapsed_ms = outcome.elapsed_ms,
                    error = %error,
                    "Step failed"
                );
                self.telemetry.emit(
                    "tool.failed",
                    json!({
                        "step": outcome.index,
                        "tool": outcome.tool,
                        "elapsed_ms": outcome.elapsed_ms,
                        "error": error,
                    }),
                );
            }
        }
    }
}

async fn run_step(
    index: usize,
    step: PlanStep,
    registry: Arc<ToolRegistry>,
    permits: Arc<Semaphore>,
    step_timeout: Duration,
) -> StepOutcome {
    let Some(tool) = registry.get(&step.tool) else {
        return StepOutcome::failure(index, &step.tool, format!("Tool {} not found", step.tool));
    };

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            return StepOutcome::failure(index, &step.tool, "executor is shutting down");
        }
    };

    tracing::debug!(step = index, tool = %step.tool, "Step started");
    let started = Instant::now();
    let result = tokio::time::timeout(step_timeout, tool.execute(&step.args)).await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let output = match result {
        Ok(Ok(value)) => StepOutput::Success(value),
        Ok(Err(err)) => StepOutput::Failure {
            error: err.to_string(),
        },
        Err(_) => StepOutput::Failure {
            error: ToolError::Timeout(step_timeout).to_string(),
        },
    };

    StepOutcome {
        index,
        tool: step.tool,
        output,
        elapsed_ms,
    }
}
