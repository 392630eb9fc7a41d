//! Orchestrator: sequences planner, executor and verifier for one request.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use super::cache::PipelineCache;
use super::executor::{ExecutionResult, Executor, ExecutorSettings};
use super::ledger::{Pricing, SessionLedger};
use super::plan::Plan;
use super::planner::Planner;
use super::verifier::{VerificationStatus, Verdict, Verifier};
use crate::llm::{BackendFailure, LlmClient, STRUCTURED_FALLBACK};
use crate::telemetry::TelemetrySink;
use crate::tools::{ToolRegistry, ToolSchema};

pub const QUOTA_EXCEEDED_MESSAGE: &str = "Quota exceeded. Please wait 30s and try again.";
pub const GENERIC_FAILURE_MESSAGE: &str =
    "The assistant encountered an error processing the results.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheHits {
    pub plan: bool,
    pub results: bool,
    pub verdict: bool,
}

#[derive(Debug, Clone)]
pub struct PlanStage {
    pub plan: Plan,
    pub failure: Option<BackendFailure>,
    pub cached: bool,
    pub cost_usd: f64,
}

#[derive(Debug, Clone)]
pub struct VerifyStage {
    pub verdict: Verdict,
    pub failure: Option<BackendFailure>,
    pub cached: bool,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub query: String,
    pub plan: Plan,
    pub results: ExecutionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Verdict>,
    pub answer: String,
    pub status: VerificationStatus,
    pub rate_limited: bool,
    pub cost_usd: f64,
    pub cache: CacheHits,
}

pub struct Assistant {
    llm: LlmClient,
    planner: Planner,
    executor: Executor,
    verifier: Verifier,
    registry: Arc<ToolRegistry>,
    cache: Option<PipelineCache>,
    pricing: Pricing,
    telemetry: TelemetrySink,
}

impl Assistant {
    pub fn new(llm: LlmClient, registry: Arc<ToolRegistry>, settings: ExecutorSettings) -> Self {
        Self {
            planner: Planner::new(llm.clone()),
            executor: Executor::new(Arc::clone(&registry), settings),
            verifier: Verifier::new(llm.clone()),
            llm,
            registry,
            cache: None,
            pricing: Pricing::default(),
            telemetry: TelemetrySink::disabled(),
        }
    }

    pub fn with_cache(mut self, cache: Option<PipelineCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_telemetry(mut self, telemetry: TelemetrySink) -> Self {
        self.executor = self.executor.with_telemetry(telemetry.clone());
        self.telemetry = telemetry;
        self
    }

    pub fn backend_name(&self) -> &str {
        self.llm.backend_name()
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_schemas(&self) -> Vec<ToolSchema> {
        self.registry.schemas()
    }

    pub fn pricing(&self) -> &Pricing {
        &self.pricing
    }

    pub async fn plan(&self, query: &str, ledger: &mut SessionLedger) -> PlanStage {
        if let Some(plan) = self.cache.as_ref().and_then(|cache| cache.plan(query)) {
            tracing::debug!("Plan served from cache");
            self.telemetry.emit("cache.hit", json!({ "stage": "plan" }));
            return PlanStage {
                plan,
                failure: None,
                cached: true,
                cost_usd: 0.0,
            };
        }

        let outcome = self
            .planner
            .create_plan(query, &self.registry.schemas())
            .await;
        let cost_usd = outcome
            .usage
            .map(|usage| ledger.record(usage, &self.pricing))
            .unwrap_or(0.0);

        match &outcome.plan.error {
            Some(error) => self.telemetry.emit(
                "plan.failed",
                json!({
                    "error": error,
                    "rate_limited": outcome.failure.as_ref().is_some_and(|f| f.rate_limited),
                }),
            ),
            None => {
                self.telemetry.emit(
                    "plan.created",
                    json!({
                        "steps": outcome.plan.steps.len(),
                        "tools": outcome.plan.steps.iter().map(|s| s.tool.as_str()).collect::<Vec<_>>(),
                    }),
                );
                if let Some(cache) = &self.cache {
                    cache.store_plan(query, &outcome.plan);
                }
            }
        }

        PlanStage {
            plan: outcome.plan,
            failure: outcome.failure,
            cached: false,
            cost_usd,
        }
    }

    /// Runs a plan, reusing cached results for an identical plan.
    pub async fn execute(&self, plan: &Plan) -> (ExecutionResult, bool) {
        if plan.is_empty() {
            return (ExecutionResult::default(), false);
        }
        if let Some(results) = self.cache.as_ref().and_then(|cache| cache.results(plan)) {
            tracing::debug!("Execution results served from cache");
            self.telemetry.emit("cache.hit", json!({ "stage": "execute" }));
            return (results, true);
        }

        let results = self.executor.execute_plan(plan.clone()).await;
        // Results with failed steps are not cached.
        if results.failure_count() == 0
            && let Some(cache) = &self.cache
        {
            cache.store_results(plan, &results);
        }
        (results, false)
    }

    pub async fn verify(
        &self,
        query: &str,
        results: &ExecutionResult,
        ledger: &mut SessionLedger,
    ) -> VerifyStage {
        if let Some(outcome) = self
            .cache
            .as_ref()
            .and_then(|cache| cache.verdict(query, results))
        {
            tracing::debug!("Verdict served from cache");
            self.telemetry.emit("cache.hit", json!({ "stage": "verify" }));
            return VerifyStage {
                verdict: Verdict::Structured(outcome),
                failure: None,
                cached: true,
                cost_usd: 0.0,
            };
        }

        let reply = self.verifier.verify_and_respond(query, results).await;
        let cost_usd = reply
            .usage
            .map(|usage| ledger.record(usage, &self.pricing))
            .unwrap_or(0.0);

        let status = match &reply.verdict {
            Verdict::Structured(outcome) => {
                if let Some(cache) = &self.cache {
                    cache.store_verdict(query, results, outcome);
                }
                json!(outcome.status)
            }
            Verdict::Raw(_) => json!("raw"),
        };
        self.telemetry.emit(
            "verify.completed",
            json!({
                "status": status,
                "backend_failed": reply.failure.is_some(),
            }),
        );

        VerifyStage {
            verdict: reply.verdict,
            failure: reply.failure,
            cached: false,
            cost_usd,
        }
    }

    /// Full pipeline for one request. Never fails; problems become the answer text.
    pub async fn handle(&self, query: &str, ledger: &mut SessionLedger) -> AssistantReply {
        ledger.record_request();
        let planned = self.plan(query, ledger).await;

        if planned.failure.as_ref().is_some_and(|f| f.rate_limited) {
            return AssistantReply {
                query: query.to_string(),
                plan: planned.plan,
                results: ExecutionResult::default(),
                verdict: None,
                answer: QUOTA_EXCEEDED_MESSAGE.to_string(),
                status: VerificationStatus::Failure,
                rate_limited: true,
                cost_usd: planned.cost_usd,
                cache: CacheHits {
                    plan: planned.cached,
                    ..CacheHits::default()
                },
            };
        }

        let (results, results_cached) = self.execute(&planned.plan).await;
        let verified = self.verify(query, &results, ledger).await;

        let rate_limited = verified.failure.as_ref().is_some_and(|f| f.rate_limited);
        let answer = if rate_limited {
            QUOTA_EXCEEDED_MESSAGE.to_string()
        } else {
            render_answer(&verified.verdict, verified.failure.is_some())
        };
        let status = match &verified.verdict {
            Verdict::Structured(outcome) => outcome.status,
            Verdict::Raw(_) => VerificationStatus::Failure,
        };

        AssistantReply {
            query: query.to_string(),
            plan: planned.plan,
            results,
            verdict: Some(verified.verdict),
            answer,
            status,
            rate_limited,
            cost_usd: planned.cost_usd + verified.cost_usd,
            cache: CacheHits {
                plan: planned.cached,
                results: results_cached,
                verdict: verified.cached,
            },
        }
    }
}

/// User-facing text for a verdict.
pub fn render_answer(verdict: &Verdict, backend_failed: bool) -> String {
    match verdict {
        Verdict::Structured(outcome) => outcome
            .final_answer
            .as_deref()
            .map(str::trim)
            .filter(|answer| !answer.is_empty())
            .unwrap_or(GENERIC_FAILURE_MESSAGE)
            .to_string(),
        Verdict::Raw(_) if backend_failed => GENERIC_FAILURE_MESSAGE.to_string(),
        Verdict::Raw(text) if text.trim() == STRUCTURED_FALLBACK => {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
        Verdict::Raw(text) => text.clone(),
    }
}
