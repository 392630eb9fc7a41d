use std::time::Duration;

use moka::sync::Cache;

use super::executor::ExecutionResult;
use super::plan::Plan;
use super::verifier::VerificationOutcome;
use crate::config::RuntimeConfig;

/// TTL caches for the three pipeline stages.
///
/// Only successful stage outputs are inserted; callers decide what counts.
#[derive(Debug, Clone)]
pub struct PipelineCache {
    plans: Cache<String, Plan>,
    results: Cache<String, ExecutionResult>,
    verdicts: Cache<String, VerificationOutcome>,
}

impl PipelineCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let max_capacity = max_entries.max(1);
        Self {
            plans: build(ttl, max_capacity),
            results: build(ttl, max_capacity),
            verdicts: build(ttl, max_capacity),
        }
    }

    /// `None` when the configured TTL is zero.
    pub fn from_config(cfg: &RuntimeConfig) -> Option<Self> {
        (cfg.cache_ttl_secs > 0).then(|| {
            Self::new(
                Duration::from_secs(cfg.cache_ttl_secs),
                cfg.cache_max_entries,
            )
        })
    }

    pub fn plan(&self, query: &str) -> Option<Plan> {
        self.plans.get(&normalize_query(query))
    }

    pub fn store_plan(&self, query: &str, plan: &Plan) {
        self.plans.insert(normalize_query(query), plan.clone());
    }

    pub fn results(&self, plan: &Plan) -> Option<ExecutionResult> {
        self.results.get(&plan.to_wire())
    }

    pub fn store_results(&self, plan: &Plan, results: &ExecutionResult) {
        self.results.insert(plan.to_wire(), results.clone());
    }

    pub fn verdict(&self, query: &str, results: &ExecutionResult) -> Option<VerificationOutcome> {
        self.verdicts.get(&verdict_key(query, results))
    }

    pub fn store_verdict(
        &self,
        query: &str,
        results: &ExecutionResult,
        outcome: &VerificationOutcome,
    ) {
        self.verdicts
            .insert(verdict_key(query, results), outcome.clone());
    }

    pub fn clear(&self) {
        self.plans.invalidate_all();
        self.results.invalidate_all();
        self.verdicts.invalidate_all();
    }
}

fn build<V>(ttl: Duration, max_capacity: u64) -> Cache<String, V>
where
    V: Clone + Send + Sync + 'static,
{
    Cache::builder()
        .max_capacity(max_capacity)
        .time_to_live(ttl)
        .build()
}

fn normalize_query(query: &str) -> String {
    query.trim().to_string()
}

fn verdict_key(query: &str, results: &ExecutionResult) -> String {
    format!("{}\u{1f}{}", normalize_query(query), results.to_wire())
}
