use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::RuntimeConfig;
use crate::llm::TokenUsage;

/// USD prices per million tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pricing {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Pricing {
    pub fn from_config(cfg: &RuntimeConfig) -> Self {
        Self {
            input_per_million: cfg.price_input_per_million,
            output_per_million: cfg.price_output_per_million,
        }
    }

    pub fn cost(&self, usage: TokenUsage) -> f64 {
        (usage.prompt_tokens as f64 * self.input_per_million
            + usage.completion_tokens as f64 * self.output_per_million)
            / 1_000_000.0
    }
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million: crate::config::DEFAULT_PRICE_INPUT_PER_MILLION,
            output_per_million: crate::config::DEFAULT_PRICE_OUTPUT_PER_MILLION,
        }
    }
}

/// Token and cost totals for one interactive or server session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLedger {
    pub requests: u64,
    pub llm_calls: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub estimated_cost_usd: f64,
    pub started_at: DateTime<Utc>,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self {
            requests: 0,
            llm_calls: 0,
            prompt_tokens: 0,
            completion_tokens: 0,
            estimated_cost_usd: 0.0,
            started_at: Utc::now(),
        }
    }

    pub fn record_request(&mut self) {
        self.requests += 1;
    }

    /// Adds one model call and returns its cost.
    pub fn record(&mut self, usage: TokenUsage, pricing: &Pricing) -> f64 {
        let cost = pricing.cost(usage);
        self.llm_calls += 1;
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.estimated_cost_usd += cost;
        cost
    }

    /// Folds a per-request ledger into this one.
    pub fn merge(&mut self, other: &SessionLedger) {
        self.requests += other.requests;
        self.llm_calls += other.llm_calls;
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.estimated_cost_usd += other.estimated_cost_usd;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn summary_line(&self) -> String {
        format!(
            "requests={} llm_calls={} tokens(prompt={}, completion={}) estimated_cost=${:.6}",
            self.requests,
            self.llm_calls,
            self.prompt_tokens,
            self.completion_tokens,
            self.estimated_cost_usd
        )
    }
}

impl Default for SessionLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pricing_matches_flash_lite_rates() {
        let cost = Pricing::default().cost(TokenUsage {
            prompt_tokens: 1_000_000,
            completion_tokens: 1_000_000,
        });
        assert!((cost - 0.375).abs() < 1e-9);
    }

    #[test]
    fn record_accumulates_and_reset_zeroes() {
        let pricing = Pricing::default();
        let mut ledger = SessionLedger::new();
        ledger.record_request();
        let first = ledger.record(
            TokenUsage {
                prompt_tokens: 400,
                completion_tokens: 100,
            },
            &pricing,
        );
        ledger.record(
            TokenUsage {
                prompt_tokens: 600,
                completion_tokens: 50,
            },
            &pricing,
        );

        assert!((first - (400.0 * 0.000000075 + 100.0 * 0.0000003)).abs() < 1e-12);
        assert_eq!(ledger.prompt_tokens, 1000);
        assert_eq!(ledger.completion_tokens, 150);
        assert_eq!(ledger.llm_calls, 2);

        ledger.reset();
        assert_eq!(ledger.requests, 0);
        assert_eq!(ledger.prompt_tokens, 0);
        assert_eq!(ledger.estimated_cost_usd, 0.0);
    }
}
