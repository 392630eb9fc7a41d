//! Plan wire format, parsing, and batch scheduling.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::cli::ScheduleMode;
use crate::llm::{BackendFailure, TokenUsage};

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub tool: String,
    #[serde(default)]
    pub args: Map<String, Value>,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default)]
    pub reason: String,
    /// Indices of earlier steps this step must wait for.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,
}

impl PlanStep {
    pub fn new(tool: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            tool: tool.into(),
            args,
            parallel: true,
            reason: String::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = reason.into();
        self
    }

    pub fn with_depends_on(mut self, depends_on: Vec<usize>) -> Self {
        self.depends_on = depends_on;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
    /// Set only when the planner could not produce a usable plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Plan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            steps: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Stable JSON form used as a cache key and printed by `plan`.
    pub fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A plan together with the metadata of the call that produced it.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    pub plan: Plan,
    pub usage: Option<TokenUsage>,
    pub failure: Option<BackendFailure>,
}

impl From<PlanOutcome> for Plan {
    fn from(outcome: PlanOutcome) -> Self {
        outcome.plan
    }
}

impl From<(Plan, Option<TokenUsage>)> for Plan {
    fn from((plan, _usage): (Plan, Option<TokenUsage>)) -> Self {
        plan
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("planner output is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("planner output has an invalid shape: {0}")]
    InvalidShape(String),
}

/// Removes a surrounding markdown code fence such as ```` ```json ... ``` ````.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest.trim_start_matches(|ch: char| ch.is_ascii_alphanumeric()),
    };
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Decodes planner output. An object without `steps` is an empty plan.
pub fn parse_plan(text: &str) -> Result<Plan, PlanParseError> {
    let value: Value = serde_json::from_str(strip_code_fence(text))
        .map_err(|e| PlanParseError::InvalidJson(e.to_string()))?;

    let Value::Object(mut object) = value else {
        return Err(PlanParseError::InvalidShape(
            "expected a JSON object with a 'steps' list".to_string(),
        ));
    };

    let steps = match object.remove("steps") {
        None | Some(Value::Null) => Vec::new(),
        Some(steps) => serde_json::from_value::<Vec<PlanStep>>(steps)
            .map_err(|e| PlanParseError::InvalidShape(e.to_string()))?,
    };

    Ok(Plan::new(steps))
}

/// Groups step indices into batches that may run concurrently.
///
/// Batches are ordered; every step lands in a batch strictly after all of
/// its dependencies. Forward or out-of-range dependencies are ignored; a
/// step left without valid `depends_on` that is not `parallel` waits for
/// every earlier step.
pub fn schedule_batches(steps: &[PlanStep], mode: ScheduleMode) -> Vec<Vec<usize>> {
    if steps.is_empty() {
        return Vec::new();
    }
    if mode == ScheduleMode::Flat {
        return vec![(0..steps.len()).collect()];
    }

    let mut depth = vec![0usize; steps.len()];
    for (index, step) in steps.iter().enumerate() {
        let explicit: Vec<usize> = step
            .depends_on
            .iter()
            .copied()
            .filter(|dep| {
                let valid = *dep < index;
                if !valid {
                    tracing::warn!(step = index, dependency = dep, "ignoring invalid step dependency");
                }
                valid
            })
            .collect();
        let deps: Vec<usize> = if !explicit.is_empty() {
            explicit
        } else if !step.parallel {
            (0..index).collect()
        } else {
            Vec::new()
        };

        depth[index] = deps.iter().map(|dep| depth[*dep] + 1).max().unwrap_or(0);
    }

    let batch_count = depth.iter().copied().max().unwrap_or(0) + 1;
    let mut batches = vec![Vec::new(); batch_count];
    for (index, level) in depth.into_iter().enumerate() {
        batches[level].push(index);
    }
    batches.retain(|batch| !batch.is_empty());
    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn step(tool: &str) -> PlanStep {
        PlanStep::new(tool, Map::new())
    }

    #[test]
    fn fenced_empty_plan_has_no_error() {
        let plan = parse_plan("```json\n{\"steps\": []}\n```").expect("parses");
        assert!(plan.steps.is_empty());
        assert!(plan.error.is_none());
    }

    #[test]
    fn fence_without_language_tag_is_stripped() {
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("  {\"a\":1} "), "{\"a\":1}");
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(
            parse_plan("not json at all"),
            Err(PlanParseError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_plan("[1, 2]"),
            Err(PlanParseError::InvalidShape(_))
        ));
    }

    #[test]
    fn missing_steps_is_an_empty_plan() {
        let plan = parse_plan("{}").expect("parses");
        assert!(plan.is_empty());
        assert!(plan.error.is_none());
    }

    #[test]
    fn step_defaults_apply() {
        let plan = parse_plan(r#"{"steps":[{"tool":"weather_tool","args":{"city":"Delhi"}}]}"#)
            .expect("parses");
        let step = &plan.steps[0];
        assert!(step.parallel);
        assert!(step.reason.is_empty());
        assert!(step.depends_on.is_empty());
        assert_eq!(step.args.get("city"), Some(&json!("Delhi")));
    }

    #[test]
    fn wire_form_round_trips() {
        let plan = Plan::new(vec![
            PlanStep::new("weather_tool", json!({"city": "Pune"}).as_object().cloned().expect("obj"))
                .with_reason("forecast"),
            step("news_tool").sequential().with_depends_on(vec![0]),
        ]);
        let parsed = parse_plan(&plan.to_wire()).expect("round trips");
        assert_eq!(parsed, plan);
    }

    #[test]
    fn parallel_steps_share_one_batch() {
        let steps = vec![step("a"), step("b"), step("c")];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Batched),
            vec![vec![0, 1, 2]]
        );
    }

    #[test]
    fn sequential_step_waits_for_everything_before_it() {
        let steps = vec![step("a"), step("b"), step("c").sequential(), step("d")];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Batched),
            vec![vec![0, 1, 3], vec![2]]
        );
    }

    #[test]
    fn explicit_dependencies_override_parallel_flag() {
        let steps = vec![
            step("a"),
            step("b").with_depends_on(vec![0]),
            step("c").sequential().with_depends_on(vec![0]),
            step("d").with_depends_on(vec![1, 2]),
        ];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Batched),
            vec![vec![0], vec![1, 2], vec![3]]
        );
    }

    #[test]
    fn forward_dependencies_are_ignored() {
        let steps = vec![step("a").with_depends_on(vec![1, 9]), step("b")];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Batched),
            vec![vec![0, 1]]
        );
    }

    #[test]
    fn sequential_step_with_only_invalid_dependencies_still_waits() {
        let steps = vec![step("a"), step("b").sequential().with_depends_on(vec![1])];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Batched),
            vec![vec![0], vec![1]]
        );
    }

    #[test]
    fn flat_mode_uses_single_batch() {
        let steps = vec![step("a"), step("b").sequential()];
        assert_eq!(
            schedule_batches(&steps, ScheduleMode::Flat),
            vec![vec![0, 1]]
        );
        assert!(schedule_batches(&[], ScheduleMode::Flat).is_empty());
    }
}
