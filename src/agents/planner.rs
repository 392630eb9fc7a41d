use super::plan::{Plan, PlanOutcome, parse_plan};
use crate::llm::LlmClient;
use crate::tools::ToolSchema;

pub struct Planner {
    llm: LlmClient,
}

impl Planner {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub fn build_prompt(user_query: &str, tool_schemas: &[ToolSchema]) -> String {
        let tools = serde_json::to_string(tool_schemas).unwrap_or_else(|_| "[]".to_string());
        format!(
            "You are a Planner Agent.\n\
             User Query: {user_query}\n\
             Available Tools: {tools}\n\n\
             Break the query into an ordered list of steps. Each step calls exactly one of the \
             available tools with arguments that match its parameters. Set \"parallel\" to true \
             only when the step does not need the output of another step; otherwise set it to \
             false. A step may list \"depends_on\": the 0-based indices of earlier steps whose \
             output it needs; omit it otherwise. Give a short \"reason\" for every step. Use no tools that are not listed. \
             If no tool can help, return an empty step list.\n\n\
             Respond with JSON only, in this format:\n\
             {{\n  \"steps\": [\n    {{\"tool\": \"tool_name\", \"args\": {{}}, \"parallel\": true, \"reason\": \"why this step is needed\"}}\n  ]\n}}"
        )
    }

    /// Produces a plan; never fails. Problems are reported through `plan.error`.
    pub async fn create_plan(&self, user_query: &str, tool_schemas: &[ToolSchema]) -> PlanOutcome {
        let prompt = Self::build_prompt(user_query, tool_schemas);
        let generation = self.llm.generate(&prompt, "", true).await;

        if let Some(failure) = generation.failure {
            tracing::warn!(
                rate_limited = failure.rate_limited,
                error = %failure.message,
                "Planner backend unavailable"
            );
            return PlanOutcome {
                plan: Plan::failed(format!("planner backend unavailable: {}", failure.message)),
                usage: None,
                failure: Some(failure),
            };
        }

        let plan = match parse_plan(&generation.text) {
            Ok(plan) => {
                tracing::info!(steps = plan.steps.len(), "Plan created");
                plan
            }
            Err(err) => {
                tracing::warn!(error = %err, "Planner returned unusable output");
                Plan::failed(err.to_string())
            }
        };

        PlanOutcome {
            plan,
            usage: generation.usage,
            failure: None,
        }
    }
}
