use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::executor::ExecutionResult;
use super::plan::strip_code_fence;
use crate::llm::{BackendFailure, LlmClient, TokenUsage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationOutcome {
    pub status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_answer: Option<String>,
}

/// What the verifier said, structured when it followed the output contract.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Verdict {
    Structured(VerificationOutcome),
    Raw(String),
}

#[derive(Debug, Clone)]
pub struct VerifierReply {
    pub verdict: Verdict,
    pub usage: Option<TokenUsage>,
    pub failure: Option<BackendFailure>,
}

pub struct Verifier {
    llm: LlmClient,
}

impl Verifier {
    pub fn new(llm: LlmClient) -> Self {
        Self { llm }
    }

    pub fn build_prompt(user_query: &str, results: &ExecutionResult) -> String {
        format!(
            "You are a Verifier Agent.\n\
             Original Query: {user_query}\n\
             Execution Results: {}\n\n\
             1. Check whether the results satisfy the query.\n\
             2. If they do, write a natural language final answer.\n\
             3. If data is missing (for example an \"error\" entry in the results), explain what went wrong.\n\n\
             Output JSON:\n\
             {{\n  \"status\": \"success\" or \"failure\",\n  \"final_answer\": \"Natural language response here.\"\n}}",
            results.to_wire()
        )
    }

    pub async fn verify_and_respond(
        &self,
        user_query: &str,
        results: &ExecutionResult,
    ) -> VerifierReply {
        let prompt = Self::build_prompt(user_query, results);
        let generation = self.llm.generate(&prompt, "", true).await;

        let verdict = if generation.failure.is_some() {
            Verdict::Raw(generation.text)
        } else {
            match parse_verification(&generation.text) {
                Some(outcome) => Verdict::Structured(outcome),
                None => {
                    tracing::warn!("Verifier output did not match the expected shape");
                    Verdict::Raw(generation.text)
                }
            }
        };

        if let Verdict::Structured(outcome) = &verdict {
            tracing::info!(status = ?outcome.status, "Verification completed");
        }

        VerifierReply {
            verdict,
            usage: generation.usage,
            failure: generation.failure,
        }
    }
}

/// Any status other than `"success"` counts as a failure.
pub fn parse_verification(text: &str) -> Option<VerificationOutcome> {
    let value = serde_json::from_str::<Value>(strip_code_fence(text)).ok()?;
    let object = value.as_object()?;

    let status = match object.get("status").and_then(Value::as_str) {
        Some(status) if status.eq_ignore_ascii_case("success") => VerificationStatus::Success,
        Some(_) => VerificationStatus::Failure,
        None => return None,
    };
    let final_answer = object
        .get("final_answer")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(VerificationOutcome {
        status,
        final_answer,
    })
}
