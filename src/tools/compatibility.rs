use std::collections::BTreeSet;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_str};
use super::{COMPATIBILITY_TOOL_NAME, Tool, ToolError, ToolSchema};

const BASE_SCORE: usize = 60;
const POINTS_PER_SHARED_INTEREST: usize = 8;
const SCORE_CAP_THRESHOLD: usize = 95;
const CAPPED_SCORE: usize = 98;
const HIGH_ENERGY_MARKERS: &[&str] = &["fitness", "travel"];

/// Local interest-overlap scoring; makes no network calls.
pub struct CompatibilityTool {
    schema: ToolSchema,
}

impl CompatibilityTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(
                COMPATIBILITY_TOOL_NAME,
                "Analyzes interests between two users to calculate a compatibility score and date ideas.",
            )
            .param("user_interests", "string (comma separated list)")
            .param("match_interests", "string (comma separated list)"),
        }
    }
}

impl Default for CompatibilityTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for CompatibilityTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["user_interests", "match_interests"])?;
        let user = required_str(args, "user_interests")?;
        let matched = required_str(args, "match_interests")?;
        Ok(score_compatibility(&user, &matched))
    }
}

fn interest_set(raw: &str) -> BTreeSet<String> {
    raw.split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn score_compatibility(user_interests: &str, match_interests: &str) -> Value {
    let common = interest_set(user_interests)
        .intersection(&interest_set(match_interests))
        .cloned()
        .collect::<Vec<String>>();

    let mut score = BASE_SCORE + common.len() * POINTS_PER_SHARED_INTEREST;
    if score > SCORE_CAP_THRESHOLD {
        score = CAPPED_SCORE;
    }

    let match_lower = match_interests.to_lowercase();
    let vibe = if HIGH_ENERGY_MARKERS
        .iter()
        .any(|marker| match_lower.contains(marker))
    {
        "High Energy"
    } else {
        "Relaxed"
    };

    let focus = common.first().map(String::as_str).unwrap_or("exploration");

    json!({
        "compatibility_score": format!("{score}%"),
        "common_interests": common,
        "match_vibe": vibe,
        "date_recommendation": format!("Based on your shared love for {focus}"),
    })
}
