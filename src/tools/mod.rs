pub mod args;
pub mod compatibility;
pub mod currency;
pub mod github;
pub mod http;
pub mod news;
pub mod venues;
pub mod weather;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{RuntimeConfig, ToolCredentials};

pub const WEATHER_TOOL_NAME: &str = "weather_tool";
pub const NEWS_TOOL_NAME: &str = "news_tool";
pub const CURRENCY_TOOL_NAME: &str = "currency_tool";
pub const GITHUB_TOOL_NAME: &str = "github_tool";
pub const COMPATIBILITY_TOOL_NAME: &str = "compatibility_tool";
pub const DATE_PLANNER_TOOL_NAME: &str = "date_planner_tool";

/// Failure of a single tool call. Rendered into the step's error record.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Missing credential: set {0} in the environment or .env file")]
    MissingCredential(&'static str),

    #[error("Connection error: {0}")]
    Network(String),

    #[error("API Error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Upstream answered but the answer is unusable; message is user facing.
    #[error("{0}")]
    Rejected(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Name, description and parameter type hints advertised to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: BTreeMap<String, String>,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, type_hint: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), type_hint.into());
        self
    }

    pub fn parameter_names(&self) -> Vec<&str> {
        self.parameters.keys().map(String::as_str).collect()
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn schema(&self) -> &ToolSchema;

    fn name(&self) -> &str {
        &self.schema().name
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError>;
}

/// Read-only name -> tool lookup shared by every executor worker.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "duplicate tool registration replaced earlier tool");
        } else {
            tracing::debug!(tool = %name, "Registered tool");
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names = self.tools.keys().cloned().collect::<Vec<String>>();
        names.sort();
        names
    }

    /// Schemas sorted by tool name so prompts are stable across runs.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = self
            .tools
            .values()
            .map(|tool| tool.schema().clone())
            .collect::<Vec<ToolSchema>>();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

pub fn build_builtin_tools(
    cfg: &RuntimeConfig,
    creds: &ToolCredentials,
) -> anyhow::Result<ToolRegistry> {
    let http = http::HttpClient::new(cfg.tool_timeout())?;

    Ok(ToolRegistry::new()
        .with_tool(Arc::new(weather::WeatherTool::new(
            http.clone(),
            creds.weather_api_key.clone(),
        )))
        .with_tool(Arc::new(news::NewsTool::new(
            http.clone(),
            creds.news_api_key.clone(),
        )))
        .with_tool(Arc::new(currency::CurrencyTool::new(
            http.clone(),
            creds.exchange_rate_key.clone(),
        )))
        .with_tool(Arc::new(github::GitHubTool::new(
            http.clone(),
            creds.github_token.clone(),
        )))
        .with_tool(Arc::new(compatibility::CompatibilityTool::new()))
        .with_tool(Arc::new(
            venues::DatePlannerTool::new(http, creds.tomtom_api_key.clone())
                .with_country_set(cfg.venue_country_set.clone()),
        )))
}
