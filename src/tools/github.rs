use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_str};
use super::http::{HttpClient, JsonResponse, endpoint};
use super::{GITHUB_TOOL_NAME, Tool, ToolError, ToolSchema};

pub const GITHUB_API_BASE_URL: &str = "https://api.github.com";

/// Public repository metadata. The token is optional and only raises rate limits.
pub struct GitHubTool {
    http: HttpClient,
    token: Option<Secret<String>>,
    base_url: String,
    schema: ToolSchema,
}

impl GitHubTool {
    pub fn new(http: HttpClient, token: Option<Secret<String>>) -> Self {
        Self {
            http,
            token,
            base_url: GITHUB_API_BASE_URL.to_string(),
            schema: ToolSchema::new(
                GITHUB_TOOL_NAME,
                "Get details about a GitHub repository (stars, description).",
            )
            .param("repo_name", "string (format: owner/repo)"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Tool for GitHubTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["repo_name"])?;
        let repo = required_str(args, "repo_name")?;
        let (owner, name) = split_repo(&repo)?;

        let url = endpoint(&self.base_url, &["repos", owner, name])?;
        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let response = self.http.send_json(request).await?;
        parse_repo_response(&response, &repo)
    }
}

pub fn split_repo(repo: &str) -> Result<(&str, &str), ToolError> {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part.chars().any(|ch| ch != '.')
            && part
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
    };

    match repo.split_once('/') {
        Some((owner, name)) if valid_part(owner) && valid_part(name) => Ok((owner, name)),
        _ => Err(ToolError::InvalidArguments(format!(
            "'repo_name' must look like owner/repo, got '{repo}'"
        ))),
    }
}

pub fn parse_repo_response(response: &JsonResponse, repo: &str) -> Result<Value, ToolError> {
    if !response.is_success() {
        return Err(ToolError::Rejected(format!(
            "Repo '{repo}' not found or API error."
        )));
    }

    let body = &response.body;
    let field = |key: &str| body.get(key).cloned().unwrap_or(Value::Null);
    Ok(json!({
        "name": field("name"),
        "stars": field("stargazers_count"),
        "description": field("description"),
        "url": field("html_url"),
    }))
}
