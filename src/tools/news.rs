use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_str};
use super::http::{HttpClient, JsonResponse, endpoint};
use super::{NEWS_TOOL_NAME, Tool, ToolError, ToolSchema};
use crate::config::NEWS_API_KEY_ENV;

pub const NEWSAPI_BASE_URL: &str = "https://newsapi.org/v2";
const PAGE_SIZE: usize = 3;

pub struct NewsTool {
    http: HttpClient,
    api_key: Option<Secret<String>>,
    base_url: String,
    schema: ToolSchema,
}

impl NewsTool {
    pub fn new(http: HttpClient, api_key: Option<Secret<String>>) -> Self {
        Self {
            http,
            api_key,
            base_url: NEWSAPI_BASE_URL.to_string(),
            schema: ToolSchema::new(
                NEWS_TOOL_NAME,
                "Search for the latest news articles on a specific topic.",
            )
            .param("query", "string"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Tool for NewsTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["query"])?;
        let query = required_str(args, "query")?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ToolError::MissingCredential(NEWS_API_KEY_ENV))?;

        let url = endpoint(&self.base_url, &["everything"])?;
        let page_size = PAGE_SIZE.to_string();
        let request = self.http.get(url).query(&[
            ("q", query.as_str()),
            ("sortBy", "publishedAt"),
            ("pageSize", page_size.as_str()),
            ("apiKey", api_key.expose_secret().as_str()),
        ]);
        let response = self.http.send_json(request).await?;
        parse_news_response(&response)
    }
}

/// Newest articles as `[{title, source, url}]`, at most three.
pub fn parse_news_response(response: &JsonResponse) -> Result<Value, ToolError> {
    if !response.is_success() {
        let message = response
            .body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Failed to fetch news");
        return Err(ToolError::Rejected(message.to_string()));
    }

    let articles = response
        .body
        .get("articles")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let digest = articles
        .iter()
        .take(PAGE_SIZE)
        .map(|article| {
            json!({
                "title": article.get("title").cloned().unwrap_or(Value::Null),
                "source": article.pointer("/source/name").cloned().unwrap_or(Value::Null),
                "url": article.get("url").cloned().unwrap_or(Value::Null),
            })
        })
        .collect::<Vec<Value>>();

    Ok(Value::Array(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_title_source_and_url() {
        let response = JsonResponse {
            status: 200,
            body: json!({
                "status": "ok",
                "totalResults": 2,
                "articles": [
                    {"source": {"id": null, "name": "The Hindu"}, "title": "Chip fab opens", "url": "https://a.example/1", "author": "x"},
                    {"source": {"id": "ars", "name": "Ars Technica"}, "title": "Rust 2024", "url": "https://a.example/2"}
                ]
            }),
        };
        let digest = parse_news_response(&response).expect("parses");
        assert_eq!(
            digest,
            json!([
                {"title": "Chip fab opens", "source": "The Hindu", "url": "https://a.example/1"},
                {"title": "Rust 2024", "source": "Ars Technica", "url": "https://a.example/2"}
            ])
        );
    }

    #[test]
    fn caps_results_at_page_size() {
        let articles = (0..5)
            .map(|i| json!({"title": format!("t{i}"), "source": {"name": "s"}, "url": "u"}))
            .collect::<Vec<Value>>();
        let response = JsonResponse {
            status: 200,
            body: json!({"status": "ok", "articles": articles}),
        };
        let digest = parse_news_response(&response).expect("parses");
        assert_eq!(digest.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn error_uses_upstream_message_or_default() {
        let response = JsonResponse {
            status: 401,
            body: json!({"status": "error", "code": "apiKeyInvalid", "message": "Your API key is invalid."}),
        };
        assert_eq!(
            parse_news_response(&response).expect_err("fails").to_string(),
            "Your API key is invalid."
        );

        let bare = JsonResponse {
            status: 500,
            body: Value::Null,
        };
        assert_eq!(
            parse_news_response(&bare).expect_err("fails").to_string(),
            "Failed to fetch news"
        );
    }
}
