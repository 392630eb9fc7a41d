use std::time::Duration;

use reqwest::{Client, RequestBuilder, Url};
use serde_json::Value;

use super::ToolError;

pub const USER_AGENT: &str = concat!("ops-assistant/", env!("CARGO_PKG_VERSION"));

/// Status code plus decoded JSON body of an upstream call.
#[derive(Debug, Clone)]
pub struct JsonResponse {
    pub status: u16,
    pub body: Value,
}

impl JsonResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Shared HTTP client for the REST-backed tools.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self, ToolError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| ToolError::Network(format!("failed to build tool HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    /// Sends the request and decodes the body as JSON.
    ///
    /// Error statuses with a non-JSON body decode to `Value::Null`; a 2xx
    /// with a non-JSON body is malformed. Transport errors never carry the
    /// request URL since it may hold credentials.
    pub async fn send_json(&self, request: RequestBuilder) -> Result<JsonResponse, ToolError> {
        let response = request.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let text = response.text().await.map_err(|e| self.map_error(e))?;

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(value) => value,
            Err(_) if !(200..300).contains(&status) => Value::Null,
            Err(err) => return Err(ToolError::Malformed(format!("invalid JSON body: {err}"))),
        };

        Ok(JsonResponse { status, body })
    }

    fn map_error(&self, err: reqwest::Error) -> ToolError {
        if err.is_timeout() {
            ToolError::Timeout(self.timeout)
        } else {
            ToolError::Network(err.without_url().to_string())
        }
    }
}

/// Parses a base URL and appends path segments, percent-encoding each one.
pub fn endpoint(base_url: &str, segments: &[&str]) -> Result<Url, ToolError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid base URL '{base_url}': {e}")))?;
    {
        let mut path = url.path_segments_mut().map_err(|_| {
            ToolError::InvalidArguments(format!("base URL '{base_url}' cannot carry a path"))
        })?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}
