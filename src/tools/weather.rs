use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_str};
use super::http::{HttpClient, JsonResponse, endpoint};
use super::{Tool, ToolError, ToolSchema, WEATHER_TOOL_NAME};
use crate::config::WEATHER_API_KEY_ENV;

pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// Current conditions from OpenWeatherMap, metric units.
pub struct WeatherTool {
    http: HttpClient,
    api_key: Option<Secret<String>>,
    base_url: String,
    schema: ToolSchema,
}

impl WeatherTool {
    pub fn new(http: HttpClient, api_key: Option<Secret<String>>) -> Self {
        Self {
            http,
            api_key,
            base_url: OPENWEATHER_BASE_URL.to_string(),
            schema: ToolSchema::new(
                WEATHER_TOOL_NAME,
                "Get current weather for a city including temperature and conditions.",
            )
            .param("city", "string"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["city"])?;
        let city = required_str(args, "city")?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ToolError::MissingCredential(WEATHER_API_KEY_ENV))?;

        let url = endpoint(&self.base_url, &["weather"])?;
        let request = self.http.get(url).query(&[
            ("q", city.as_str()),
            ("appid", api_key.expose_secret().as_str()),
            ("units", "metric"),
        ]);
        let response = self.http.send_json(request).await?;
        parse_weather_response(&response)
    }
}

pub fn parse_weather_response(response: &JsonResponse) -> Result<Value, ToolError> {
    let body = &response.body;
    if !response.is_success() {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(ToolError::Upstream {
            status: response.status,
            message: message.to_string(),
        });
    }

    let main = body
        .get("main")
        .ok_or_else(|| ToolError::Malformed("weather payload has no 'main' block".to_string()))?;
    let condition = body
        .pointer("/weather/0/description")
        .cloned()
        .ok_or_else(|| ToolError::Malformed("weather payload has no conditions".to_string()))?;

    Ok(json!({
        "city": body.get("name").cloned().unwrap_or(Value::Null),
        "temperature": main.get("temp").cloned().unwrap_or(Value::Null),
        "condition": condition,
        "humidity": main.get("humidity").cloned().unwrap_or(Value::Null),
    }))
}
