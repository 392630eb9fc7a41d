use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_number, required_str};
use super::http::{HttpClient, JsonResponse, endpoint};
use super::{CURRENCY_TOOL_NAME, Tool, ToolError, ToolSchema};
use crate::config::EXCHANGE_RATE_KEY_ENV;

pub const EXCHANGE_RATE_BASE_URL: &str = "https://v6.exchangerate-api.com/v6";
const CONVERSION_FAILED: &str = "Invalid currency codes or API error";

pub struct CurrencyTool {
    http: HttpClient,
    api_key: Option<Secret<String>>,
    base_url: String,
    schema: ToolSchema,
}

impl CurrencyTool {
    pub fn new(http: HttpClient, api_key: Option<Secret<String>>) -> Self {
        Self {
            http,
            api_key,
            base_url: EXCHANGE_RATE_BASE_URL.to_string(),
            schema: ToolSchema::new(
                CURRENCY_TOOL_NAME,
                "Convert an amount from one currency to another (e.g., USD to INR).",
            )
            .param("from_code", "string (3-letter code)")
            .param("to_code", "string (3-letter code)")
            .param("amount", "number"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Tool for CurrencyTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["from_code", "to_code", "amount"])?;
        let from = currency_code(args, "from_code")?;
        let to = currency_code(args, "to_code")?;
        let amount = required_number(args, "amount")?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ToolError::MissingCredential(EXCHANGE_RATE_KEY_ENV))?;

        let amount_text = format_amount(amount);
        let url = endpoint(
            &self.base_url,
            &[
                api_key.expose_secret().as_str(),
                "pair",
                from.as_str(),
                to.as_str(),
                amount_text.as_str(),
            ],
        )?;
        let response = self.http.send_json(self.http.get(url)).await?;
        parse_conversion_response(&response, &from, &to, &amount_text)
    }
}

fn currency_code(args: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    let code = required_str(args, key)?.to_ascii_uppercase();
    if code.len() == 3 && code.chars().all(|ch| ch.is_ascii_alphabetic()) {
        Ok(code)
    } else {
        Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a 3-letter currency code, got '{code}'"
        )))
    }
}

/// Integral amounts print without a fractional part (`250`, not `250.0`).
pub fn format_amount(amount: f64) -> String {
    if amount.fract() == 0.0 && amount.abs() < 1e15 {
        format!("{}", amount as i64)
    } else {
        format!("{amount}")
    }
}

pub fn parse_conversion_response(
    response: &JsonResponse,
    from: &str,
    to: &str,
    amount: &str,
) -> Result<Value, ToolError> {
    let body = &response.body;
    if body.get("result").and_then(Value::as_str) != Some("success") {
        return Err(ToolError::Rejected(CONVERSION_FAILED.to_string()));
    }

    let converted = body
        .get("conversion_result")
        .ok_or_else(|| ToolError::Malformed("missing 'conversion_result'".to_string()))?;
    let rate = body
        .get("conversion_rate")
        .cloned()
        .ok_or_else(|| ToolError::Malformed("missing 'conversion_rate'".to_string()))?;

    Ok(json!({
        "conversion": format!("{amount} {from} = {converted} {to}"),
        "rate": rate,
    }))
}
