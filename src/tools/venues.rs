use async_trait::async_trait;
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value, json};

use super::args::{expect_only, required_str};
use super::http::{HttpClient, JsonResponse, endpoint};
use super::{DATE_PLANNER_TOOL_NAME, Tool, ToolError, ToolSchema};
use crate::config::TOMTOM_API_KEY_ENV;

pub const TOMTOM_SEARCH_BASE_URL: &str = "https://api.tomtom.com/search/2/search";
const RESULT_LIMIT: &str = "3";
const NO_VENUES: &str =
    "No venues found. Try a different category or be more specific with the city.";

/// Venue search through TomTom fuzzy search.
pub struct DatePlannerTool {
    http: HttpClient,
    api_key: Option<Secret<String>>,
    base_url: String,
    country_set: String,
    schema: ToolSchema,
}

impl DatePlannerTool {
    pub fn new(http: HttpClient, api_key: Option<Secret<String>>) -> Self {
        Self {
            http,
            api_key,
            base_url: TOMTOM_SEARCH_BASE_URL.to_string(),
            country_set: "IN".to_string(),
            schema: ToolSchema::new(
                DATE_PLANNER_TOOL_NAME,
                "Finds real-world venues for dates (cafes, restaurants, etc.).",
            )
            .param("location", "string (e.g., 'Indiranagar, Bangalore')")
            .param("category", "string (e.g., 'Coffee' or 'Pizza')"),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_country_set(mut self, country_set: impl Into<String>) -> Self {
        self.country_set = country_set.into();
        self
    }
}

#[async_trait]
impl Tool for DatePlannerTool {
    fn schema(&self) -> &ToolSchema {
        &self.schema
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, ToolError> {
        expect_only(args, &["location", "category"])?;
        let location = required_str(args, "location")?;
        let category = required_str(args, "category")?;
        let api_key = self
            .api_key
            .as_ref()
            .ok_or(ToolError::MissingCredential(TOMTOM_API_KEY_ENV))?;

        let query = format!("{category} in {location}.json");
        let url = endpoint(&self.base_url, &[query.as_str()])?;
        let request = self.http.get(url).query(&[
            ("key", api_key.expose_secret().as_str()),
            ("limit", RESULT_LIMIT),
            ("countrySet", self.country_set.as_str()),
        ]);
        let response = self.http.send_json(request).await?;
        parse_venue_response(&response)
    }
}

fn format_distance(place: &Value) -> String {
    match place.get("dist").and_then(Value::as_f64) {
        Some(meters) => format!("{:.1}km", meters / 1000.0),
        None => "Location found".to_string(),
    }
}

pub fn parse_venue_response(response: &JsonResponse) -> Result<Value, ToolError> {
    let results = response
        .body
        .get("results")
        .and_then(Value::as_array)
        .filter(|results| !results.is_empty());

    let Some(results) = results.filter(|_| response.is_success()) else {
        return Err(ToolError::Rejected(NO_VENUES.to_string()));
    };

    let venues = results
        .iter()
        .map(|place| {
            let text = |pointer: &str, default: &str| {
                place
                    .pointer(pointer)
                    .and_then(Value::as_str)
                    .unwrap_or(default)
                    .to_string()
            };
            json!({
                "name": text("/poi/name", "Unknown Venue"),
                "category": text("/poi/categories/0", "Venue"),
                "address": text("/address/freeformAddress", "Address not available"),
                "distance": format_distance(place),
            })
        })
        .collect::<Vec<Value>>();

    Ok(json!({ "date_venues": venues }))
}
