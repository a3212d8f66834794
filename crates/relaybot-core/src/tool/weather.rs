use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::error::ToolError;
use crate::util::http;

use super::{param_str, Action, Params, Tool, ToolOutcome};

const TIMEOUT: Duration = Duration::from_secs(10);

/// Current weather from wttr.in (`format=j1`, no key required).
pub struct WeatherTool {
    api_base: String,
}

impl WeatherTool {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
        }
    }

    async fn fetch(&self, city: &str) -> Result<String, ToolError> {
        let url = format!("{}/{}", self.api_base, urlencoding::encode(city));
        let resp = http::client()
            .get(&url)
            .query(&[("format", "j1")])
            .timeout(TIMEOUT)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ToolError::Api {
                status: status.as_u16(),
                message: resp.text().await.unwrap_or_default(),
            });
        }

        let data: Value = resp
            .json()
            .await
            .map_err(|e| ToolError::Parse(e.to_string()))?;
        summarize(city, &data)
    }
}

fn summarize(city: &str, data: &Value) -> Result<String, ToolError> {
    let current = data
        .get("current_condition")
        .and_then(|c| c.get(0))
        .ok_or_else(|| ToolError::Parse("no current_condition in response".to_string()))?;

    let desc = current
        .pointer("/weatherDesc/0/value")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .trim();
    let temp = current.get("temp_C").and_then(|v| v.as_str()).unwrap_or("?");
    let humidity = current.get("humidity").and_then(|v| v.as_str()).unwrap_or("?");

    Ok(format!("{city}: {desc}, {temp}°C, humidity {humidity}%"))
}

#[async_trait]
impl Tool for WeatherTool {
    fn action(&self) -> Action {
        Action::GetWeather
    }

    fn description(&self) -> &str {
        "Get the current weather for a city"
    }

    fn parameters(&self) -> Value {
        json!({"city": "Beijing"})
    }

    async fn execute(&self, params: &Params) -> ToolOutcome {
        let city = param_str(params, "city");
        if city.is_empty() {
            return ToolOutcome::error("please specify a city");
        }

        match self.fetch(&city).await {
            Ok(report) => ToolOutcome::Text(report),
            Err(e) => ToolOutcome::error(format!("weather lookup for {city} failed: {e}")),
        }
    }
}
