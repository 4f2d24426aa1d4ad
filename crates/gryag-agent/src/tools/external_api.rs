//! `weather` / `currency` (spec.md §4.4): thin read-only HTTP tools, same
//! shape as `search_web`, kept on a cooldown to protect upstream quotas.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{QuotaPolicy, Tool, ToolOutcome};

pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
    quota_policy: QuotaPolicy,
}

impl WeatherTool {
    pub fn new(base_url: String, quota_policy: QuotaPolicy) -> Self {
        Self { client: reqwest::Client::new(), base_url, quota_policy }
    }
}

#[derive(Deserialize)]
struct OpenMeteoResponse {
    current_weather: Option<CurrentWeather>,
}

#[derive(Deserialize)]
struct CurrentWeather {
    temperature: f64,
    windspeed: f64,
    weathercode: u32,
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "weather"
    }

    fn description(&self) -> &str {
        "Look up the current weather for a named location"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {"location": {"type": "string"}},
            "required": ["location"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let Some(location) = input.get("location").and_then(|v| v.as_str()) else {
            return ToolOutcome::InvalidArgument { detail: "location must be a string".to_string() };
        };

        let response = match self
            .client
            .get(&self.base_url)
            .query(&[("name", location), ("current_weather", "true")])
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutcome::Error { kind: "weather_lookup_failed".to_string(), message: e.to_string() },
        };

        if !response.status().is_success() {
            return ToolOutcome::Error {
                kind: "weather_lookup_failed".to_string(),
                message: format!("upstream returned {}", response.status()),
            };
        }

        let parsed: OpenMeteoResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return ToolOutcome::Error { kind: "weather_lookup_failed".to_string(), message: e.to_string() },
        };

        match parsed.current_weather {
            Some(weather) => ToolOutcome::Ok {
                result: json!({
                    "temperature_c": weather.temperature,
                    "windspeed_kmh": weather.windspeed,
                    "weather_code": weather.weathercode,
                }),
            },
            None => ToolOutcome::Error {
                kind: "weather_lookup_failed".to_string(),
                message: format!("no weather data for {location}"),
            },
        }
    }
}

pub struct CurrencyTool {
    client: reqwest::Client,
    base_url: String,
    quota_policy: QuotaPolicy,
}

impl CurrencyTool {
    pub fn new(base_url: String, quota_policy: QuotaPolicy) -> Self {
        Self { client: reqwest::Client::new(), base_url, quota_policy }
    }
}

#[derive(Deserialize)]
struct ExchangeRateResponse {
    rates: std::collections::HashMap<String, f64>,
}

#[async_trait]
impl Tool for CurrencyTool {
    fn name(&self) -> &str {
        "currency"
    }

    fn description(&self) -> &str {
        "Convert an amount from one currency to another using current exchange rates"
    }

    fn input_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "from": {"type": "string"},
                "to": {"type": "string"},
                "amount": {"type": "number"},
            },
            "required": ["from", "to", "amount"],
        })
    }

    fn quota_policy(&self) -> QuotaPolicy {
        self.quota_policy
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutcome {
        let (Some(from), Some(to), Some(amount)) = (
            input.get("from").and_then(|v| v.as_str()),
            input.get("to").and_then(|v| v.as_str()),
            input.get("amount").and_then(|v| v.as_f64()),
        ) else {
            return ToolOutcome::InvalidArgument { detail: "from, to, and amount are required".to_string() };
        };

        let response = match self
            .client
            .get(format!("{}/{}", self.base_url, from.to_uppercase()))
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolOutcome::Error { kind: "currency_lookup_failed".to_string(), message: e.to_string() },
        };

        if !response.status().is_success() {
            return ToolOutcome::Error {
                kind: "currency_lookup_failed".to_string(),
                message: format!("upstream returned {}", response.status()),
            };
        }

        let parsed: ExchangeRateResponse = match response.json().await {
            Ok(p) => p,
            Err(e) => return ToolOutcome::Error { kind: "currency_lookup_failed".to_string(), message: e.to_string() },
        };

        match parsed.rates.get(&to.to_uppercase()) {
            Some(rate) => ToolOutcome::Ok { result: json!({"converted": amount * rate, "rate": rate}) },
            None => ToolOutcome::InvalidArgument { detail: format!("unknown currency: {to}") },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn weather_rejects_missing_location() {
        let tool = WeatherTool::new("https://geocoding-api.open-meteo.com/v1/forecast".to_string(), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn currency_rejects_missing_fields() {
        let tool = CurrencyTool::new("https://api.exchangerate-api.com/v4/latest".to_string(), QuotaPolicy::NONE);
        let outcome = tool.execute(json!({"from": "USD"})).await;
        assert!(matches!(outcome, ToolOutcome::InvalidArgument { .. }));
    }
}
