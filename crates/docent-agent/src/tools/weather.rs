//! Weather lookup tool.
//!
//! Serves canned conditions for a handful of cities and a mild default for
//! everything else. No network access.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::AgentError;
use crate::tools::{string_arg, ArgKind, ArgumentSchema, Tool, ToolOutput};

const CONDITIONS: [(&str, &str); 6] = [
    ("lagos", "Sunny, 28°C, humidity: 65%"),
    ("new york", "Partly cloudy, 15°C, wind: 10 km/h"),
    ("london", "Rainy, 12°C, chance of rain: 80%"),
    ("tokyo", "Clear, 22°C, humidity: 50%"),
    ("sydney", "Windy, 20°C, wind: 25 km/h"),
    ("paris", "Overcast, 14°C, chance of rain: 30%"),
];

const FALLBACK: &str = "Mild, 20°C, partly cloudy";

/// `get_weather(city)`.
pub struct GetWeatherTool;

#[async_trait]
impl Tool for GetWeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get current weather for a given city, including temperature and conditions."
    }

    fn schema(&self) -> ArgumentSchema {
        ArgumentSchema::new().required("city", ArgKind::String, "The city name to get weather for.")
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<ToolOutput, AgentError> {
        let city = string_arg(self.name(), &arguments, "city")?.trim();
        if city.is_empty() {
            return Err(AgentError::ToolFailed("city must not be empty".to_string()));
        }

        let key = city.to_lowercase();
        let title = title_case(city);
        let content = match CONDITIONS.iter().find(|(name, _)| *name == key) {
            Some((_, conditions)) => format!("Current weather in {}: {}", title, conditions),
            None => format!("Weather simulation for {}: {}", title, FALLBACK),
        };

        tracing::debug!(city = %title, "Weather looked up");
        Ok(ToolOutput::text(content))
    }
}

/// Capitalise the first letter of every word and lowercase the rest.
fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(city: &str) -> Map<String, Value> {
        json!({ "city": city }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_known_city() {
        let output = GetWeatherTool.call(args("lagos")).await.unwrap();
        assert_eq!(output.content, "Current weather in Lagos: Sunny, 28°C, humidity: 65%");
        assert!(output.citations.is_empty());
    }

    #[tokio::test]
    async fn test_known_city_is_case_insensitive() {
        let output = GetWeatherTool.call(args("NEW YORK")).await.unwrap();
        assert_eq!(
            output.content,
            "Current weather in New York: Partly cloudy, 15°C, wind: 10 km/h"
        );
    }

    #[tokio::test]
    async fn test_unknown_city_falls_back() {
        let output = GetWeatherTool.call(args("abuja")).await.unwrap();
        assert_eq!(
            output.content,
            "Weather simulation for Abuja: Mild, 20°C, partly cloudy"
        );
    }

    #[tokio::test]
    async fn test_lookup_with_debug_logging_enabled() {
        docent_core::logging::init("debug");
        let output = GetWeatherTool.call(args("paris")).await.unwrap();
        assert_eq!(
            output.content,
            "Current weather in Paris: Overcast, 14°C, chance of rain: 30%"
        );
    }

    #[tokio::test]
    async fn test_blank_city_is_an_error() {
        let err = GetWeatherTool.call(args("   ")).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolFailed(_)));
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("sAN  franCISCO"), "San Francisco");
        assert_eq!(title_case("tokyo"), "Tokyo");
    }
}
