//! Weather lookup (mock data).

use crate::registry::ToolHandler;
use crate::types::ToolResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const NAME: &str = "weather";
pub const DESCRIPTION: &str = "查询指定城市的实时天气信息";

pub fn schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "location": {
                "type": "string",
                "description": "城市名称，如\"北京\"或\"Shanghai\""
            },
            "unit": {
                "type": "string",
                "enum": ["C", "F"],
                "default": "C",
                "description": "温度单位，C为摄氏度，F为华氏度"
            }
        },
        "required": ["location"]
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    C,
    F,
}

#[derive(Debug, Deserialize)]
struct WeatherQuery {
    location: String,
    unit: TemperatureUnit,
}

#[derive(Debug, Serialize)]
struct WeatherReport {
    location: String,
    temperature: i64,
    condition: &'static str,
    humidity: u8,
    unit: TemperatureUnit,
}

#[derive(Debug, Default)]
pub struct WeatherTool;

#[async_trait]
impl ToolHandler for WeatherTool {
    async fn call(&self, input: Value) -> anyhow::Result<ToolResult> {
        let query: WeatherQuery = serde_json::from_value(input)?;
        tracing::info!(location = %query.location, unit = ?query.unit, "weather lookup");
        let report = WeatherReport {
            temperature: match query.unit {
                TemperatureUnit::C => 25,
                TemperatureUnit::F => 77,
            },
            location: query.location,
            condition: "晴天",
            humidity: 45,
            unit: query.unit,
        };
        Ok(ToolResult::complete(serde_json::to_value(report)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fahrenheit_changes_temperature() {
        let result = WeatherTool
            .call(json!({"location": "Shanghai", "unit": "F"}))
            .await
            .unwrap();
        assert_eq!(
            result.payload(),
            &json!({
                "location": "Shanghai",
                "temperature": 77,
                "condition": "晴天",
                "humidity": 45,
                "unit": "F"
            })
        );
    }
}
