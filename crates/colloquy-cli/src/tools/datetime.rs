//! System clock tool

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone};
use colloquy_agent::tool::{Tool, ToolResult};
use serde_json::json;
use std::fmt::Write;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

/// Format `time` with a strftime pattern, failing on unknown specifiers
pub fn format_time<Tz>(time: &DateTime<Tz>, format: &str) -> Result<String, std::fmt::Error>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let mut out = String::new();
    write!(out, "{}", time.format(format))?;
    Ok(out)
}

/// `get_system_datetime`: the local date and time in a given format
pub struct DateTimeTool;

impl DateTimeTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DateTimeTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "get_system_datetime"
    }

    fn description(&self) -> &str {
        "Returns the current date and time in specified format"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime format string",
                    "default": DEFAULT_FORMAT
                }
            }
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        let format = arguments
            .get("format")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_FORMAT);

        match format_time(&Local::now(), format) {
            Ok(formatted) => ToolResult::text(formatted),
            Err(_) => ToolResult::error(format!("Invalid datetime format: {}", format)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_default_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(format_time(&time, DEFAULT_FORMAT).unwrap(), "09-03-2024 07:05:01");
    }

    #[test]
    fn test_custom_format() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
        assert_eq!(format_time(&time, "%H:%M").unwrap(), "17:45");
    }

    #[test]
    fn test_invalid_format_is_error() {
        let time = Utc.with_ymd_and_hms(2024, 3, 9, 17, 45, 0).unwrap();
        assert!(format_time(&time, "%Y-%").is_err());
    }

    #[tokio::test]
    async fn test_tool_defaults_when_format_missing() {
        let result = DateTimeTool::new()
            .execute("call_1", json!({}), CancellationToken::new())
            .await;
        assert!(!result.is_error);
        // dd-mm-yyyy hh:mm:ss
        assert_eq!(result.text_content().len(), 19);
    }

    #[tokio::test]
    async fn test_tool_reports_invalid_format() {
        let result = DateTimeTool::new()
            .execute("call_1", json!({"format": "%Y-%"}), CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.text_content().starts_with("Invalid datetime format"));
    }
}
