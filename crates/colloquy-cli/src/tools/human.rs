//! Human assistance tool

use async_trait::async_trait;
use colloquy_agent::interrupt::Interrupt;
use colloquy_agent::tool::{Tool, ToolContext, ToolResult};
use serde_json::json;
use tokio_util::sync::CancellationToken;

/// `human_assistance`: pauses the graph until an operator answers.
///
/// The interrupt payload is `{"query": ...}`; the resume value is expected as
/// `{"data": ...}` and its `data` becomes the tool result.
pub struct HumanAssistanceTool;

impl HumanAssistanceTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HumanAssistanceTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for HumanAssistanceTool {
    fn name(&self) -> &str {
        "human_assistance"
    }

    fn description(&self) -> &str {
        "Request assistance from a Human."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"}
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        _tool_call_id: &str,
        _arguments: serde_json::Value,
        _cancel: CancellationToken,
    ) -> ToolResult {
        ToolResult::error("human_assistance can only run inside a graph")
    }

    async fn execute_with_context(
        &self,
        _tool_call_id: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, Interrupt> {
        let query = arguments.get("query").cloned().unwrap_or_default();
        let response = ctx.interrupt(json!({ "query": query }))?;

        Ok(match response.get("data") {
            Some(serde_json::Value::String(data)) => ToolResult::text(data.clone()),
            Some(other) => ToolResult::text(other.to_string()),
            None => ToolResult::error("Resume value is missing 'data'"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use colloquy_agent::interrupt::ResumeSlot;

    #[tokio::test]
    async fn test_first_call_interrupts_with_query() {
        let ctx = ToolContext::new(CancellationToken::new());
        let err = HumanAssistanceTool::new()
            .execute_with_context("call_1", json!({"query": "need an expert"}), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.value, json!({"query": "need an expert"}));
    }

    #[tokio::test]
    async fn test_resume_returns_data() {
        let ctx = ToolContext::new(CancellationToken::new())
            .with_resume(ResumeSlot::new(Some(json!({"data": "Use a graph."}))));
        let result = HumanAssistanceTool::new()
            .execute_with_context("call_1", json!({"query": "need an expert"}), &ctx)
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "Use a graph.");
    }

    #[tokio::test]
    async fn test_resume_without_data_is_error() {
        let ctx = ToolContext::new(CancellationToken::new())
            .with_resume(ResumeSlot::new(Some(json!("bare answer"))));
        let result = HumanAssistanceTool::new()
            .execute_with_context("call_1", json!({"query": "q"}), &ctx)
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
