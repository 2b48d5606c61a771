//! Tool trait, execution context and registry

use async_trait::async_trait;
use colloquy_ai::{Content, ToolCall};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::interrupt::{Interrupt, ResumeSlot};

/// Result of a tool execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Content to return to the LLM
    pub content: Vec<Content>,
    /// Whether the execution resulted in an error
    pub is_error: bool,
}

impl ToolResult {
    /// Create a successful text result
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Create an error result
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            is_error: true,
        }
    }

    /// Create a successful result holding serialized JSON
    pub fn json(value: &serde_json::Value) -> Self {
        Self::text(value.to_string())
    }

    /// Get the text content as a single string
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-step context handed to tools
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    /// Cancellation for the current run
    pub cancel: CancellationToken,
    resume: ResumeSlot,
}

impl ToolContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            resume: ResumeSlot::default(),
        }
    }

    /// Attach the resume value for a step re-run after an interrupt
    pub fn with_resume(mut self, resume: ResumeSlot) -> Self {
        self.resume = resume;
        self
    }

    /// Pause for human input.
    ///
    /// Returns the resume value when the step is being resumed, otherwise
    /// an [`Interrupt`] carrying `payload` that the caller must propagate.
    pub fn interrupt(&self, payload: serde_json::Value) -> Result<serde_json::Value, Interrupt> {
        match self.resume.take() {
            Some(value) => Ok(value),
            None => Err(Interrupt::new(payload)),
        }
    }
}

/// Trait for executable tools
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (used in API calls)
    fn name(&self) -> &str;

    /// Tool description for the LLM
    fn description(&self) -> &str;

    /// JSON Schema for parameters
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments
    async fn execute(
        &self,
        tool_call_id: &str,
        arguments: serde_json::Value,
        cancel: CancellationToken,
    ) -> ToolResult;

    /// Execute with access to the step context.
    ///
    /// Default implementation delegates to `execute()`. Tools that need
    /// human input override this and call [`ToolContext::interrupt`].
    async fn execute_with_context(
        &self,
        tool_call_id: &str,
        arguments: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<ToolResult, Interrupt> {
        Ok(self.execute(tool_call_id, arguments, ctx.cancel.clone()).await)
    }
}

/// Type alias for a boxed tool
pub type BoxedTool = Arc<dyn Tool>;

/// Convert a Tool to a colloquy_ai::Tool for API calls
pub fn to_api_tool(tool: &dyn Tool) -> colloquy_ai::Tool {
    colloquy_ai::Tool {
        name: tool.name().to_string(),
        description: tool.description().to_string(),
        parameters: tool.parameters_schema(),
    }
}

/// An ordered set of tools with cached argument validators
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<BoxedTool>,
    /// Compiled JSON schema validators keyed by tool name
    schema_cache: HashMap<String, Arc<jsonschema::Validator>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(Arc::new(tool));
        self
    }

    /// Register a tool. A tool with the same name is replaced.
    pub fn register(&mut self, tool: BoxedTool) {
        if let Some(pos) = self.tools.iter().position(|t| t.name() == tool.name()) {
            tracing::warn!("replacing already registered tool '{}'", tool.name());
            self.tools.remove(pos);
        }
        self.cache_tool_schema(&tool);
        self.tools.push(tool);
    }

    /// Compile and cache the JSON schema validator for a tool.
    fn cache_tool_schema(&mut self, tool: &BoxedTool) {
        let schema = tool.parameters_schema();
        match jsonschema::validator_for(&schema) {
            Ok(validator) => {
                self.schema_cache
                    .insert(tool.name().to_string(), Arc::new(validator));
            }
            Err(e) => {
                tracing::warn!(
                    "Invalid tool parameter schema for '{}', skipping validation: {}",
                    tool.name(),
                    e
                );
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&BoxedTool> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Tool names in registration order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn tools(&self) -> &[BoxedTool] {
        &self.tools
    }

    /// Definitions sent to the model
    pub fn api_tools(&self) -> Vec<colloquy_ai::Tool> {
        self.tools.iter().map(|t| to_api_tool(t.as_ref())).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute one tool call.
    ///
    /// Unknown tools and arguments that fail schema validation produce error
    /// results for the model to read. Only interrupts escape as `Err`.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult, Interrupt> {
        let Some(tool) = self.get(&call.name) else {
            return Ok(ToolResult::error(format!(
                "Error: {} is not a valid tool, try one of [{}].",
                call.name,
                self.names().join(", ")
            )));
        };

        if let Some(err) = self
            .schema_cache
            .get(&call.name)
            .and_then(|validator| validate_with_validator(&call.arguments, validator))
        {
            tracing::debug!(tool = %call.name, "rejected tool arguments: {}", err);
            return Ok(ToolResult::error(err));
        }

        tracing::debug!(tool = %call.name, id = %call.id, "executing tool");
        tool.execute_with_context(&call.id, call.arguments.clone(), ctx)
            .await
    }
}

/// Validate tool arguments using a pre-compiled validator.
/// Returns `Some(error_message)` if validation fails, `None` if valid.
fn validate_with_validator(
    args: &serde_json::Value,
    validator: &jsonschema::Validator,
) -> Option<String> {
    let errors: Vec<String> = validator
        .iter_errors(args)
        .map(|e| {
            let path = e.instance_path.to_string();
            if path.is_empty() {
                e.to_string()
            } else {
                format!("{}: {}", path, e)
            }
        })
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "Tool argument validation failed:\n{}",
            errors.join("\n")
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::ResumeSlot;
    use serde_json::json;

    /// A simple test tool that echoes its arguments.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            _tool_call_id: &str,
            arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> ToolResult {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .unwrap_or("(empty)");
            ToolResult::text(text)
        }
    }

    /// Asks a human and echoes the answer.
    struct AskTool;

    #[async_trait]
    impl Tool for AskTool {
        fn name(&self) -> &str {
            "ask"
        }
        fn description(&self) -> &str {
            "Ask a human"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {"query": {"type": "string"}}})
        }
        async fn execute(
            &self,
            _tool_call_id: &str,
            _arguments: serde_json::Value,
            _cancel: CancellationToken,
        ) -> ToolResult {
            ToolResult::error("needs a context")
        }
        async fn execute_with_context(
            &self,
            _tool_call_id: &str,
            arguments: serde_json::Value,
            ctx: &ToolContext,
        ) -> Result<ToolResult, Interrupt> {
            let answer = ctx.interrupt(json!({"query": arguments["query"]}))?;
            Ok(ToolResult::text(answer["data"].as_str().unwrap_or_default()))
        }
    }

    fn call(name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: name.into(),
            arguments,
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new().with(EchoTool).with(AskTool)
    }

    #[test]
    fn test_tool_result_text() {
        let r = ToolResult::text("ok");
        assert!(!r.is_error);
        assert_eq!(r.text_content(), "ok");
    }

    #[test]
    fn test_tool_result_error() {
        let r = ToolResult::error("bad");
        assert!(r.is_error);
        assert_eq!(r.text_content(), "bad");
    }

    #[test]
    fn test_to_api_tool() {
        let api_tool = to_api_tool(&EchoTool);
        assert_eq!(api_tool.name, "echo");
        assert_eq!(api_tool.description, "Echoes input");
        assert_eq!(api_tool.parameters["required"][0], "text");
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Arc::new(EchoTool));
        assert_eq!(registry.names(), vec!["ask", "echo"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_valid_call() {
        let result = registry()
            .execute(&call("echo", json!({"text": "hello"})), &ToolContext::default())
            .await
            .unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text_content(), "hello");
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error_result() {
        let result = registry()
            .execute(&call("nope", json!({})), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.text_content().contains("nope is not a valid tool"));
        assert!(result.text_content().contains("echo, ask"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_error_result() {
        let result = registry()
            .execute(&call("echo", json!({"text": 42})), &ToolContext::default())
            .await
            .unwrap();
        assert!(result.is_error);
        assert!(result.text_content().contains("validation failed"));

        let missing = registry()
            .execute(&call("echo", json!({})), &ToolContext::default())
            .await
            .unwrap();
        assert!(missing.is_error);
    }

    #[tokio::test]
    async fn test_interrupt_without_resume_escapes() {
        let interrupt = registry()
            .execute(&call("ask", json!({"query": "help?"})), &ToolContext::default())
            .await
            .unwrap_err();
        assert_eq!(interrupt.value, json!({"query": "help?"}));
    }

    #[tokio::test]
    async fn test_interrupt_with_resume_returns_answer() {
        let ctx = ToolContext::default()
            .with_resume(ResumeSlot::new(Some(json!({"data": "use LangGraph"}))));
        let result = registry()
            .execute(&call("ask", json!({"query": "help?"})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.text_content(), "use LangGraph");

        // The value is consumed; a second call pauses again
        assert!(
            registry()
                .execute(&call("ask", json!({"query": "again?"})), &ctx)
                .await
                .is_err()
        );
    }
}
