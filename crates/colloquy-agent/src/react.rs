//! Text-format ReAct agent
//!
//! Unlike the tool-calling graph in [`crate::prebuilt`], this agent never uses the
//! provider's native tool calls. The model writes `Thought:` / `Action:` /
//! `Action Input:` lines, the executor runs the named tool and appends an
//! `Observation:` to a scratchpad, and the loop repeats until the model writes
//! `Final Answer:`.

use std::sync::{Arc, LazyLock};

use colloquy_ai::{ChatPromptTemplate, PromptPart, PromptValues, ToolCall};
use regex::Regex;

use crate::error::Result;
use crate::model::ChatModel;
use crate::tool::{ToolContext, ToolRegistry};

/// The standard ReAct prompt
pub const REACT_PROMPT: &str = "Answer the following questions as best you can. You have access to the following tools:

{tools}

Use the following format:

Question: the input question you must answer
Thought: you should always think about what to do
Action: the action to take, should be one of [{tool_names}]
Action Input: the input to the action
Observation: the result of the action
... (this Thought/Action/Action Input/Observation can repeat N times)
Thought: I now know the final answer
Final Answer: the final answer to the original input question

Begin!

Question: {input}
Thought:{agent_scratchpad}";

const FINAL_ANSWER: &str = "Final Answer:";
const OBSERVATION_STOP: &str = "\nObservation";
const ITERATION_LIMIT_OUTPUT: &str = "Agent stopped due to iteration limit or time limit.";

static ACTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)[\s]*Action\s*\d*\s*Input\s*\d*\s*:[\s]*(.*)")
        .expect("valid action regex")
});
static ACTION_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)Action\s*\d*\s*:[\s]*(.*?)").expect("valid regex"));

/// A tool invocation chosen by the model
#[derive(Debug, Clone, PartialEq)]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: String,
    /// The model text that produced this action
    pub log: String,
}

/// One parsed model turn
#[derive(Debug, Clone, PartialEq)]
pub enum AgentStep {
    Action(AgentAction),
    Finish { output: String, log: String },
}

/// Model output that does not follow the format
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct OutputParseError {
    pub message: String,
    /// Observation fed back to the model
    pub observation: String,
}

impl OutputParseError {
    fn new(message: impl Into<String>, observation: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            observation: observation.into(),
        }
    }
}

/// Parse one model turn
pub fn parse_react_output(text: &str) -> std::result::Result<AgentStep, OutputParseError> {
    let includes_answer = text.contains(FINAL_ANSWER);

    if let Some(caps) = ACTION_RE.captures(text) {
        if includes_answer {
            return Err(OutputParseError::new(
                format!("Parsing LLM output produced both a final answer and a parse-able action: {}", text),
                "Invalid Format: produced both a final answer and an action. Do one or the other.",
            ));
        }
        let tool = caps[1].trim().to_string();
        let tool_input = caps[2].trim().trim_matches('"').to_string();
        return Ok(AgentStep::Action(AgentAction {
            tool,
            tool_input,
            log: text.to_string(),
        }));
    }

    if let Some(pos) = text.find(FINAL_ANSWER) {
        let output = text[pos + FINAL_ANSWER.len()..].trim().to_string();
        return Ok(AgentStep::Finish {
            output,
            log: text.to_string(),
        });
    }

    if !ACTION_ONLY_RE.is_match(text) {
        return Err(OutputParseError::new(
            format!("Could not parse LLM output: `{}`", text),
            "Invalid Format: Missing 'Action:' after 'Thought:'",
        ));
    }
    Err(OutputParseError::new(
        format!("Could not parse LLM output: `{}`", text),
        "Invalid Format: Missing 'Action Input:' after 'Action:'",
    ))
}

/// Executor output
#[derive(Debug, Clone)]
pub struct ExecutorOutput {
    pub output: String,
    /// Actions taken and what they observed
    pub intermediate_steps: Vec<(AgentAction, String)>,
}

/// Drives the Thought/Action/Observation loop
pub struct AgentExecutor {
    model: ChatModel,
    tools: Arc<ToolRegistry>,
    prompt: ChatPromptTemplate,
    max_iterations: usize,
    verbose: bool,
}

impl AgentExecutor {
    pub fn new(model: ChatModel, tools: Arc<ToolRegistry>) -> Self {
        Self {
            model: model.with_stop([OBSERVATION_STOP]),
            tools,
            prompt: ChatPromptTemplate::from_messages([PromptPart::User(REACT_PROMPT.into())]),
            max_iterations: 15,
            verbose: false,
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Log each step at info level
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn tool_descriptions(&self) -> String {
        self.tools
            .tools()
            .iter()
            .map(|t| format!("{}({}) - {}", t.name(), argument_names(&t.parameters_schema()).join(", "), t.description()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Answer `input`, using tools as the model asks
    pub async fn invoke(&self, input: &str) -> Result<ExecutorOutput> {
        let mut values = PromptValues::new()
            .var("tools", self.tool_descriptions())
            .var("tool_names", self.tools.names().join(", "))
            .var("input", input);
        let mut steps: Vec<(AgentAction, String)> = Vec::new();

        for iteration in 0..self.max_iterations {
            values.set_var("agent_scratchpad", scratchpad(&steps));
            let messages = self.prompt.invoke(&values)?;
            let reply = self.model.invoke(&messages).await?;
            let text = truncate_at_observation(&reply.text());

            match parse_react_output(&text) {
                Ok(AgentStep::Finish { output, log }) => {
                    if self.verbose {
                        tracing::info!("{}", log.trim());
                    }
                    return Ok(ExecutorOutput {
                        output,
                        intermediate_steps: steps,
                    });
                }
                Ok(AgentStep::Action(action)) => {
                    if self.verbose {
                        tracing::info!("{}", action.log.trim());
                    }
                    let observation = self.run_action(&action, iteration).await?;
                    if self.verbose {
                        tracing::info!("Observation: {}", observation);
                    }
                    steps.push((action, observation));
                }
                Err(e) => {
                    tracing::debug!("{}", e);
                    let action = AgentAction {
                        tool: "_Exception".into(),
                        tool_input: e.observation.clone(),
                        log: text.clone(),
                    };
                    steps.push((action, e.observation));
                }
            }
        }

        tracing::warn!("agent stopped after {} iterations", self.max_iterations);
        Ok(ExecutorOutput {
            output: ITERATION_LIMIT_OUTPUT.to_string(),
            intermediate_steps: steps,
        })
    }

    async fn run_action(&self, action: &AgentAction, iteration: usize) -> Result<String> {
        let Some(tool) = self.tools.get(&action.tool) else {
            return Ok(format!(
                "{} is not a valid tool, try one of [{}].",
                action.tool,
                self.tools.names().join(", ")
            ));
        };

        let call = ToolCall {
            id: format!("react_{}", iteration),
            name: action.tool.clone(),
            arguments: tool_arguments(&action.tool_input, &tool.parameters_schema()),
        };
        let result = self.tools.execute(&call, &ToolContext::default()).await?;
        Ok(result.text_content())
    }
}

/// Prior steps rendered for the prompt
fn scratchpad(steps: &[(AgentAction, String)]) -> String {
    let mut out = String::new();
    for (action, observation) in steps {
        out.push_str(&action.log);
        out.push_str("\nObservation: ");
        out.push_str(observation);
        out.push_str("\nThought: ");
    }
    out
}

/// Drop anything the model wrote after starting an observation itself
fn truncate_at_observation(text: &str) -> String {
    match text.find(OBSERVATION_STOP) {
        Some(pos) => text[..pos].to_string(),
        None => text.to_string(),
    }
}

fn argument_names(schema: &serde_json::Value) -> Vec<String> {
    schema
        .get("properties")
        .and_then(|p| p.as_object())
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default()
}

/// Turn free-text action input into tool arguments.
///
/// JSON objects pass through. Otherwise the text fills the tool's single
/// parameter; an empty input gives an empty object.
fn tool_arguments(input: &str, schema: &serde_json::Value) -> serde_json::Value {
    if let Ok(value @ serde_json::Value::Object(_)) = serde_json::from_str(input) {
        return value;
    }
    let names = argument_names(schema);
    match names.as_slice() {
        [only] if !input.is_empty() => {
            let mut args = serde_json::Map::new();
            args.insert(only.clone(), input.into());
            serde_json::Value::Object(args)
        }
        _ => serde_json::json!({}),
    }
}
