//! Chat prompt templates
//!
//! A template is an ordered list of parts. Text parts are rendered with `{name}`
//! substitution (`{{` and `}}` produce literal braces); placeholder parts splice in a
//! list of messages supplied at render time.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::Message;

/// One part of a chat prompt template
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    /// System message template
    System(String),
    /// User message template
    User(String),
    /// Assistant message template
    Assistant(String),
    /// Insert the message list bound to this name
    Placeholder(String),
}

/// Values bound when rendering a template
#[derive(Debug, Clone, Default)]
pub struct PromptValues {
    variables: HashMap<String, String>,
    messages: HashMap<String, Vec<Message>>,
}

impl PromptValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a string variable
    pub fn var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    /// Bind a message list for a placeholder
    pub fn messages(mut self, name: impl Into<String>, messages: Vec<Message>) -> Self {
        self.messages.insert(name.into(), messages);
        self
    }

    /// Bind a string variable in place
    pub fn set_var(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }
}

/// A chat prompt built from message templates and placeholders
#[derive(Debug, Clone, PartialEq)]
pub struct ChatPromptTemplate {
    parts: Vec<PromptPart>,
}

impl ChatPromptTemplate {
    /// Create a template from its parts
    pub fn from_messages(parts: impl IntoIterator<Item = PromptPart>) -> Self {
        Self {
            parts: parts.into_iter().collect(),
        }
    }

    pub fn parts(&self) -> &[PromptPart] {
        &self.parts
    }

    /// Names of all string variables and placeholders the template needs, in first-use order
    pub fn input_variables(&self) -> Vec<String> {
        let mut names = Vec::new();
        for part in &self.parts {
            match part {
                PromptPart::System(t) | PromptPart::User(t) | PromptPart::Assistant(t) => {
                    if let Ok(segments) = parse_template(t) {
                        for segment in segments {
                            if let Segment::Var(name) = segment {
                                if !names.contains(&name) {
                                    names.push(name);
                                }
                            }
                        }
                    }
                }
                PromptPart::Placeholder(name) => {
                    if !names.contains(name) {
                        names.push(name.clone());
                    }
                }
            }
        }
        names
    }

    /// Render the template into a message list
    pub fn invoke(&self, values: &PromptValues) -> Result<Vec<Message>> {
        let mut out = Vec::new();
        for part in &self.parts {
            match part {
                PromptPart::System(t) => out.push(Message::system(render(t, values)?)),
                PromptPart::User(t) => out.push(Message::user(render(t, values)?)),
                PromptPart::Assistant(t) => out.push(Message::assistant(render(t, values)?)),
                PromptPart::Placeholder(name) => {
                    let messages = values.messages.get(name).ok_or_else(|| {
                        Error::Template(format!("missing messages for placeholder '{}'", name))
                    })?;
                    out.extend(messages.iter().cloned());
                }
            }
        }
        Ok(out)
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Literal(String),
    Var(String),
}

fn parse_template(template: &str) -> Result<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                literal.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                literal.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                let name = name.trim().to_string();
                if !closed || name.is_empty() {
                    return Err(Error::Template(format!(
                        "unterminated or empty variable in '{}'",
                        template
                    )));
                }
                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Var(name));
            }
            '}' => {
                return Err(Error::Template(format!(
                    "unmatched '}}' in '{}'",
                    template
                )));
            }
            other => literal.push(other),
        }
    }
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn render(template: &str, values: &PromptValues) -> Result<String> {
    let mut out = String::new();
    for segment in parse_template(template)? {
        match segment {
            Segment::Literal(s) => out.push_str(&s),
            Segment::Var(name) => {
                let value = values
                    .variables
                    .get(&name)
                    .ok_or_else(|| Error::Template(format!("missing variable '{}'", name)))?;
                out.push_str(value);
            }
        }
    }
    Ok(out)
}
