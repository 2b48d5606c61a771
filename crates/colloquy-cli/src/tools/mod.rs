//! Built-in tools for the demos

mod datetime;
mod human;
mod search;

pub use datetime::DateTimeTool;
pub use human::HumanAssistanceTool;
pub use search::TavilySearchTool;
