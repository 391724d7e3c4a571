//! Confab core — the canonical conversation model, configuration, and
//! session persistence shared by the provider and agent crates.

pub mod config;
pub mod session;
pub mod types;
pub mod utils;

pub use types::{
    find_tool_call, Arguments, Engine, EngineOptions, Message, Model, ModelError, Role, Session,
    SessionConfig, Tool, ToolCall, ToolParameters, ToolProperty,
};
