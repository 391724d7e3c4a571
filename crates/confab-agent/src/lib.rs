//! Confab Agent — the dispatch loop and its tool collaborators.
//!
//! This crate contains:
//! - **dispatch**: the model ↔ tool loop over one session's history
//! - **tools**: the `ToolServer` seam, an in-process tool registry, and a
//!   command-backed tool server

pub mod dispatch;
pub mod tools;

pub use confab_core::config::ToolCallPolicy;
pub use dispatch::{DispatchConfig, DispatchError, Dispatcher};
pub use tools::{CommandToolServer, LocalTool, ToolRegistry, ToolServer};
