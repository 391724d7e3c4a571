//! Tool collaborators for the dispatch loop.

pub mod base;
pub mod command;
pub mod registry;

pub use base::{LocalTool, ToolServer};
pub use command::CommandToolServer;
pub use registry::ToolRegistry;
