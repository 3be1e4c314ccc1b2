//! MCP surface: stdio server plus the SOP tool handlers.
pub mod server;
pub mod tools;

pub use server::{McpContext, McpServer};
