//! Workspace-level integration tests for the video edit MCP server.
//!
//! These tests verify:
//! - The server starts and advertises its tools
//! - Tool registration and schema generation
//! - Property-based tests for input validation and the result envelope

pub mod input_validation;
pub mod output_format;
pub mod server_startup;
pub mod tool_schema;
