//! Video Edit MCP Common Library
//!
//! Shared configuration, error handling, transport selection, server
//! bootstrapping and tracing for the video edit MCP server.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod server;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod server_test;

pub use config::Config;
pub use error::{ConfigError, Error, Result};
pub use server::{McpServerBuilder, ServerError, shutdown_channel};
pub use transport::{Transport, TransportArgs, TransportMode};
