//! Tracing initialization for the video edit MCP server.
//!
//! # Usage
//!
//! ```no_run
//! use video_edit_mcp_common::tracing::init_tracing;
//!
//! init_tracing();
//! tracing::info!("Application started");
//! ```
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Controls the log level and filtering. Examples:
//!   - `RUST_LOG=debug` - Enable debug logging for all modules
//!   - `RUST_LOG=video_edit_mcp=debug` - Enable debug for the server crate
//!   - `RUST_LOG=warn,video_edit_mcp::store=trace` - Warn by default, trace the handle stores
//!
//! Logs are written to stderr so the stdio transport keeps stdout for MCP frames.

use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    prelude::*,
};

/// Initialize the tracing subscriber, defaulting to `info` when `RUST_LOG` is unset.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_tracing() {
    init_tracing_with_default("info");
}

/// Initialize tracing with a custom default level.
///
/// # Panics
///
/// Panics if a global subscriber is already set.
pub fn init_tracing_with_default(default_level: &str) {
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(fmt_layer())
        .init();
}

/// Try to initialize tracing, returning an error if already initialized.
///
/// Useful in tests, where several cases may race to install the subscriber.
pub fn try_init_tracing() -> Result<(), ()> {
    tracing_subscriber::registry()
        .with(env_filter("info"))
        .with(fmt_layer())
        .try_init()
        .map_err(|_| ())
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn fmt_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_tracing_does_not_panic() {
        // May succeed or fail depending on test order, but never panics
        let _ = try_init_tracing();
        let _ = try_init_tracing();
    }

    #[test]
    fn test_env_filter_parses_module_specific() {
        let filter = EnvFilter::new("warn,video_edit_mcp::store=trace");
        drop(filter);
    }
}
