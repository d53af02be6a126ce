//! MCP Transport configuration.
//!
//! Two transport modes are supported:
//!
//! - **HTTP**: Streamable HTTP transport served at `/mcp` (default)
//! - **Stdio**: local subprocess communication
//!
//! # Example
//!
//! ```ignore
//! use video_edit_mcp_common::transport::{Transport, TransportArgs};
//! use clap::Parser;
//!
//! #[derive(Parser)]
//! struct Args {
//!     #[command(flatten)]
//!     transport: TransportArgs,
//! }
//!
//! let args = Args::parse();
//! let transport = args.transport.into_transport();
//! ```

use clap::Args;
use std::fmt;

/// Default bind host for the HTTP transport.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default port for the HTTP transport.
pub const DEFAULT_PORT: u16 = 9000;

/// Transport mode for MCP server communication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transport {
    /// Standard input/output transport.
    /// Communicates through stdin/stdout, similar to LSP servers.
    Stdio,
    /// HTTP streamable transport.
    Http {
        /// Address to bind
        host: String,
        /// Port to listen on
        port: u16,
    },
}

impl Default for Transport {
    fn default() -> Self {
        Transport::http(DEFAULT_HOST, DEFAULT_PORT)
    }
}

impl Transport {
    /// Create a new stdio transport.
    pub fn stdio() -> Self {
        Transport::Stdio
    }

    /// Create a new HTTP transport bound to `host:port`.
    pub fn http(host: impl Into<String>, port: u16) -> Self {
        Transport::Http {
            host: host.into(),
            port,
        }
    }

    /// Check if this is a stdio transport.
    pub fn is_stdio(&self) -> bool {
        matches!(self, Transport::Stdio)
    }

    /// Check if this is an HTTP transport.
    pub fn is_http(&self) -> bool {
        matches!(self, Transport::Http { .. })
    }

    /// Get the port if this is a network transport.
    pub fn port(&self) -> Option<u16> {
        match self {
            Transport::Stdio => None,
            Transport::Http { port, .. } => Some(*port),
        }
    }

    /// Get the `host:port` bind address if this is a network transport.
    pub fn bind_addr(&self) -> Option<String> {
        match self {
            Transport::Stdio => None,
            Transport::Http { host, port } => Some(format!("{}:{}", host, port)),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Stdio => write!(f, "stdio"),
            Transport::Http { host, port } => write!(f, "http ({}:{})", host, port),
        }
    }
}

/// Command-line arguments for transport configuration.
#[derive(Args, Debug, Clone)]
pub struct TransportArgs {
    /// Transport mode: http or stdio
    #[arg(long, default_value = "http", value_parser = parse_transport_mode)]
    pub transport: TransportMode,

    /// Host to bind for HTTP transport
    #[arg(long, env = "HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port for HTTP transport
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Transport mode parsed from command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportMode {
    #[default]
    Http,
    Stdio,
}

pub(crate) fn parse_transport_mode(s: &str) -> Result<TransportMode, String> {
    match s.to_lowercase().as_str() {
        "http" | "streamable-http" => Ok(TransportMode::Http),
        "stdio" => Ok(TransportMode::Stdio),
        _ => Err(format!(
            "Invalid transport mode '{}'. Valid options: http, stdio",
            s
        )),
    }
}

impl TransportArgs {
    /// Convert command-line arguments into a Transport configuration.
    pub fn into_transport(self) -> Transport {
        match self.transport {
            TransportMode::Stdio => Transport::Stdio,
            TransportMode::Http => Transport::Http {
                host: self.host,
                port: self.port,
            },
        }
    }
}

impl Default for TransportArgs {
    fn default() -> Self {
        Self {
            transport: TransportMode::Http,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

