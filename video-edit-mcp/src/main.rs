//! Video Edit MCP Server
//!
//! MCP server for video, audio and image editing using FFmpeg.
//!
//! # Usage
//!
//! ```bash
//! # Run with streamable HTTP transport on 0.0.0.0:9000 (default)
//! video-edit-mcp
//!
//! # Run with stdio transport
//! video-edit-mcp --transport stdio
//!
//! # Run with HTTP transport on another port
//! video-edit-mcp --transport http --port 8080
//! ```

use anyhow::Result;
use clap::Parser;
use video_edit_mcp::VideoEditServer;
use video_edit_mcp_common::tracing::init_tracing;
use video_edit_mcp_common::{Config, McpServerBuilder, TransportArgs};

#[derive(Parser, Debug)]
#[command(name = "video-edit-mcp")]
#[command(about = "MCP server for video, audio and image editing using FFmpeg")]
#[command(version)]
struct Args {
    #[command(flatten)]
    transport: TransportArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    // Parse command-line arguments
    let args = Args::parse();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!(
        output_dir = %config.output_dir.display(),
        scratch_dir = %config.scratch_dir.display(),
        "Starting video-edit-mcp server"
    );

    let server = VideoEditServer::new(config);
    let transport = args.transport.into_transport();

    let teardown = {
        let server = server.clone();
        async move { server.shutdown().await }
    };

    McpServerBuilder::new(server)
        .with_transport(transport)
        .with_teardown(teardown)
        .run()
        .await?;

    Ok(())
}
