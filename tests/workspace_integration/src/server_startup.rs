//! Server startup integration tests.
//!
//! Tests that the MCP server can be instantiated from a configuration and
//! provides correct server info without touching ffmpeg.

use video_edit_mcp_common::Config;

/// Test configuration rooted in a temporary directory.
pub fn test_config(root: &std::path::Path) -> Config {
    Config::with_root(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rmcp::ServerHandler;
    use video_edit_mcp::VideoEditServer;

    #[test]
    fn test_server_startup() {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));
        let info = server.get_info();

        let instructions = info.instructions.as_ref().unwrap().to_lowercase();
        assert!(instructions.contains("video"));
        assert!(instructions.contains("return_path"));
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_startup_creates_nothing_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let _server = VideoEditServer::new(test_config(dir.path()));

        assert!(!dir.path().join("output").exists());
        assert!(!dir.path().join("scratch").exists());
    }

    #[tokio::test]
    async fn test_server_starts_with_empty_stores() {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));
        let registry = &server.handler().registry;

        assert!(registry.videos.is_empty().await);
        assert!(registry.audios.is_empty().await);
    }

    #[tokio::test]
    async fn test_clones_share_stores() {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));
        let clone = server.clone();

        assert!(std::sync::Arc::ptr_eq(
            &server.handler().registry,
            &clone.handler().registry
        ));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));

        server.shutdown().await;
        server.shutdown().await;
        assert!(server.handler().registry.videos.is_empty().await);
    }
}
