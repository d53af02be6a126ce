//! Unit tests for server builder utilities.

use super::server::{ServerError, shutdown_channel};

#[test]
fn test_server_error_bind_failed_display() {
    let err = ServerError::BindFailed {
        addr: "0.0.0.0:9000".to_string(),
        message: "Address already in use".to_string(),
    };
    let msg = err.to_string();
    assert!(msg.contains("0.0.0.0:9000"), "Should contain bind address");
    assert!(
        msg.contains("Address already in use"),
        "Should contain error message"
    );
}

#[test]
fn test_server_error_transport_display() {
    let err = ServerError::Transport("Connection reset".to_string());
    assert!(err.to_string().contains("Connection reset"));
}

#[test]
fn test_server_error_io_conversion() {
    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
    let err: ServerError = io_err.into();
    assert!(matches!(err, ServerError::Io(_)));
}

#[tokio::test]
async fn test_shutdown_channel_async() {
    let (tx, rx) = shutdown_channel();

    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let _ = tx.send(());
    });

    let result = rx.await;
    assert!(result.is_ok(), "Should receive shutdown signal");
}

#[tokio::test]
async fn test_dropped_sender_also_resolves_receiver() {
    let (tx, rx) = shutdown_channel();
    drop(tx);
    assert!(rx.await.is_err(), "Dropped sender should wake the receiver");
}
