//! Output format tests.
//!
//! Every tool answer SHALL be exactly one JSON text content. Successful
//! answers carry `success: true` and a `message`; failures carry
//! `success: false`, `error`, `error_type`, `message` and the MCP error flag.

use rmcp::model::{CallToolResult, RawContent};
use serde_json::Value;

/// Known `error_type` values.
pub const ERROR_TYPES: &[&str] = &[
    "ConfigError",
    "DecodeError",
    "ValidationError",
    "IoError",
    "FfmpegError",
    "ImageError",
    "DownloadError",
];

/// Validates a tool result and returns its parsed envelope.
pub fn validate_tool_result(result: &CallToolResult) -> Result<Value, String> {
    if result.content.len() != 1 {
        return Err(format!("Expected one content item, got {}", result.content.len()));
    }
    let text = match &result.content[0].raw {
        RawContent::Text(text) => &text.text,
        _ => return Err("Content must be text".to_string()),
    };
    let envelope: Value =
        serde_json::from_str(text).map_err(|e| format!("Content is not JSON: {}", e))?;
    validate_envelope(&envelope, result.is_error.unwrap_or(false))?;
    Ok(envelope)
}

/// Validates the envelope fields against the MCP error flag.
pub fn validate_envelope(envelope: &Value, is_error: bool) -> Result<(), String> {
    let obj = envelope
        .as_object()
        .ok_or_else(|| "Envelope must be an object".to_string())?;
    let success = obj
        .get("success")
        .and_then(Value::as_bool)
        .ok_or_else(|| "Envelope needs a boolean 'success'".to_string())?;

    if success == is_error {
        return Err(format!("success={} disagrees with is_error={}", success, is_error));
    }
    if !obj.get("message").is_some_and(Value::is_string) {
        return Err("Envelope needs a string 'message'".to_string());
    }
    if !success {
        if !obj.get("error").is_some_and(Value::is_string) {
            return Err("Failure needs a string 'error'".to_string());
        }
        let kind = obj.get("error_type").and_then(Value::as_str).unwrap_or_default();
        if !ERROR_TYPES.contains(&kind) {
            return Err(format!("Unknown error_type '{}'", kind));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_startup::test_config;
    use proptest::prelude::*;
    use serde_json::{json, Map};
    use video_edit_mcp::VideoEditServer;

    fn run(server: &VideoEditServer, tool: &str, arguments: Value) -> CallToolResult {
        let arguments: Option<Map<String, Value>> = match arguments {
            Value::Object(map) => Some(map),
            _ => None,
        };
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime")
            .block_on(server.dispatch(tool, arguments))
            .expect("tool call")
    }

    #[test]
    fn test_envelope_validation() {
        assert!(validate_envelope(&json!({ "success": true, "message": "ok" }), false).is_ok());
        assert!(validate_envelope(&json!({ "success": true, "message": "ok" }), true).is_err());
        assert!(validate_envelope(&json!({ "success": false, "message": "bad" }), true).is_err());
        assert!(
            validate_envelope(
                &json!({ "success": false, "error": "x", "error_type": "Nope", "message": "bad" }),
                true
            )
            .is_err()
        );
        assert!(
            validate_envelope(
                &json!({ "success": false, "error": "x", "error_type": "IoError", "message": "bad" }),
                true
            )
            .is_ok()
        );
    }

    #[test]
    fn test_utility_answers_are_well_formed() {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));

        for (tool, args) in [
            ("check_memory", json!({})),
            ("check_memory", json!({ "store_type": "audio" })),
            ("clear_memory", json!({ "clear_videos": false, "clear_audios": true })),
            ("get_download_paths", json!({})),
            ("list_files", json!({ "directory_path": dir.path().display().to_string() })),
        ] {
            let result = run(&server, tool, args);
            let envelope = validate_tool_result(&result).unwrap_or_else(|e| panic!("{}: {}", tool, e));
            assert_eq!(envelope["success"], json!(true), "{}", tool);
        }
    }

    #[test]
    fn test_info_tools_nest_their_report() {
        let dir = tempfile::tempdir().unwrap();
        let png = dir.path().join("pixel.png");
        image::RgbaImage::new(1, 1).save(&png).unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));

        let result = run(
            &server,
            "get_image_info",
            json!({ "image_path": png.display().to_string() }),
        );
        let envelope = validate_tool_result(&result).unwrap();
        assert_eq!(envelope["image_info"]["width"], json!(1));
        assert_eq!(envelope["image_info"]["height"], json!(1));
        assert_eq!(envelope["image_info"]["format"], json!("PNG"));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn missing_directories_fail_cleanly(name in "[a-z]{1,12}") {
            let dir = tempfile::tempdir().unwrap();
            let server = VideoEditServer::new(test_config(dir.path()));
            let missing = dir.path().join(&name).join("inner");

            let result = run(
                &server,
                "list_files",
                json!({ "directory_path": missing.display().to_string() }),
            );
            let envelope = validate_tool_result(&result).map_err(TestCaseError::fail)?;
            prop_assert_eq!(&envelope["error_type"], &json!("ValidationError"));
        }

        #[test]
        fn created_directories_are_listed(names in prop::collection::btree_set("[a-z]{1,8}", 1..5)) {
            let dir = tempfile::tempdir().unwrap();
            let server = VideoEditServer::new(test_config(dir.path()));
            let parent = dir.path().join("made");

            for name in &names {
                let result = run(
                    &server,
                    "make_directory",
                    json!({ "directory_path": parent.join(name).display().to_string() }),
                );
                validate_tool_result(&result).map_err(TestCaseError::fail)?;
            }

            let result = run(
                &server,
                "list_files",
                json!({ "directory_path": parent.display().to_string() }),
            );
            let envelope = validate_tool_result(&result).map_err(TestCaseError::fail)?;
            let expected: Vec<Value> = names.iter().map(|n| json!(n)).collect();
            prop_assert_eq!(&envelope["files"], &Value::Array(expected));
        }
    }
}
