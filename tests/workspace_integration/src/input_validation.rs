//! Input parameter validation tests.
//!
//! For any tool invocation with out-of-range parameters, the server SHALL
//! answer with a `ValidationError` envelope before any media is decoded, and
//! for malformed arguments it SHALL return an MCP `invalid_params` error.

use serde_json::{Map, Value};
use video_edit_mcp::VideoEditServer;

/// Call a tool on a fresh runtime and return the parsed envelope.
pub fn envelope_of(server: &VideoEditServer, tool: &str, arguments: Value) -> Value {
    let arguments: Map<String, Value> = match arguments {
        Value::Object(map) => map,
        other => panic!("arguments must be an object, got {}", other),
    };
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let result = runtime
        .block_on(server.dispatch(tool, Some(arguments)))
        .unwrap_or_else(|e| panic!("{} rejected: {:?}", tool, e));
    let text = &result.content[0].as_text().expect("text content").text;
    serde_json::from_str(text).expect("JSON envelope")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server_startup::test_config;
    use proptest::prelude::*;
    use serde_json::json;

    /// Path that would fail to decode if validation let the call through.
    const MISSING: &str = "/nonexistent/input.mp4";

    fn server() -> (tempfile::TempDir, VideoEditServer) {
        let dir = tempfile::tempdir().unwrap();
        let server = VideoEditServer::new(test_config(dir.path()));
        (dir, server)
    }

    fn assert_validation(body: &Value) {
        assert_eq!(body["success"], json!(false), "{}", body);
        assert_eq!(body["error_type"], json!("ValidationError"), "{}", body);
    }

    fn non_positive() -> impl Strategy<Value = f64> {
        prop_oneof![Just(0.0), -1000.0f64..0.0]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn non_positive_speed_rejected(speed in non_positive()) {
            let (_dir, server) = server();
            let body = envelope_of(&server, "speed_up_video", json!({
                "video_path": MISSING,
                "speed": speed,
                "output_name": "fast.mp4",
                "return_path": true
            }));
            assert_validation(&body);
        }

        #[test]
        fn non_positive_fade_rejected(fade in non_positive(), tool in prop_oneof![
            Just("fadein_video"), Just("fadeout_video")
        ]) {
            let (_dir, server) = server();
            let body = envelope_of(&server, tool, json!({
                "video_path": MISSING,
                "fade_duration": fade,
                "output_name": "faded.mp4",
                "return_path": true
            }));
            assert_validation(&body);
        }

        #[test]
        fn non_positive_audio_fade_rejected(fade in non_positive()) {
            let (_dir, server) = server();
            let body = envelope_of(&server, "fadein_audio", json!({
                "audio_path": MISSING,
                "fade_duration": fade,
                "output_name": "faded.wav",
                "return_path": true
            }));
            assert_validation(&body);
        }

        #[test]
        fn out_of_range_opacity_rejected(opacity in prop_oneof![-10.0f64..-0.001, 1.001f64..10.0]) {
            let (_dir, server) = server();
            let body = envelope_of(&server, "add_video_overlay", json!({
                "base_video_path": MISSING,
                "overlay_video_path": MISSING,
                "x": 0,
                "y": 0,
                "opacity": opacity,
                "duration": 1.0,
                "output_name": "overlay.mp4",
                "return_path": true
            }));
            assert_validation(&body);
        }

        #[test]
        fn image_to_video_rejects_bad_timing(duration in non_positive(), fps in 1.0f64..60.0) {
            let (_dir, server) = server();
            let body = envelope_of(&server, "image_to_video", json!({
                "image_path": "/nonexistent/still.png",
                "output_path": "still.mp4",
                "duration": duration,
                "fps": fps
            }));
            assert_validation(&body);
        }

        #[test]
        fn blank_text_rejected(text in "[ \t]{0,8}") {
            let (_dir, server) = server();
            let body = envelope_of(&server, "add_text_overlay", json!({
                "video_path": MISSING,
                "text": text,
                "x": 10,
                "y": 10,
                "font_size": 24,
                "color": "white",
                "duration": 1.0,
                "output_name": "text.mp4",
                "return_path": true
            }));
            assert_validation(&body);
        }
    }

    #[test]
    fn test_empty_inputs_rejected() {
        let (_dir, server) = server();

        let merge = envelope_of(&server, "merge_videos", json!({
            "video_paths": [],
            "output_path": "merged.mp4"
        }));
        assert_validation(&merge);

        let mix = envelope_of(&server, "mix_audio_tracks", json!({
            "audio_paths": [],
            "output_name": "mix.wav",
            "return_path": true
        }));
        assert_validation(&mix);

        let dir = envelope_of(&server, "make_directory", json!({ "directory_path": "  " }));
        assert_validation(&dir);
    }

    #[test]
    fn test_unresolvable_input_is_decode_error() {
        let (_dir, server) = server();
        let body = envelope_of(&server, "trim_video", json!({
            "video_path": MISSING,
            "start_time": 0.0,
            "end_time": 1.0,
            "output_name": "trimmed.mp4",
            "return_path": true
        }));
        assert_eq!(body["success"], json!(false));
        assert_eq!(body["error_type"], json!("DecodeError"));
        assert!(body["error"].as_str().unwrap().contains(MISSING));
    }

    #[tokio::test]
    async fn test_wrong_argument_types_are_invalid_params() {
        let (_dir, server) = server();
        let mut args = Map::new();
        args.insert("video_path".to_string(), json!("clip.mp4"));
        args.insert("size".to_string(), json!("640x480"));
        args.insert("output_name".to_string(), json!("out.mp4"));
        args.insert("return_path".to_string(), json!(true));

        let err = server.dispatch("resize_video", Some(args)).await.unwrap_err();
        assert_eq!(err.code, rmcp::model::ErrorCode::INVALID_PARAMS);
        assert!(err.message.contains("Invalid parameters"));
    }
}
