//! Tool schema validity tests.
//!
//! Every advertised tool SHALL carry an object JSON schema that lists its
//! required parameters with their types.

use serde_json::Value;

/// Validates that a JSON schema has the required structure.
pub fn validate_json_schema(schema: &Value) -> Result<(), String> {
    let obj = schema
        .as_object()
        .ok_or_else(|| "Schema must be an object".to_string())?;

    match obj.get("type") {
        Some(type_val) if type_val == "object" => {}
        other => return Err(format!("Expected type 'object', got {:?}", other)),
    }

    if let Some(properties) = obj.get("properties") {
        if !properties.is_object() {
            return Err("Properties must be an object".to_string());
        }
    }

    if let Some(required) = obj.get("required") {
        let required = required
            .as_array()
            .ok_or_else(|| "Required must be an array".to_string())?;
        let properties = obj.get("properties").and_then(Value::as_object);
        for name in required {
            let name = name.as_str().ok_or_else(|| "Required entries must be strings".to_string())?;
            if !properties.is_some_and(|p| p.contains_key(name)) {
                return Err(format!("Required parameter '{}' has no property", name));
            }
        }
    }

    Ok(())
}

/// Validates that a tool has required fields.
pub fn validate_tool(tool: &rmcp::model::Tool) -> Result<(), String> {
    if tool.name.is_empty() {
        return Err("Tool name cannot be empty".to_string());
    }

    match tool.description.as_deref() {
        Some(description) if !description.is_empty() => {}
        _ => return Err(format!("Tool '{}' must have a description", tool.name)),
    }

    let schema_value = serde_json::to_value(&*tool.input_schema)
        .map_err(|e| format!("Failed to serialize schema: {}", e))?;
    validate_json_schema(&schema_value).map_err(|e| format!("Tool '{}': {}", tool.name, e))
}

/// Names listed as required in a tool's schema.
pub fn required_params(tool: &rmcp::model::Tool) -> Vec<String> {
    tool.input_schema
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(|n| n.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_edit_mcp::server::tools;

    fn tool(name: &str) -> rmcp::model::Tool {
        tools()
            .into_iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("tool {} not advertised", name))
    }

    #[test]
    fn test_json_schema_validation() {
        let valid_schema = serde_json::json!({
            "type": "object",
            "properties": { "video_path": { "type": "string" } },
            "required": ["video_path"]
        });
        assert!(validate_json_schema(&valid_schema).is_ok());

        let wrong_type = serde_json::json!({ "type": "string" });
        assert!(validate_json_schema(&wrong_type).is_err());

        let dangling = serde_json::json!({
            "type": "object",
            "properties": {},
            "required": ["video_path"]
        });
        assert!(validate_json_schema(&dangling).is_err());
    }

    #[test]
    fn test_all_tools_valid() {
        for tool in tools() {
            if let Err(e) = validate_tool(&tool) {
                panic!("{}", e);
            }
        }
    }

    #[test]
    fn test_reference_inputs_are_required_strings() {
        for (name, param) in [
            ("trim_video", "video_path"),
            ("add_audio", "audio_path"),
            ("extract_audio", "video_path"),
            ("adjust_vol", "audio_path"),
            ("add_video_overlay", "overlay_video_path"),
        ] {
            let tool = tool(name);
            assert!(
                required_params(&tool).contains(&param.to_string()),
                "{} should require {}",
                name,
                param
            );
            assert_eq!(
                tool.input_schema["properties"][param]["type"],
                serde_json::json!("string")
            );
        }
    }

    #[test]
    fn test_defaulted_params_are_optional() {
        let merge = required_params(&tool("merge_videos"));
        assert!(merge.contains(&"video_paths".to_string()));
        assert!(!merge.contains(&"transition_duration".to_string()));
        assert!(!merge.contains(&"return_path".to_string()));
        assert!(!merge.contains(&"audios_folder".to_string()));

        let image = required_params(&tool("image_to_video"));
        assert_eq!(image, vec!["image_path".to_string(), "output_path".to_string()]);

        assert!(required_params(&tool("check_memory")).is_empty());
        assert!(required_params(&tool("get_download_paths")).is_empty());
    }

    #[test]
    fn test_size_is_pair_of_integers() {
        let schema = &tool("resize_video").input_schema;
        let size = &schema["properties"]["size"];
        assert_eq!(size["type"], serde_json::json!("array"));
        assert_eq!(size["minItems"], serde_json::json!(2));
        assert_eq!(size["maxItems"], serde_json::json!(2));
    }
}
