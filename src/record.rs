//! Builds the JSON document sent to Logstash for one log line.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::container::Container;
use crate::metadata::ResolvedMetadata;

pub type LogRecord = Map<String, Value>;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("could not marshal JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The `docker` object of every record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DockerInfo {
    pub name: String,
    pub id: String,
    pub image: String,
    pub hostname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

impl DockerInfo {
    pub fn new(container: &Container, labels: Option<HashMap<String, String>>) -> Self {
        Self {
            name: container.name.clone(),
            id: container.id.clone(),
            image: container.image.clone(),
            hostname: container.hostname.clone(),
            labels,
        }
    }
}

/// Parses `line` as a JSON object when decoding is enabled, otherwise (or
/// when it is not an object) wraps the raw line as `message`.
fn base_record(line: &str, decode_json: bool) -> LogRecord {
    if decode_json {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(line) {
            return map;
        }
    }
    let mut record = Map::new();
    record.insert("message".to_string(), Value::String(line.to_string()));
    record
}

pub fn build_record(
    line: &str,
    metadata: &ResolvedMetadata,
    docker: &DockerInfo,
    source: &str,
) -> Result<LogRecord, RecordError> {
    let mut record = base_record(line, metadata.decode_json);

    for (key, value) in metadata.fields.iter() {
        record.insert(key.clone(), Value::String(value.clone()));
    }

    // Reserved keys always reflect the container, whatever the line or the
    // fields said.
    record.insert("docker".to_string(), serde_json::to_value(docker)?);
    record.insert("stream".to_string(), Value::String(source.to_string()));
    record.insert(
        "tags".to_string(),
        Value::Array(
            metadata
                .tags
                .iter()
                .map(|tag| Value::String(tag.clone()))
                .collect(),
        ),
    );

    Ok(record)
}

/// Compact JSON followed by `\n`, as expected by the `json_lines` codec.
pub fn encode_record(record: &LogRecord) -> Result<Vec<u8>, RecordError> {
    let mut bytes = serde_json::to_vec(record)?;
    bytes.push(b'\n');
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    const JSON_LINE: &str = r#"{ "remote_user": "-", "body_bytes_sent": "25", "request_time": "0.821", "status": "200", "request_method": "POST", "http_referrer": "-", "http_user_agent": "-" }"#;

    fn docker_info() -> DockerInfo {
        DockerInfo {
            name: "name".to_string(),
            id: "ID".to_string(),
            image: "image".to_string(),
            hostname: "hostname".to_string(),
            labels: None,
        }
    }

    fn metadata(tags: &[&str], fields: &[(&str, &str)], decode_json: bool) -> ResolvedMetadata {
        ResolvedMetadata {
            tags: tags.iter().map(|t| t.to_string()).collect::<Vec<_>>().into(),
            fields: Arc::new(
                fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
            decode_json,
        }
    }

    #[test]
    fn test_plain_line_is_wrapped() {
        let record = build_record(
            "foo bananas",
            &metadata(&[], &[], true),
            &docker_info(),
            "stdout",
        )
        .expect("Failed to build record");

        assert_eq!(record["message"], json!("foo bananas"));
        assert_eq!(record["tags"], json!([]));
        assert_eq!(record["stream"], json!("stdout"));
        assert_eq!(
            record["docker"],
            json!({"name": "name", "id": "ID", "image": "image", "hostname": "hostname"})
        );
    }

    #[test]
    fn test_json_null_is_wrapped_verbatim() {
        let record = build_record(
            "null",
            &metadata(&["example", "tags"], &[], true),
            &docker_info(),
            "stdout",
        )
        .expect("Failed to build record");

        assert_eq!(record["message"], json!("null"));
        assert_eq!(record["tags"], json!(["example", "tags"]));
    }

    #[test]
    fn test_non_object_json_is_wrapped_verbatim() {
        for line in ["[1, 2]", "42", "\"quoted\""] {
            let record = build_record(line, &metadata(&[], &[], true), &docker_info(), "stdout")
                .expect("Failed to build record");
            assert_eq!(record["message"], json!(line));
        }
    }

    #[test]
    fn test_json_object_is_hoisted() {
        let record = build_record(JSON_LINE, &metadata(&[], &[], true), &docker_info(), "stdout")
            .expect("Failed to build record");

        assert!(!record.contains_key("message"));
        assert_eq!(record["remote_user"], json!("-"));
        assert_eq!(record["body_bytes_sent"], json!("25"));
        assert_eq!(record["request_method"], json!("POST"));
    }

    #[test]
    fn test_decode_disabled_keeps_raw_line() {
        let record = build_record(JSON_LINE, &metadata(&[], &[], false), &docker_info(), "stdout")
            .expect("Failed to build record");

        assert_eq!(record["message"], json!(JSON_LINE));
        assert!(!record.contains_key("remote_user"));
    }

    #[test]
    fn test_fields_override_decoded_values() {
        let record = build_record(
            r#"{"status": "200", "myfield": "from-line"}"#,
            &metadata(&[], &[("myfield", "something"), ("anotherfield", "something_else")], true),
            &docker_info(),
            "stdout",
        )
        .expect("Failed to build record");

        assert_eq!(record["status"], json!("200"));
        assert_eq!(record["myfield"], json!("something"));
        assert_eq!(record["anotherfield"], json!("something_else"));
    }

    #[test]
    fn test_reserved_keys_cannot_be_overridden() {
        let record = build_record(
            r#"{"stream": "fake", "tags": ["fake"], "docker": "fake"}"#,
            &metadata(
                &["nicetag", "righttag"],
                &[("tags", "nastytag"), ("docker", "cheating"), ("stream", "nope")],
                true,
            ),
            &docker_info(),
            "stderr",
        )
        .expect("Failed to build record");

        assert_eq!(record["tags"], json!(["nicetag", "righttag"]));
        assert_eq!(record["stream"], json!("stderr"));
        assert_eq!(record["docker"]["name"], json!("name"));
    }

    #[test]
    fn test_labels_are_serialized_when_present() {
        let docker = DockerInfo {
            labels: Some(HashMap::from([("app".to_string(), "web".to_string())])),
            ..docker_info()
        };
        let record = build_record("x", &metadata(&[], &[], true), &docker, "stdout")
            .expect("Failed to build record");

        assert_eq!(record["docker"]["labels"], json!({"app": "web"}));
    }

    #[test]
    fn test_encode_appends_single_newline() {
        let record = build_record("foo", &metadata(&[], &[], true), &docker_info(), "stdout")
            .expect("Failed to build record");
        let bytes = encode_record(&record).expect("Failed to encode record");

        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);

        let decoded: Value = serde_json::from_slice(&bytes).expect("Invalid JSON");
        assert_eq!(decoded["message"], json!("foo"));
    }
}
