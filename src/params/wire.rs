// Wire formats for the websocket parameter protocol.
//
// Scalar updates go out as one JSON text frame. Float arrays and binary
// values go out as a short text frame naming the parameter followed by a
// binary frame with the raw payload; the float-array header is NUL-padded
// to a 4 byte multiple so the payload lands aligned on the receiving side.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::json;

use crate::params::Value;

/// Frames making up one outbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Frames {
    Text(String),
    TextBinary { header: Vec<u8>, payload: Vec<u8> },
}

pub fn new_state(name: &str, value: &Value) -> Frames {
    match value {
        Value::Int32(v) => Frames::Text(scalar(name, json!(*v))),
        Value::Int64(v) => Frames::Text(scalar(name, json!(*v))),
        Value::Float(v) => Frames::Text(scalar(name, json!(*v))),
        Value::Bool(v) => Frames::Text(scalar(name, json!(*v as i32))),
        Value::Str(s) if s.starts_with('{') => {
            // Already a JSON document; embed it unquoted.
            Frames::Text(format!(
                "{{\"cmd\":\"newState\",\"data\":{{\"name\":{},\"value\":{}}}}}",
                json!(name),
                s
            ))
        }
        Value::Str(s) => Frames::Text(scalar(name, json!(s))),
        Value::FloatArray(floats) => {
            let mut payload = Vec::with_capacity(floats.len() * 4);
            for f in floats {
                payload.extend_from_slice(&f.to_le_bytes());
            }
            Frames::TextBinary {
                header: pad_to_alignment(binary_header(name)),
                payload,
            }
        }
        Value::Binary(bytes) => Frames::TextBinary {
            header: binary_header(name),
            payload: bytes.clone(),
        },
    }
}

pub fn subscribe_resp(name: &str, current: Option<&Value>) -> String {
    let rendered = match current {
        Some(Value::Int32(v)) => json!(*v).to_string(),
        Some(Value::Int64(v)) => json!(*v).to_string(),
        Some(Value::Float(v)) => json!(*v).to_string(),
        Some(Value::Bool(v)) => json!(*v as i32).to_string(),
        Some(Value::Str(s)) if s.starts_with('{') => s.clone(),
        Some(Value::Str(s)) => json!(s).to_string(),
        // One-shot acknowledgment is text-only: arrays inline, bytes base64.
        Some(Value::FloatArray(floats)) => json!(floats).to_string(),
        Some(Value::Binary(bytes)) => json!(BASE64.encode(bytes)).to_string(),
        None => "\"\"".to_string(),
    };
    format!(
        "{{\"cmd\":\"subscribeResp\",\"data\":{{\"name\":{},\"value\":{}}}}}",
        json!(name),
        rendered
    )
}

pub fn subscribe_error(name: &str) -> String {
    json!({"cmd": "subscribeResp", "data": {"name": name, "value": "error"}}).to_string()
}

pub fn unsubscribe_resp(name: &str) -> String {
    json!({"cmd": "unsubscribeResp", "data": name}).to_string()
}

fn scalar(name: &str, value: serde_json::Value) -> String {
    json!({"cmd": "newState", "data": {"name": name, "value": value}}).to_string()
}

fn binary_header(name: &str) -> Vec<u8> {
    format!("{{\"f\":{}}}", json!(name)).into_bytes()
}

/// NUL-terminate, then pad with NULs up to a 4 byte multiple.
fn pad_to_alignment(mut header: Vec<u8>) -> Vec<u8> {
    header.push(0);
    while header.len() % 4 != 0 {
        header.push(0);
    }
    header
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(frames: Frames) -> String {
        match frames {
            Frames::Text(s) => s,
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn scalars_serialize_per_type() {
        assert_eq!(
            text(new_state("speed", &Value::Int32(-7))),
            r#"{"cmd":"newState","data":{"name":"speed","value":-7}}"#
        );
        assert_eq!(
            text(new_state("uptime", &Value::Int64(1 << 40))),
            format!(
                r#"{{"cmd":"newState","data":{{"name":"uptime","value":{}}}}}"#,
                1_i64 << 40
            )
        );
        assert_eq!(
            text(new_state("armed", &Value::Bool(true))),
            r#"{"cmd":"newState","data":{"name":"armed","value":1}}"#
        );
        assert_eq!(
            text(new_state("temp", &Value::Float(23.5))),
            r#"{"cmd":"newState","data":{"name":"temp","value":23.5}}"#
        );
    }

    #[test]
    fn plain_strings_are_quoted() {
        assert_eq!(
            text(new_state("mode", &Value::Str("idle".into()))),
            r#"{"cmd":"newState","data":{"name":"mode","value":"idle"}}"#
        );
    }

    #[test]
    fn json_object_strings_embed_unquoted() {
        let json_value = r#"{"x":1,"y":2}"#;
        let frame = text(new_state("pos", &Value::Str(json_value.into())));
        assert_eq!(
            frame,
            r#"{"cmd":"newState","data":{"name":"pos","value":{"x":1,"y":2}}}"#
        );
        // The embedded document must leave the frame parseable.
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["data"]["value"]["y"], 2);
    }

    #[test]
    fn float_array_header_is_padded_to_four_bytes() {
        for name in ["s", "spectrum", "spectrum-with-long-name"] {
            let frames = new_state(name, &Value::FloatArray(vec![1.0, -2.0]));
            match frames {
                Frames::TextBinary { header, payload } => {
                    assert_eq!(header.len() % 4, 0, "{name}");
                    // Padding follows the JSON text, never replaces it.
                    let json_end = header.iter().position(|&b| b == 0).unwrap();
                    let parsed: serde_json::Value =
                        serde_json::from_slice(&header[..json_end]).unwrap();
                    assert_eq!(parsed["f"], name);
                    assert_eq!(payload.len(), 8);
                    assert_eq!(&payload[..4], &1.0_f32.to_le_bytes());
                }
                other => panic!("expected two-frame send, got {other:?}"),
            }
        }
    }

    #[test]
    fn binary_values_keep_caller_supplied_payload() {
        let frames = new_state("blob", &Value::Binary(vec![0xde, 0xad, 0xbe]));
        match frames {
            Frames::TextBinary { header, payload } => {
                assert_eq!(payload, vec![0xde, 0xad, 0xbe]);
                let parsed: serde_json::Value = serde_json::from_slice(&header).unwrap();
                assert_eq!(parsed["f"], "blob");
            }
            other => panic!("expected two-frame send, got {other:?}"),
        }
    }

    #[test]
    fn subscribe_resp_renders_current_value() {
        assert_eq!(
            subscribe_resp("speed", Some(&Value::Int32(11))),
            r#"{"cmd":"subscribeResp","data":{"name":"speed","value":11}}"#
        );
        assert_eq!(
            subscribe_resp("gains", Some(&Value::FloatArray(vec![0.5, 1.5]))),
            r#"{"cmd":"subscribeResp","data":{"name":"gains","value":[0.5,1.5]}}"#
        );
        assert_eq!(
            subscribe_resp("cert", Some(&Value::Binary(vec![1, 2, 3]))),
            r#"{"cmd":"subscribeResp","data":{"name":"cert","value":"AQID"}}"#
        );
        assert_eq!(
            subscribe_resp("ghost", None),
            r#"{"cmd":"subscribeResp","data":{"name":"ghost","value":""}}"#
        );
    }

    #[test]
    fn error_and_unsubscribe_acknowledgments() {
        assert_eq!(
            subscribe_error("nope"),
            r#"{"cmd":"subscribeResp","data":{"name":"nope","value":"error"}}"#
        );
        assert_eq!(
            unsubscribe_resp("speed"),
            r#"{"cmd":"unsubscribeResp","data":"speed"}"#
        );
    }
}
