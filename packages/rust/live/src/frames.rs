//! Frames exchanged with the browser over `/ws/audio`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use threadline_shared::Node;

/// Server → client frames, tagged with `type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Full graph snapshot after a segment was folded in.
    ExistingJson { data: Vec<Node> },
    /// Chunk id → text map, updated alongside every graph push.
    ChunkDict { data: HashMap<String, String> },
    /// Final flush completed; the client may close the socket.
    FlushAck,
    /// Non-fatal processing error; the session keeps running.
    Error { detail: String },
}

/// Client → server control frames. Audio arrives as binary, so the only text
/// frame is the flush request.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientControl {
    #[serde(default)]
    pub final_flush: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_serialize_with_wire_tags() {
        let frame = ServerFrame::ExistingJson {
            data: vec![Node::thread("intro")],
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "existing_json");
        assert_eq!(json["data"][0]["node_name"], "intro");

        let ack = serde_json::to_string(&ServerFrame::FlushAck).unwrap();
        assert_eq!(ack, r#"{"type":"flush_ack"}"#);

        let err = serde_json::to_string(&ServerFrame::Error {
            detail: "boom".into(),
        })
        .unwrap();
        assert_eq!(err, r#"{"type":"error","detail":"boom"}"#);
    }

    #[test]
    fn flush_control_parses() {
        let control: ClientControl = serde_json::from_str(r#"{"final_flush": true}"#).unwrap();
        assert!(control.final_flush);

        let other: ClientControl = serde_json::from_str(r#"{"something": 1}"#).unwrap();
        assert!(!other.final_flush);
    }
}
