use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::ConnectionId;

/// Messages sent by hosts and viewers
///
/// Wire shape is `{"type": "<kebab-case>", "data": {...}}`. SDP descriptions
/// and ICE candidates are opaque and relayed untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    HostStream {
        stream_id: String,
        #[serde(default)]
        private_key: Option<String>,
    },
    JoinStream {
        stream_id: String,
        #[serde(default)]
        is_external_id: bool,
    },
    /// Host to one viewer
    StreamOffer {
        #[serde(default)]
        stream_id: Option<String>,
        description: Value,
        viewer_id: ConnectionId,
    },
    /// Viewer back to the host
    StreamAnswer {
        host_id: ConnectionId,
        description: Value,
    },
    IceCandidate {
        #[serde(alias = "from")]
        target_id: ConnectionId,
        candidate: Value,
    },
    ChatMessage {
        stream_id: String,
        message: String,
    },
    EndStream {
        stream_id: String,
    },
    LeaveStream {
        stream_id: String,
    },
}

/// Messages pushed to connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    ViewerJoined {
        viewer_id: ConnectionId,
    },
    ViewerLeft {
        viewer_id: ConnectionId,
    },
    ViewerCount {
        count: usize,
    },
    StreamOffer {
        host_id: ConnectionId,
        description: Value,
    },
    StreamAnswer {
        viewer_id: ConnectionId,
        description: Value,
    },
    IceCandidate {
        from: ConnectionId,
        candidate: Value,
    },
    ChatMessage {
        stream_id: String,
        sender_id: ConnectionId,
        message: String,
        /// Assigned by the server when the message is relayed
        timestamp: DateTime<Utc>,
    },
    StreamEnded {},
    StreamNotFound {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        stream_id: Option<String>,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_join_stream() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "join-stream",
            "data": { "streamId": "abc", "isExternalId": true }
        }))
        .unwrap();

        assert_eq!(
            msg,
            ClientMessage::JoinStream {
                stream_id: "abc".to_string(),
                is_external_id: true,
            }
        );
    }

    #[test]
    fn test_join_stream_external_flag_defaults_off() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join-stream","data":{"streamId":"abc"}}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinStream { is_external_id: false, .. }));
    }

    #[test]
    fn test_ice_candidate_accepts_from_alias() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "ice-candidate",
            "data": { "from": "peer-1", "candidate": { "candidate": "candidate:0 1 UDP" } }
        }))
        .unwrap();

        let ClientMessage::IceCandidate { target_id, .. } = msg else {
            panic!("expected ice-candidate");
        };
        assert_eq!(target_id, ConnectionId::from("peer-1"));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let parsed = serde_json::from_str::<ClientMessage>(r#"{"type":"self-destruct","data":{}}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_server_messages_wire_shape() {
        let count = serde_json::to_value(ServerMessage::ViewerCount { count: 2 }).unwrap();
        assert_eq!(count, json!({ "type": "viewer-count", "data": { "count": 2 } }));

        let ended = serde_json::to_value(ServerMessage::StreamEnded {}).unwrap();
        assert_eq!(ended, json!({ "type": "stream-ended", "data": {} }));

        let not_found = serde_json::to_value(ServerMessage::StreamNotFound { stream_id: None }).unwrap();
        assert_eq!(not_found, json!({ "type": "stream-not-found", "data": {} }));

        let joined = serde_json::to_value(ServerMessage::ViewerJoined {
            viewer_id: ConnectionId::from("v1"),
        })
        .unwrap();
        assert_eq!(joined, json!({ "type": "viewer-joined", "data": { "viewerId": "v1" } }));
    }

    #[test]
    fn test_description_is_relayed_untouched() {
        let description = json!({ "type": "offer", "sdp": "v=0\r\no=- 1 1 IN IP4 0.0.0.0\r\n" });
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "stream-offer",
            "data": { "viewerId": "v1", "description": description.clone() }
        }))
        .unwrap();

        let ClientMessage::StreamOffer { description: parsed, stream_id, .. } = msg else {
            panic!("expected stream-offer");
        };
        assert_eq!(parsed, description);
        assert!(stream_id.is_none());
    }
}
