use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound WebSocket events from client to server
///
/// Request/response commands (send, edit, membership, ...) go over the REST
/// surface; the socket carries only the high-frequency session signals.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WsInboundEvent {
    /// Typing indicator on/off. The server applies the 3-second TTL; clients
    /// may refresh while the user keeps typing.
    #[serde(rename = "typing")]
    Typing {
        conversation_id: Uuid,
        is_typing: bool,
    },

    /// Delivery acknowledgement: everything up to `up_to_seq` has reached
    /// this client.
    #[serde(rename = "ack")]
    Ack {
        conversation_id: Uuid,
        up_to_seq: i64,
    },

    /// Read acknowledgement: the user has read up to `up_to_seq`. Implies
    /// delivery of the same range.
    #[serde(rename = "read")]
    Read {
        conversation_id: Uuid,
        up_to_seq: i64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_event_parsing() {
        let conv = Uuid::new_v4();
        let raw = format!(
            r#"{{"type":"typing","conversation_id":"{}","is_typing":true}}"#,
            conv
        );
        match serde_json::from_str::<WsInboundEvent>(&raw).unwrap() {
            WsInboundEvent::Typing {
                conversation_id,
                is_typing,
            } => {
                assert_eq!(conversation_id, conv);
                assert!(is_typing);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let raw = format!(
            r#"{{"type":"read","conversation_id":"{}","up_to_seq":12}}"#,
            conv
        );
        assert!(matches!(
            serde_json::from_str::<WsInboundEvent>(&raw).unwrap(),
            WsInboundEvent::Read { up_to_seq: 12, .. }
        ));
    }
}
