//! Unified outbound event model
//!
//! Every state delta the core applies is pushed to connected clients as one
//! of these events, on the conversation channel for shared state and on user
//! channels for private state. Events are emitted strictly after the
//! conversation lock is released; within one conversation they leave in
//! commit order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::CHAT_METRICS;
use crate::models::{Attachment, MemberRole};
use crate::websocket::ConnectionRegistry;

/// Grouped reaction tally carried by `ReactionChanged`. The per-user
/// `has_reacted` flag is a read-model concern and deliberately absent here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmojiCount {
    pub emoji: String,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantChange {
    Added,
    Removed,
    RoleChanged,
}

/// Outbound events, serialized with a `type` tag for client dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    MessageCreated {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        seq: i64,
        content: String,
        attachments: Vec<Attachment>,
        created_at: DateTime<Utc>,
    },
    MessageEdited {
        conversation_id: Uuid,
        message_id: Uuid,
        content: String,
        updated_at: DateTime<Utc>,
    },
    MessageDeleted {
        conversation_id: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    },
    ReactionChanged {
        conversation_id: Uuid,
        message_id: Uuid,
        reactions: Vec<EmojiCount>,
    },
    TypingChanged {
        conversation_id: Uuid,
        user_id: Uuid,
        is_typing: bool,
    },
    PresenceChanged {
        user_id: Uuid,
        online: bool,
    },
    ParticipantChanged {
        conversation_id: Uuid,
        user_id: Uuid,
        change: ParticipantChange,
        #[serde(skip_serializing_if = "Option::is_none")]
        role: Option<MemberRole>,
    },
    ConversationRenamed {
        conversation_id: Uuid,
        name: String,
    },
    ConversationHiddenChanged {
        conversation_id: Uuid,
        hidden: bool,
        from_all_views: bool,
    },
    /// User-channel only; suppressed for muted participants.
    NotificationCreated {
        conversation_id: Uuid,
        message_id: Uuid,
        sender_id: Uuid,
        preview: String,
    },
}

fn encode(event: &ChatEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(payload) => Some(payload),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize event");
            None
        }
    }
}

/// Fan an event out on a conversation channel.
pub async fn broadcast_event(
    registry: &ConnectionRegistry,
    conversation_id: Uuid,
    event: &ChatEvent,
) {
    if let Some(payload) = encode(event) {
        CHAT_METRICS.events_broadcast.inc();
        registry.broadcast(conversation_id, payload).await;
    }
}

/// Deliver an event on one user's private channel.
pub async fn notify_user_event(registry: &ConnectionRegistry, user_id: Uuid, event: &ChatEvent) {
    if let Some(payload) = encode(event) {
        CHAT_METRICS.events_broadcast.inc();
        registry.notify_user(user_id, payload).await;
    }
}
