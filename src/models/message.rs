use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Media reference. The media store is external: upload happens elsewhere
/// and the core only ever holds the resulting stable URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// Derived per-message delivery state, computed from participant cursors at
/// read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Delivered,
    Read,
}

/// Message record in a conversation's append-only log.
///
/// `updated_at == created_at` until the first edit; the "edited" flag is
/// derived from the inequality, there is no separate boolean. A tombstone
/// (`deleted_at` set) keeps its position in the log with content and
/// attachments stripped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub seq: i64,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Users who deleted this message for themselves.
    pub hidden_for: HashSet<Uuid>,
}

impl Message {
    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }

    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn is_hidden_for(&self, user_id: Uuid) -> bool {
        self.hidden_for.contains(&user_id)
    }

    /// Replace content with the tombstone marker. Idempotent.
    pub fn tombstone(&mut self, now: DateTime<Utc>) -> bool {
        if self.deleted_at.is_some() {
            return false;
        }
        self.deleted_at = Some(now);
        self.content.clear();
        self.attachments.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Message {
        let now = Utc::now();
        Message {
            id: Uuid::new_v4(),
            conversation_id: Uuid::new_v4(),
            sender_id: Uuid::new_v4(),
            content: "hello".into(),
            attachments: vec![Attachment {
                url: "https://media.example/a.png".into(),
                content_type: Some("image/png".into()),
            }],
            seq: 1,
            idempotency_key: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            hidden_for: HashSet::new(),
        }
    }

    #[test]
    fn test_edited_is_derived_from_timestamps() {
        let mut msg = sample();
        assert!(!msg.is_edited());
        msg.updated_at = msg.created_at + chrono::Duration::seconds(1);
        assert!(msg.is_edited());
    }

    #[test]
    fn test_tombstone_strips_content_and_is_idempotent() {
        let mut msg = sample();
        assert!(msg.tombstone(Utc::now()));
        assert!(msg.is_tombstone());
        assert!(msg.content.is_empty());
        assert!(msg.attachments.is_empty());

        let first_deleted_at = msg.deleted_at;
        assert!(!msg.tombstone(Utc::now()), "second tombstone is a no-op");
        assert_eq!(msg.deleted_at, first_deleted_at);
    }
}
