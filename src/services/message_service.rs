//! Message store operations
//!
//! Append-only per-conversation logs with edit, two-tier delete and derived
//! delivery status. Sequence numbers are issued under the conversation lock,
//! so the log order is the commit order clients observe.

use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::metrics::CHAT_METRICS;
use crate::models::{Attachment, Conversation, DeliveryStatus, Message};
use crate::routes::messages::MessageDto;
use crate::services::reaction_service::ReactionService;
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, notify_user_event, ChatEvent};
use crate::websocket::ConnectionRegistry;

/// Hard cap on one page of history, matching the platform's other list
/// endpoints.
pub const MAX_PAGE_SIZE: usize = 200;

const NOTIFICATION_PREVIEW_LEN: usize = 120;

pub struct MessageService;

impl MessageService {
    /// Append a message to a conversation.
    ///
    /// Senders must be active participants (not left, not hidden-from-all).
    /// A client-generated idempotency key makes retries safe: a replayed
    /// send returns the originally committed message instead of a duplicate.
    pub async fn send(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        sender_id: Uuid,
        conversation_id: Uuid,
        content: String,
        attachments: Vec<Attachment>,
        idempotency_key: Option<String>,
    ) -> AppResult<MessageDto> {
        if content.trim().is_empty() && attachments.is_empty() {
            return Err(AppError::BadRequest(
                "Message content cannot be empty".into(),
            ));
        }
        if attachments.iter().any(|a| a.url.trim().is_empty()) {
            return Err(AppError::BadRequest("Attachment URL cannot be empty".into()));
        }

        let guard = store.lock_conversation(conversation_id).await;

        // Replayed send: return the original commit unchanged.
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = store.message_by_idempotency_key(conversation_id, key).await {
                let conversation = store
                    .conversation(conversation_id)
                    .await
                    .ok_or(AppError::NotFound)?;
                drop(guard);
                return Self::dto_for(store, &conversation, &existing, sender_id).await;
            }
        }

        let now = Utc::now();
        let (seq, recipients) = store
            .update_conversation(conversation_id, |conv| -> AppResult<(i64, Vec<(Uuid, bool)>)> {
                let sender = conv.participant(sender_id).ok_or(AppError::Forbidden)?;
                if sender.has_left() || sender.hidden_from_all {
                    return Err(AppError::Forbidden);
                }

                let seq = conv.next_seq();
                conv.last_activity_at = now;
                let recipients = conv
                    .active_participants()
                    .filter(|p| p.user_id != sender_id)
                    .map(|p| (p.user_id, p.muted))
                    .collect();
                Ok((seq, recipients))
            })
            .await
            .ok_or(AppError::NotFound)??;

        let message = Message {
            id: Uuid::new_v4(),
            conversation_id,
            sender_id,
            content,
            attachments,
            seq,
            idempotency_key,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            hidden_for: HashSet::new(),
        };
        store.append_message(message.clone()).await;
        drop(guard);

        CHAT_METRICS.messages_sent.inc();
        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message.id,
            seq,
            "message committed"
        );

        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::MessageCreated {
                conversation_id,
                message_id: message.id,
                sender_id,
                seq,
                content: message.content.clone(),
                attachments: message.attachments.clone(),
                created_at: message.created_at,
            },
        )
        .await;

        // Notification fan-out: mute suppresses this, and only this.
        let preview: String = message.content.chars().take(NOTIFICATION_PREVIEW_LEN).collect();
        for (user_id, muted) in recipients {
            if muted {
                continue;
            }
            notify_user_event(
                registry,
                user_id,
                &ChatEvent::NotificationCreated {
                    conversation_id,
                    message_id: message.id,
                    sender_id,
                    preview: preview.clone(),
                },
            )
            .await;
        }

        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        Self::dto_for(store, &conversation, &message, sender_id).await
    }

    /// Edit a message. Author-only; tombstones cannot be edited. The edited
    /// flag is carried entirely by `updated_at`.
    pub async fn edit(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        editor_id: Uuid,
        message_id: Uuid,
        new_content: String,
    ) -> AppResult<()> {
        if new_content.trim().is_empty() {
            return Err(AppError::BadRequest(
                "Message content cannot be empty".into(),
            ));
        }

        let conversation_id = store
            .conversation_of_message(message_id)
            .await
            .ok_or(AppError::NotFound)?;

        let guard = store.lock_conversation(conversation_id).await;
        let now = Utc::now();
        let updated = store
            .update_message(message_id, |msg| -> AppResult<()> {
                if msg.sender_id != editor_id {
                    return Err(AppError::Forbidden);
                }
                if msg.is_tombstone() {
                    return Err(AppError::InvalidOperation(
                        "a deleted message cannot be edited".into(),
                    ));
                }
                msg.content = new_content.clone();
                msg.updated_at = now;
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)?;
        drop(guard);
        updated?;

        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::MessageEdited {
                conversation_id,
                message_id,
                content: new_content,
                updated_at: now,
            },
        )
        .await;
        Ok(())
    }

    /// Two-tier delete.
    ///
    /// `for_everyone` (author-only) replaces the message with a tombstone
    /// and strips attachments; for-me adds a per-user hide marker. Both are
    /// idempotent: repeating either is a no-op, not an error.
    pub async fn delete(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        actor_id: Uuid,
        message_id: Uuid,
        for_everyone: bool,
    ) -> AppResult<()> {
        let conversation_id = store
            .conversation_of_message(message_id)
            .await
            .ok_or(AppError::NotFound)?;

        let guard = store.lock_conversation(conversation_id).await;

        if !for_everyone {
            // A for-me delete requires being a participant of the
            // conversation, nothing more.
            let conversation = store
                .conversation(conversation_id)
                .await
                .ok_or(AppError::NotFound)?;
            if conversation.participant(actor_id).is_none() {
                return Err(AppError::Forbidden);
            }
        }

        let changed = store
            .update_message(message_id, |msg| -> AppResult<bool> {
                if for_everyone {
                    if msg.sender_id != actor_id {
                        return Err(AppError::Forbidden);
                    }
                    Ok(msg.tombstone(Utc::now()))
                } else {
                    Ok(msg.hidden_for.insert(actor_id))
                }
            })
            .await
            .ok_or(AppError::NotFound)?;
        drop(guard);
        let changed = changed?;

        if !changed {
            return Ok(());
        }

        let event = ChatEvent::MessageDeleted {
            conversation_id,
            message_id,
            for_everyone,
        };
        if for_everyone {
            broadcast_event(registry, conversation_id, &event).await;
        } else {
            notify_user_event(registry, actor_id, &event).await;
        }
        Ok(())
    }

    /// Visible slice of a conversation's log for one user: ascending commit
    /// order, restartable via `after_seq`, excluding for-me-deleted and
    /// cleared-away messages. Tombstones stay in place as markers.
    pub async fn list_visible(
        store: &ChatStore,
        conversation_id: Uuid,
        for_user: Uuid,
        after_seq: Option<i64>,
        limit: Option<usize>,
    ) -> AppResult<Vec<MessageDto>> {
        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        let participant = conversation
            .participant(for_user)
            .ok_or(AppError::Forbidden)?;
        if participant.hidden_from_all {
            return Err(AppError::Forbidden);
        }

        let after = after_seq.unwrap_or(0);
        let limit = limit.unwrap_or(MAX_PAGE_SIZE).min(MAX_PAGE_SIZE);
        let participant = participant.clone();

        let visible: Vec<Message> = store
            .with_log(conversation_id, |log| {
                log.iter()
                    .filter(|m| m.seq > after)
                    .filter(|m| participant.can_see_seq(m.seq))
                    .filter(|m| !m.is_hidden_for(for_user))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .await;

        let mut out = Vec::with_capacity(visible.len());
        for message in &visible {
            out.push(Self::dto_for(store, &conversation, message, for_user).await?);
        }
        Ok(out)
    }

    /// Derived delivery status: `read` once every other active participant's
    /// read cursor passed the message, `delivered` once every delivery
    /// cursor did. With no other active participants the status is vacuously
    /// `read`.
    pub fn delivery_status(conversation: &Conversation, message: &Message) -> DeliveryStatus {
        let mut all_read = true;
        let mut all_delivered = true;
        for p in conversation
            .active_participants()
            .filter(|p| p.user_id != message.sender_id)
        {
            all_read &= p.read_seq >= message.seq;
            all_delivered &= p.delivered_seq >= message.seq;
        }
        if all_read {
            DeliveryStatus::Read
        } else if all_delivered {
            DeliveryStatus::Delivered
        } else {
            DeliveryStatus::Sent
        }
    }

    pub(crate) async fn dto_for(
        store: &ChatStore,
        conversation: &Conversation,
        message: &Message,
        for_user: Uuid,
    ) -> AppResult<MessageDto> {
        let reactions =
            ReactionService::grouped_from_snapshot(store.reactions_snapshot(message.id).await, for_user);
        Ok(MessageDto {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            seq: message.seq,
            content: if message.is_tombstone() {
                None
            } else {
                Some(message.content.clone())
            },
            attachments: message.attachments.clone(),
            created_at: message.created_at,
            updated_at: message.updated_at,
            edited: message.is_edited(),
            deleted: message.is_tombstone(),
            status: Self::delivery_status(conversation, message),
            reactions,
        })
    }
}
