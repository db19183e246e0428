//! Reaction aggregator
//!
//! One reaction per (message, user): toggling cycles none -> emoji -> none
//! and selecting a different emoji replaces the current one. The whole
//! transition is a single upsert under the conversation lock, so it stays
//! correct when clients replay a toggle after a timeout.

use std::collections::HashMap;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::routes::reactions::ReactionCount;
use crate::store::{ChatStore, Reaction};
use crate::websocket::events::{broadcast_event, ChatEvent, EmojiCount};
use crate::websocket::ConnectionRegistry;

const MAX_EMOJI_LEN: usize = 20;

pub struct ReactionService;

impl ReactionService {
    /// Toggle the caller's reaction on a message and broadcast the new
    /// grouped tally. Returns the tally as seen by the caller.
    pub async fn toggle(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        user_id: Uuid,
        message_id: Uuid,
        emoji: &str,
    ) -> AppResult<Vec<ReactionCount>> {
        if emoji.is_empty() || emoji.len() > MAX_EMOJI_LEN {
            return Err(AppError::BadRequest("Invalid emoji".into()));
        }

        let conversation_id = store
            .conversation_of_message(message_id)
            .await
            .ok_or(AppError::NotFound)?;

        let guard = store.lock_conversation(conversation_id).await;

        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        let participant = conversation
            .participant(user_id)
            .ok_or(AppError::Forbidden)?;
        if !participant.is_active() {
            return Err(AppError::Forbidden);
        }

        let message = store.message(message_id).await.ok_or(AppError::NotFound)?;
        if message.is_tombstone() {
            return Err(AppError::InvalidOperation(
                "cannot react to a deleted message".into(),
            ));
        }

        let outcome = store
            .update_reactions(message_id, |set| set.toggle(user_id, emoji))
            .await;
        let snapshot = store.reactions_snapshot(message_id).await;
        drop(guard);

        tracing::debug!(
            message_id = %message_id,
            user_id = %user_id,
            ?outcome,
            "reaction toggled"
        );

        let grouped = Self::grouped_from_snapshot(snapshot.clone(), user_id);
        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::ReactionChanged {
                conversation_id,
                message_id,
                reactions: grouped
                    .iter()
                    .map(|r| EmojiCount {
                        emoji: r.emoji.clone(),
                        count: r.count,
                    })
                    .collect(),
            },
        )
        .await;

        Ok(grouped)
    }

    /// Grouped reaction tally for a message, with the caller's own reaction
    /// flagged.
    pub async fn grouped_counts(
        store: &ChatStore,
        message_id: Uuid,
        for_user: Uuid,
    ) -> AppResult<Vec<ReactionCount>> {
        let conversation_id = store
            .conversation_of_message(message_id)
            .await
            .ok_or(AppError::NotFound)?;
        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        if conversation.participant(for_user).is_none() {
            return Err(AppError::Forbidden);
        }

        Ok(Self::grouped_from_snapshot(
            store.reactions_snapshot(message_id).await,
            for_user,
        ))
    }

    /// Group a raw (user, reaction) snapshot by emoji. Ordering is pinned to
    /// first occurrence among the currently held reactions, using the
    /// per-message order counter, so repeated reads are deterministic.
    pub fn grouped_from_snapshot(
        snapshot: Vec<(Uuid, Reaction)>,
        for_user: Uuid,
    ) -> Vec<ReactionCount> {
        struct Tally {
            count: i64,
            first_order: u64,
            has_reacted: bool,
        }

        let mut by_emoji: HashMap<String, Tally> = HashMap::new();
        for (user, reaction) in snapshot {
            let entry = by_emoji.entry(reaction.emoji).or_insert(Tally {
                count: 0,
                first_order: reaction.order,
                has_reacted: false,
            });
            entry.count += 1;
            entry.first_order = entry.first_order.min(reaction.order);
            entry.has_reacted |= user == for_user;
        }

        let mut grouped: Vec<(u64, ReactionCount)> = by_emoji
            .into_iter()
            .map(|(emoji, tally)| {
                (
                    tally.first_order,
                    ReactionCount {
                        emoji,
                        count: tally.count,
                        has_reacted: tally.has_reacted,
                    },
                )
            })
            .collect();
        grouped.sort_by_key(|(order, _)| *order);
        grouped.into_iter().map(|(_, count)| count).collect()
    }
}
