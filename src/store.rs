//! In-process chat store
//!
//! `ChatStore` is the storage handle every service function takes, the way
//! request handlers elsewhere in the platform take a database pool. It owns
//! four maps: conversation records (metadata + participants), per-
//! conversation append-only message logs, a message-id index, and per-message
//! reaction sets.
//!
//! Concurrency contract: every mutating operation on a conversation must run
//! under that conversation's lock (`lock_conversation`), which linearizes
//! send/edit/delete/toggle/membership updates per conversation while leaving
//! unrelated conversations fully parallel. Sequence numbers are issued from
//! `Conversation::last_seq` inside the same critical section as the log
//! append, so commit order and sequence order always agree. The lock must be
//! dropped before any event fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::models::{Conversation, Message};

/// Outcome of a reaction toggle, used to pick the broadcast payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionToggle {
    Added,
    Removed,
    /// Previous emoji was replaced by the new one.
    Replaced { previous: String },
}

/// A single user's reaction on one message. `order` is issued from a
/// per-message counter and pins the first-occurrence ordering of grouped
/// counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reaction {
    pub emoji: String,
    pub order: u64,
}

/// Reaction state of one message: an upsert map keyed by user.
#[derive(Debug, Default)]
pub struct ReactionSet {
    by_user: HashMap<Uuid, Reaction>,
    next_order: u64,
}

impl ReactionSet {
    /// The single state-transition rule: none -> emoji, same emoji -> none,
    /// different emoji -> replace. Self-inverse under replay.
    pub fn toggle(&mut self, user_id: Uuid, emoji: &str) -> ReactionToggle {
        match self.by_user.get(&user_id) {
            Some(existing) if existing.emoji == emoji => {
                self.by_user.remove(&user_id);
                ReactionToggle::Removed
            }
            Some(existing) => {
                let previous = existing.emoji.clone();
                let order = self.next_order;
                self.next_order += 1;
                self.by_user.insert(
                    user_id,
                    Reaction {
                        emoji: emoji.to_string(),
                        order,
                    },
                );
                ReactionToggle::Replaced { previous }
            }
            None => {
                let order = self.next_order;
                self.next_order += 1;
                self.by_user.insert(
                    user_id,
                    Reaction {
                        emoji: emoji.to_string(),
                        order,
                    },
                );
                ReactionToggle::Added
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    pub fn snapshot(&self) -> Vec<(Uuid, Reaction)> {
        self.by_user
            .iter()
            .map(|(user, r)| (*user, r.clone()))
            .collect()
    }
}

#[derive(Default)]
struct StoreInner {
    conversations: RwLock<HashMap<Uuid, Conversation>>,
    logs: RwLock<HashMap<Uuid, Vec<Message>>>,
    /// message id -> conversation id
    message_index: RwLock<HashMap<Uuid, Uuid>>,
    /// Sorted participant pair -> direct conversation id. The mutex is the
    /// uniqueness constraint: concurrent find-or-create calls serialize here.
    direct_pairs: Mutex<HashMap<(Uuid, Uuid), Uuid>>,
    /// message id -> reactions
    reactions: RwLock<HashMap<Uuid, ReactionSet>>,
    /// Per-conversation write locks, created on first use and kept for the
    /// conversation's lifetime (conversations are never hard-deleted).
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

#[derive(Clone, Default)]
pub struct ChatStore {
    inner: Arc<StoreInner>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock for one conversation. Mutating operations hold
    /// this for the whole read-modify-write, never across event emission.
    pub async fn lock_conversation(&self, conversation_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.locks.lock().await;
            locks
                .entry(conversation_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    fn pair_key(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
        if a <= b {
            (a, b)
        } else {
            (b, a)
        }
    }

    pub async fn find_direct(&self, a: Uuid, b: Uuid) -> Option<Uuid> {
        let pairs = self.inner.direct_pairs.lock().await;
        pairs.get(&Self::pair_key(a, b)).copied()
    }

    /// Find-or-create for direct conversations. The pair map's mutex is held
    /// across the lookup and the insert, so N concurrent calls for the same
    /// pair yield exactly one conversation.
    pub async fn direct_conversation(
        &self,
        build: impl FnOnce() -> Conversation,
        a: Uuid,
        b: Uuid,
    ) -> (Uuid, bool) {
        let mut pairs = self.inner.direct_pairs.lock().await;
        if let Some(existing) = pairs.get(&Self::pair_key(a, b)) {
            return (*existing, false);
        }

        let conversation = build();
        let id = conversation.id;
        {
            let mut conversations = self.inner.conversations.write().await;
            conversations.insert(id, conversation);
        }
        pairs.insert(Self::pair_key(a, b), id);
        (id, true)
    }

    pub async fn insert_conversation(&self, conversation: Conversation) -> Uuid {
        let id = conversation.id;
        let mut conversations = self.inner.conversations.write().await;
        conversations.insert(id, conversation);
        id
    }

    pub async fn conversation(&self, id: Uuid) -> Option<Conversation> {
        let conversations = self.inner.conversations.read().await;
        conversations.get(&id).cloned()
    }

    pub async fn conversation_exists(&self, id: Uuid) -> bool {
        let conversations = self.inner.conversations.read().await;
        conversations.contains_key(&id)
    }

    /// Apply a closure to a conversation record in place. Returns `None` when
    /// the conversation does not exist.
    pub async fn update_conversation<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Conversation) -> R,
    ) -> Option<R> {
        let mut conversations = self.inner.conversations.write().await;
        conversations.get_mut(&id).map(f)
    }

    /// All conversations a user belongs to (any lifecycle state); the caller
    /// filters by visibility flags.
    pub async fn conversations_of(&self, user_id: Uuid) -> Vec<Conversation> {
        let conversations = self.inner.conversations.read().await;
        conversations
            .values()
            .filter(|c| c.participant(user_id).is_some())
            .cloned()
            .collect()
    }

    pub async fn append_message(&self, message: Message) {
        let conversation_id = message.conversation_id;
        let message_id = message.id;
        {
            let mut logs = self.inner.logs.write().await;
            logs.entry(conversation_id).or_default().push(message);
        }
        let mut index = self.inner.message_index.write().await;
        index.insert(message_id, conversation_id);
    }

    pub async fn conversation_of_message(&self, message_id: Uuid) -> Option<Uuid> {
        let index = self.inner.message_index.read().await;
        index.get(&message_id).copied()
    }

    pub async fn message(&self, message_id: Uuid) -> Option<Message> {
        let conversation_id = self.conversation_of_message(message_id).await?;
        let logs = self.inner.logs.read().await;
        logs.get(&conversation_id)?
            .iter()
            .find(|m| m.id == message_id)
            .cloned()
    }

    pub async fn update_message<R>(
        &self,
        message_id: Uuid,
        f: impl FnOnce(&mut Message) -> R,
    ) -> Option<R> {
        let conversation_id = self.conversation_of_message(message_id).await?;
        let mut logs = self.inner.logs.write().await;
        logs.get_mut(&conversation_id)?
            .iter_mut()
            .find(|m| m.id == message_id)
            .map(f)
    }

    /// Read access to a conversation's log in append (= sequence) order.
    pub async fn with_log<R>(&self, conversation_id: Uuid, f: impl FnOnce(&[Message]) -> R) -> R {
        let logs = self.inner.logs.read().await;
        f(logs.get(&conversation_id).map(Vec::as_slice).unwrap_or(&[]))
    }

    /// Look up a previously committed send by its idempotency key.
    pub async fn message_by_idempotency_key(
        &self,
        conversation_id: Uuid,
        key: &str,
    ) -> Option<Message> {
        let logs = self.inner.logs.read().await;
        logs.get(&conversation_id)?
            .iter()
            .find(|m| m.idempotency_key.as_deref() == Some(key))
            .cloned()
    }

    /// Apply a closure to a message's reaction set (created on first use,
    /// dropped again when it empties out).
    pub async fn update_reactions<R>(
        &self,
        message_id: Uuid,
        f: impl FnOnce(&mut ReactionSet) -> R,
    ) -> R {
        let mut reactions = self.inner.reactions.write().await;
        let set = reactions.entry(message_id).or_default();
        let result = f(set);
        if set.is_empty() {
            reactions.remove(&message_id);
        }
        result
    }

    pub async fn reactions_snapshot(&self, message_id: Uuid) -> Vec<(Uuid, Reaction)> {
        let reactions = self.inner.reactions.read().await;
        reactions
            .get(&message_id)
            .map(|set| set.snapshot())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_direct_conversation_is_unique_per_pair() {
        let store = ChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let (first, created) = store
            .direct_conversation(|| Conversation::direct(a, b, Utc::now()), a, b)
            .await;
        assert!(created);

        // Order-independent lookup and creation.
        let (second, created) = store
            .direct_conversation(|| Conversation::direct(b, a, Utc::now()), b, a)
            .await;
        assert!(!created);
        assert_eq!(first, second);
        assert_eq!(store.find_direct(b, a).await, Some(first));
    }

    #[tokio::test]
    async fn test_message_index_tracks_appends() {
        let store = ChatStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let conv = Conversation::direct(a, b, Utc::now());
        let conv_id = store.insert_conversation(conv).await;

        let now = Utc::now();
        let message = Message {
            id: Uuid::new_v4(),
            conversation_id: conv_id,
            sender_id: a,
            content: "hi".into(),
            attachments: vec![],
            seq: 1,
            idempotency_key: Some("key-1".into()),
            created_at: now,
            updated_at: now,
            deleted_at: None,
            hidden_for: Default::default(),
        };
        let message_id = message.id;
        store.append_message(message).await;

        assert_eq!(
            store.conversation_of_message(message_id).await,
            Some(conv_id)
        );
        assert_eq!(store.message(message_id).await.unwrap().content, "hi");
        assert!(store
            .message_by_idempotency_key(conv_id, "key-1")
            .await
            .is_some());
        assert!(store
            .message_by_idempotency_key(conv_id, "key-2")
            .await
            .is_none());
    }

    #[tokio::test]
    async fn test_reaction_toggle_transitions() {
        let mut set = ReactionSet::default();
        let user = Uuid::new_v4();

        assert_eq!(set.toggle(user, "👍"), ReactionToggle::Added);
        assert_eq!(
            set.toggle(user, "❤️"),
            ReactionToggle::Replaced {
                previous: "👍".into()
            }
        );
        assert_eq!(set.toggle(user, "❤️"), ReactionToggle::Removed);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_empty_reaction_sets_are_dropped() {
        let store = ChatStore::new();
        let message_id = Uuid::new_v4();
        let user = Uuid::new_v4();

        store
            .update_reactions(message_id, |set| set.toggle(user, "👍"))
            .await;
        assert_eq!(store.reactions_snapshot(message_id).await.len(), 1);

        store
            .update_reactions(message_id, |set| set.toggle(user, "👍"))
            .await;
        assert!(store.reactions_snapshot(message_id).await.is_empty());
    }
}
