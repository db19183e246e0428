use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    RwLock,
};
use uuid::Uuid;

pub mod events;
pub mod message_types;

/// Unique identifier for a WebSocket subscriber
///
/// Each connection gets a unique subscriber id when it registers, allowing
/// precise cleanup when it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

struct Subscriber {
    id: SubscriberId,
    sender: UnboundedSender<String>,
}

/// Connection registry: the in-process event bus fan-out.
///
/// Two channel spaces, matching the event model: per-conversation channels
/// for shared state deltas and per-user channels for private deltas
/// (hidden-for-me deletes, hide toggles, notifications). Dead senders are
/// cleaned up on broadcast so closed connections cannot leak.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    conversations: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
    users: Arc<RwLock<HashMap<Uuid, Vec<Subscriber>>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection on a conversation channel and its user channel.
    /// Returns the subscriber id (for cleanup) and the receiving end both
    /// channels feed into.
    pub async fn add_subscriber(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> (SubscriberId, UnboundedReceiver<String>) {
        let (tx, rx) = unbounded_channel();
        let subscriber_id = SubscriberId::new();

        {
            let mut guard = self.conversations.write().await;
            guard.entry(conversation_id).or_default().push(Subscriber {
                id: subscriber_id,
                sender: tx.clone(),
            });
        }
        {
            let mut guard = self.users.write().await;
            guard.entry(user_id).or_default().push(Subscriber {
                id: subscriber_id,
                sender: tx,
            });
        }

        tracing::debug!(
            conversation_id = %conversation_id,
            user_id = %user_id,
            "subscriber {:?} registered",
            subscriber_id,
        );

        (subscriber_id, rx)
    }

    /// Remove one subscriber from both channel spaces. Must run when the
    /// connection closes or the channels leak.
    pub async fn remove_subscriber(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        subscriber_id: SubscriberId,
    ) {
        let mut guard = self.conversations.write().await;
        if let Some(subscribers) = guard.get_mut(&conversation_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&conversation_id);
            }
        }
        drop(guard);

        let mut guard = self.users.write().await;
        if let Some(subscribers) = guard.get_mut(&user_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    /// Broadcast a payload to every subscriber of a conversation channel,
    /// dropping dead senders along the way.
    pub async fn broadcast(&self, conversation_id: Uuid, msg: String) {
        let mut guard = self.conversations.write().await;
        if let Some(subscribers) = guard.get_mut(&conversation_id) {
            subscribers.retain(|subscriber| subscriber.sender.send(msg.clone()).is_ok());
            if subscribers.is_empty() {
                guard.remove(&conversation_id);
            }
        }
    }

    /// Deliver a payload to every connection of one user.
    pub async fn notify_user(&self, user_id: Uuid, msg: String) {
        let mut guard = self.users.write().await;
        if let Some(subscribers) = guard.get_mut(&user_id) {
            subscribers.retain(|subscriber| subscriber.sender.send(msg.clone()).is_ok());
            if subscribers.is_empty() {
                guard.remove(&user_id);
            }
        }
    }

    pub async fn subscriber_count(&self, conversation_id: Uuid) -> usize {
        let guard = self.conversations.read().await;
        guard.get(&conversation_id).map(|v| v.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_conversation_subscribers() {
        let registry = ConnectionRegistry::new();
        let conv = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let (_id_a, mut rx_a) = registry.add_subscriber(conv, user_a).await;
        let (_id_b, mut rx_b) = registry.add_subscriber(conv, user_b).await;

        registry.broadcast(conv, "hello".into()).await;
        assert_eq!(rx_a.recv().await.unwrap(), "hello");
        assert_eq!(rx_b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_user_channel_is_private() {
        let registry = ConnectionRegistry::new();
        let conv = Uuid::new_v4();
        let user_a = Uuid::new_v4();
        let user_b = Uuid::new_v4();

        let (_id_a, mut rx_a) = registry.add_subscriber(conv, user_a).await;
        let (_id_b, mut rx_b) = registry.add_subscriber(conv, user_b).await;

        registry.notify_user(user_a, "just for a".into()).await;
        assert_eq!(rx_a.recv().await.unwrap(), "just for a");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_removed_subscriber_stops_receiving() {
        let registry = ConnectionRegistry::new();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (id, mut rx) = registry.add_subscriber(conv, user).await;
        registry.remove_subscriber(conv, user, id).await;
        assert_eq!(registry.subscriber_count(conv).await, 0);

        registry.broadcast(conv, "late".into()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_senders_are_cleaned_up() {
        let registry = ConnectionRegistry::new();
        let conv = Uuid::new_v4();
        let user = Uuid::new_v4();

        let (_id, rx) = registry.add_subscriber(conv, user).await;
        drop(rx);

        registry.broadcast(conv, "ping".into()).await;
        assert_eq!(registry.subscriber_count(conv).await, 0);
    }
}
