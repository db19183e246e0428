//! Presence and typing tracker
//!
//! Ephemeral, process-local state: an online set keyed by last heartbeat and
//! a typing set with a short TTL. Nothing here is ever persisted — after a
//! restart the state rebuilds from live heartbeats, which is acceptable for
//! advisory UI state. Eventual consistency is fine; these maps take no part
//! in the per-conversation serialization of the chat store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;
use uuid::Uuid;

/// Result of one sweep pass: entries that expired since the last pass.
#[derive(Debug, Default)]
pub struct SweepReport {
    pub went_offline: Vec<Uuid>,
    pub typing_expired: Vec<(Uuid, Uuid)>,
}

struct PresenceInner {
    /// user -> last heartbeat
    online: RwLock<HashMap<Uuid, Instant>>,
    /// (conversation, user) -> expiry deadline
    typing: RwLock<HashMap<(Uuid, Uuid), Instant>>,
    presence_timeout: Duration,
    typing_ttl: Duration,
}

#[derive(Clone)]
pub struct PresenceTracker {
    inner: Arc<PresenceInner>,
}

impl PresenceTracker {
    pub fn new(presence_timeout: Duration, typing_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(PresenceInner {
                online: RwLock::new(HashMap::new()),
                typing: RwLock::new(HashMap::new()),
                presence_timeout,
                typing_ttl,
            }),
        }
    }

    /// Refresh a user's online entry. Returns true when the user was offline
    /// before this heartbeat (drives the PresenceChanged fan-out).
    pub async fn heartbeat(&self, user_id: Uuid) -> bool {
        let now = Instant::now();
        let mut online = self.inner.online.write().await;
        let was_online = online
            .get(&user_id)
            .map(|last| now.duration_since(*last) < self.inner.presence_timeout)
            .unwrap_or(false);
        online.insert(user_id, now);
        !was_online
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        let online = self.inner.online.read().await;
        online
            .get(&user_id)
            .map(|last| last.elapsed() < self.inner.presence_timeout)
            .unwrap_or(false)
    }

    pub async fn online_users(&self) -> Vec<Uuid> {
        let online = self.inner.online.read().await;
        let mut users: Vec<Uuid> = online
            .iter()
            .filter(|(_, last)| last.elapsed() < self.inner.presence_timeout)
            .map(|(user, _)| *user)
            .collect();
        users.sort();
        users
    }

    /// Set or clear a typing entry. Returns true when the visible state
    /// changed (fresh start or explicit stop), so callers only broadcast
    /// transitions, not every keystroke refresh.
    pub async fn set_typing(&self, conversation_id: Uuid, user_id: Uuid, is_typing: bool) -> bool {
        let key = (conversation_id, user_id);
        let mut typing = self.inner.typing.write().await;
        if is_typing {
            let now = Instant::now();
            let was_typing = typing
                .get(&key)
                .map(|deadline| *deadline > now)
                .unwrap_or(false);
            typing.insert(key, now + self.inner.typing_ttl);
            !was_typing
        } else {
            typing.remove(&key).is_some()
        }
    }

    /// Users currently typing in a conversation, always excluding the
    /// requester's own id. Sorted for deterministic output.
    pub async fn typing_users(&self, conversation_id: Uuid, requester: Uuid) -> Vec<Uuid> {
        let now = Instant::now();
        let typing = self.inner.typing.read().await;
        let mut users: Vec<Uuid> = typing
            .iter()
            .filter(|((conv, user), deadline)| {
                *conv == conversation_id && *user != requester && **deadline > now
            })
            .map(|((_, user), _)| *user)
            .collect();
        users.sort();
        users
    }

    /// Drop expired entries and report them so the caller can emit
    /// TypingChanged / PresenceChanged events for the expirations.
    pub async fn sweep(&self) -> SweepReport {
        let now = Instant::now();
        let mut report = SweepReport::default();

        {
            let mut online = self.inner.online.write().await;
            online.retain(|user, last| {
                let alive = now.duration_since(*last) < self.inner.presence_timeout;
                if !alive {
                    report.went_offline.push(*user);
                }
                alive
            });
        }

        {
            let mut typing = self.inner.typing.write().await;
            typing.retain(|key, deadline| {
                let alive = *deadline > now;
                if !alive {
                    report.typing_expired.push(*key);
                }
                alive
            });
        }

        report.went_offline.sort();
        report.typing_expired.sort();
        report
    }
}
