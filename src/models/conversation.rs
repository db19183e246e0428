use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::{MemberRole, Participant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Direct,
    Group,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

/// Conversation record: metadata plus the full participant set.
///
/// Conversations are never hard-deleted; per-participant hide flags archive
/// them. `last_seq` is the per-conversation commit counter every message
/// sequence is issued from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub kind: ConversationKind,
    /// Group name; `None` for direct conversations.
    pub name: Option<String>,
    /// Group creator; `None` for direct conversations.
    pub created_by: Option<Uuid>,
    pub participants: Vec<Participant>,
    pub last_seq: i64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    pub fn direct(a: Uuid, b: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Direct,
            name: None,
            created_by: None,
            participants: vec![
                Participant::new(a, MemberRole::Member, now),
                Participant::new(b, MemberRole::Member, now),
            ],
            last_seq: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn group(creator: Uuid, members: &[Uuid], name: String, now: DateTime<Utc>) -> Self {
        let mut participants = vec![Participant::new(creator, MemberRole::Admin, now)];
        for member in members {
            if *member != creator && !participants.iter().any(|p| p.user_id == *member) {
                participants.push(Participant::new(*member, MemberRole::Member, now));
            }
        }
        Self {
            id: Uuid::new_v4(),
            kind: ConversationKind::Group,
            name: Some(name),
            created_by: Some(creator),
            participants,
            last_seq: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ConversationKind::Direct
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }

    pub fn participant(&self, user_id: Uuid) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn participant_mut(&mut self, user_id: Uuid) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    pub fn active_participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| p.is_active())
    }

    pub fn active_admin_count(&self) -> usize {
        self.participants
            .iter()
            .filter(|p| p.is_active() && p.role.is_admin())
            .count()
    }

    /// Issue the next commit sequence. Callers must hold the conversation
    /// lock: the counter and the log append have to be one atomic step.
    pub fn next_seq(&mut self) -> i64 {
        self.last_seq += 1;
        self.last_seq
    }

    /// Most-senior active member for the auto-promotion policy: earliest
    /// join wins, user id breaks ties deterministically.
    pub fn most_senior_active_member(&self, exclude: Uuid) -> Option<Uuid> {
        self.participants
            .iter()
            .filter(|p| p.is_active() && p.user_id != exclude)
            .min_by_key(|p| (p.joined_at, p.user_id))
            .map(|p| p.user_id)
    }
}
