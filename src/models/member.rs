//! Participant records and the member role hierarchy
//!
//! Groups know two roles: Member < Admin. Direct conversations carry no
//! roles; their participants are stored as plain members and every role
//! operation on them is rejected at the service layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Member role in a group conversation with natural ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Regular member - can send messages
    Member = 0,
    /// Admin - can manage members, roles and group settings
    Admin = 1,
}

impl MemberRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemberRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid role: {}", s))
    }
}

/// Per-(conversation, user) membership record.
///
/// Visibility flags and cursors are independent axes: a conversation can be
/// hidden from the "all" view while the participant still reads it from the
/// group list, and cursors keep advancing for anyone who has not left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participant {
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,

    /// View-local hide ("remove from all-conversations list").
    pub hidden_at: Option<DateTime<Utc>>,
    /// Full removal from every view. Direct conversations, or groups the
    /// user already left, only.
    pub hidden_from_all: bool,
    /// Terminal departure from a group. `left_seq` snapshots the
    /// conversation's last commit so later messages stay invisible.
    pub left_at: Option<DateTime<Utc>>,
    pub left_seq: Option<i64>,
    /// Suppresses notification emission; delivery is unaffected.
    pub muted: bool,

    /// Highest sequence this participant's client acknowledged receiving.
    pub delivered_seq: i64,
    /// Highest sequence this participant has read.
    pub read_seq: i64,
    /// Messages at or below this sequence were cleared by this user.
    pub cleared_before_seq: i64,
}

impl Participant {
    pub fn new(user_id: Uuid, role: MemberRole, joined_at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            role,
            joined_at,
            hidden_at: None,
            hidden_from_all: false,
            left_at: None,
            left_seq: None,
            muted: false,
            delivered_seq: 0,
            read_seq: 0,
            cleared_before_seq: 0,
        }
    }

    pub fn has_left(&self) -> bool {
        self.left_at.is_some()
    }

    /// Active participants receive new messages and count toward the
    /// delivered/read status of everyone else's messages.
    pub fn is_active(&self) -> bool {
        !self.has_left() && !self.hidden_from_all
    }

    /// Whether a message with this sequence is within the range the
    /// participant may see (leavers are frozen at their departure point).
    pub fn can_see_seq(&self, seq: i64) -> bool {
        if seq <= self.cleared_before_seq {
            return false;
        }
        match self.left_seq {
            Some(left_seq) => seq <= left_seq,
            None => true,
        }
    }
}
