//! Conversation store operations
//!
//! Owns conversation records, membership, per-participant visibility flags
//! and cursors. Every mutating operation acquires the conversation's lock,
//! applies the full state transition, and emits events only after the lock
//! is released.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Conversation, ConversationKind, MemberRole};
use crate::services::identity_client::{ensure_users_exist, IdentityProvider};
use crate::store::ChatStore;
use crate::websocket::events::{
    broadcast_event, notify_user_event, ChatEvent, ParticipantChange,
};
use crate::websocket::ConnectionRegistry;

const MAX_GROUP_NAME_LEN: usize = 255;

/// Row shape for the conversation list view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub kind: ConversationKind,
    pub name: Option<String>,
    pub member_count: usize,
    pub last_seq: i64,
    pub last_activity_at: DateTime<Utc>,
    pub role: MemberRole,
    pub muted: bool,
    pub hidden: bool,
}

pub struct ConversationService;

impl ConversationService {
    fn validate_group_name(name: &str) -> AppResult<()> {
        if name.trim().is_empty() {
            return Err(AppError::BadRequest("Group name cannot be empty".into()));
        }
        if name.len() > MAX_GROUP_NAME_LEN {
            return Err(AppError::BadRequest("Group name too long (max 255)".into()));
        }
        Ok(())
    }

    /// Find the direct conversation between two users or create it.
    ///
    /// Idempotent under concurrency: the sorted-pair index serializes
    /// lookup-then-insert, so N racing calls yield exactly one conversation.
    /// Calling this also reopens the conversation for the initiator if they
    /// had previously hidden or deleted it.
    pub async fn find_or_create_direct(
        store: &ChatStore,
        identity: Option<&Arc<dyn IdentityProvider>>,
        initiator: Uuid,
        peer: Uuid,
    ) -> AppResult<(Uuid, bool)> {
        if initiator == peer {
            return Err(AppError::InvalidOperation(
                "cannot open a direct conversation with yourself".into(),
            ));
        }

        ensure_users_exist(identity, &[initiator, peer]).await?;

        let (conversation_id, created) = store
            .direct_conversation(|| Conversation::direct(initiator, peer, Utc::now()), initiator, peer)
            .await;

        if created {
            tracing::info!(
                conversation_id = %conversation_id,
                initiator = %initiator,
                peer = %peer,
                "direct conversation created"
            );
        } else {
            // Reopening an existing pair clears the initiator's hide state.
            let _guard = store.lock_conversation(conversation_id).await;
            store
                .update_conversation(conversation_id, |conv| {
                    if let Some(p) = conv.participant_mut(initiator) {
                        p.hidden_at = None;
                        p.hidden_from_all = false;
                    }
                })
                .await;
        }

        Ok((conversation_id, created))
    }

    /// Create a group conversation: the creator becomes its sole admin and at
    /// least one other member is required.
    pub async fn create_group(
        store: &ChatStore,
        identity: Option<&Arc<dyn IdentityProvider>>,
        creator: Uuid,
        member_ids: &[Uuid],
        name: String,
    ) -> AppResult<Uuid> {
        Self::validate_group_name(&name)?;

        let mut others: Vec<Uuid> = Vec::new();
        for id in member_ids {
            if *id != creator && !others.contains(id) {
                others.push(*id);
            }
        }
        if others.is_empty() {
            return Err(AppError::InvalidOperation(
                "a group needs at least one member besides the creator".into(),
            ));
        }

        let mut all = vec![creator];
        all.extend_from_slice(&others);
        ensure_users_exist(identity, &all).await?;

        let conversation = Conversation::group(creator, &others, name, Utc::now());
        let conversation_id = store.insert_conversation(conversation).await;
        tracing::info!(
            conversation_id = %conversation_id,
            creator = %creator,
            members = others.len() + 1,
            "group conversation created"
        );
        Ok(conversation_id)
    }

    /// Load a conversation for a participant. Absent conversations are
    /// `NotFound`; non-participants and users who fully removed it get
    /// `Forbidden`.
    pub async fn get_for_user(
        store: &ChatStore,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<Conversation> {
        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        let participant = conversation
            .participant(user_id)
            .ok_or(AppError::Forbidden)?;
        if participant.hidden_from_all {
            return Err(AppError::Forbidden);
        }
        Ok(conversation)
    }

    /// List a user's conversations ordered by most recent activity.
    /// Hidden-from-all conversations never appear; view-local hidden ones
    /// only when `include_hidden` is set.
    pub async fn list_conversations(
        store: &ChatStore,
        user_id: Uuid,
        include_hidden: bool,
    ) -> Vec<ConversationSummary> {
        let mut summaries: Vec<ConversationSummary> = store
            .conversations_of(user_id)
            .await
            .into_iter()
            .filter_map(|conv| {
                let p = conv.participant(user_id)?;
                if p.hidden_from_all {
                    return None;
                }
                if p.hidden_at.is_some() && !include_hidden {
                    return None;
                }
                Some(ConversationSummary {
                    id: conv.id,
                    kind: conv.kind,
                    name: conv.name.clone(),
                    member_count: conv.active_participants().count(),
                    last_seq: conv.last_seq,
                    last_activity_at: conv.last_activity_at,
                    role: p.role,
                    muted: p.muted,
                    hidden: p.hidden_at.is_some(),
                })
            })
            .collect();
        summaries.sort_by(|a, b| b.last_activity_at.cmp(&a.last_activity_at));
        summaries
    }

    /// Add (or re-admit) a group member. Admin-only; re-adding a user who
    /// left clears the terminal flags — this is the sanctioned way back in.
    pub async fn add_participant(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        identity: Option<&Arc<dyn IdentityProvider>>,
        actor: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        ensure_users_exist(identity, &[user_id]).await?;

        let _guard = store.lock_conversation(conversation_id).await;
        let added = store
            .update_conversation(conversation_id, |conv| -> AppResult<bool> {
                Self::require_group_admin(conv, actor)?;

                let now = Utc::now();
                match conv
                    .participants
                    .iter()
                    .position(|p| p.user_id == user_id)
                {
                    Some(idx) => {
                        let existing = &mut conv.participants[idx];
                        if existing.has_left() {
                            existing.left_at = None;
                            existing.left_seq = None;
                            existing.hidden_at = None;
                            existing.hidden_from_all = false;
                            existing.role = MemberRole::Member;
                            Ok(true)
                        } else {
                            // Already an active member: adding again is a no-op.
                            Ok(false)
                        }
                    }
                    None => {
                        conv.participants.push(crate::models::Participant::new(
                            user_id,
                            MemberRole::Member,
                            now,
                        ));
                        Ok(true)
                    }
                }
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        if added {
            broadcast_event(
                registry,
                conversation_id,
                &ChatEvent::ParticipantChanged {
                    conversation_id,
                    user_id,
                    change: ParticipantChange::Added,
                    role: Some(MemberRole::Member),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Remove a group member (admin-only). Self-removal is a leave and goes
    /// through the leave policy instead.
    pub async fn remove_participant(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        actor: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> AppResult<()> {
        if actor == user_id {
            return Self::leave_group(store, registry, actor, conversation_id).await;
        }

        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                Self::require_group_admin(conv, actor)?;

                let last_seq = conv.last_seq;
                let other_active = conv
                    .active_participants()
                    .filter(|p| p.user_id != user_id)
                    .count();
                let admin_count = conv.active_admin_count();

                let target = conv
                    .participant_mut(user_id)
                    .filter(|p| !p.has_left())
                    .ok_or(AppError::NotFound)?;

                if target.role.is_admin() && admin_count == 1 && other_active > 0 {
                    return Err(AppError::InvalidOperation(
                        "cannot remove the last admin of a group".into(),
                    ));
                }

                let now = Utc::now();
                target.left_at = Some(now);
                target.left_seq = Some(last_seq);
                target.hidden_at = Some(now);
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::ParticipantChanged {
                conversation_id,
                user_id,
                change: ParticipantChange::Removed,
                role: None,
            },
        )
        .await;
        Ok(())
    }

    /// Change a member's role. Demoting the last admin is rejected so the
    /// group never ends up unmanaged.
    pub async fn update_role(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        actor: Uuid,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        let changed = store
            .update_conversation(conversation_id, |conv| -> AppResult<bool> {
                Self::require_group_admin(conv, actor)?;

                let admin_count = conv.active_admin_count();
                let target = conv
                    .participant_mut(user_id)
                    .filter(|p| p.is_active())
                    .ok_or(AppError::NotFound)?;

                if target.role == role {
                    return Ok(false);
                }
                if target.role.is_admin() && role == MemberRole::Member && admin_count == 1 {
                    return Err(AppError::InvalidOperation(
                        "a group must keep at least one admin".into(),
                    ));
                }
                target.role = role;
                Ok(true)
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        if changed {
            broadcast_event(
                registry,
                conversation_id,
                &ChatEvent::ParticipantChanged {
                    conversation_id,
                    user_id,
                    change: ParticipantChange::RoleChanged,
                    role: Some(role),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Rename a group. Admin-only.
    pub async fn rename_group(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        actor: Uuid,
        conversation_id: Uuid,
        name: String,
    ) -> AppResult<()> {
        Self::validate_group_name(&name)?;

        let _guard = store.lock_conversation(conversation_id).await;
        let new_name = store
            .update_conversation(conversation_id, |conv| -> AppResult<String> {
                Self::require_group_admin(conv, actor)?;
                conv.name = Some(name.clone());
                Ok(name.clone())
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::ConversationRenamed {
                conversation_id,
                name: new_name,
            },
        )
        .await;
        Ok(())
    }

    /// Leave a group. Terminal for the leaver. If the last admin leaves
    /// while other members remain, the most-senior remaining member is
    /// promoted so the group stays manageable.
    pub async fn leave_group(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        let outcome = store
            .update_conversation(conversation_id, |conv| -> AppResult<Option<Option<Uuid>>> {
                if conv.is_direct() {
                    return Err(AppError::InvalidOperation(
                        "cannot leave a direct conversation".into(),
                    ));
                }
                let last_seq = conv.last_seq;
                let leaver = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;
                if leaver.has_left() {
                    // Leaving twice is a no-op.
                    return Ok(None);
                }

                let was_admin = leaver.role.is_admin();
                let now = Utc::now();
                leaver.left_at = Some(now);
                leaver.left_seq = Some(last_seq);
                leaver.hidden_at = Some(now);

                let mut promoted = None;
                if was_admin && conv.active_admin_count() == 0 {
                    if let Some(successor) = conv.most_senior_active_member(user_id) {
                        if let Some(p) = conv.participant_mut(successor) {
                            p.role = MemberRole::Admin;
                            promoted = Some(successor);
                        }
                    }
                }
                Ok(Some(promoted))
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        let Some(promoted) = outcome else {
            return Ok(());
        };

        broadcast_event(
            registry,
            conversation_id,
            &ChatEvent::ParticipantChanged {
                conversation_id,
                user_id,
                change: ParticipantChange::Removed,
                role: None,
            },
        )
        .await;

        if let Some(successor) = promoted {
            tracing::info!(
                conversation_id = %conversation_id,
                successor = %successor,
                "last admin left, promoted most senior member"
            );
            broadcast_event(
                registry,
                conversation_id,
                &ChatEvent::ParticipantChanged {
                    conversation_id,
                    user_id: successor,
                    change: ParticipantChange::RoleChanged,
                    role: Some(MemberRole::Admin),
                },
            )
            .await;
        }
        Ok(())
    }

    /// Hide a conversation from the caller's views. `from_all_views` is the
    /// permanent removal and is only allowed for direct conversations or
    /// groups the caller already left.
    pub async fn set_hidden(
        store: &ChatStore,
        registry: &ConnectionRegistry,
        user_id: Uuid,
        conversation_id: Uuid,
        hidden: bool,
        from_all_views: bool,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                let is_direct = conv.is_direct();
                let participant = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;

                if from_all_views && hidden && !is_direct && !participant.has_left() {
                    return Err(AppError::InvalidOperation(
                        "a group can only be fully removed after leaving it".into(),
                    ));
                }

                let now = Utc::now();
                if hidden {
                    participant.hidden_at = Some(now);
                    if from_all_views {
                        participant.hidden_from_all = true;
                    }
                } else if from_all_views {
                    participant.hidden_from_all = false;
                    participant.hidden_at = None;
                } else {
                    participant.hidden_at = None;
                }
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)??;
        drop(_guard);

        notify_user_event(
            registry,
            user_id,
            &ChatEvent::ConversationHiddenChanged {
                conversation_id,
                hidden,
                from_all_views,
            },
        )
        .await;
        Ok(())
    }

    /// Toggle notification muting. Delivery and visibility are unaffected.
    pub async fn set_muted(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
        muted: bool,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                let participant = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;
                participant.muted = muted;
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)?
    }

    /// Clear the conversation history for this user only: a cursor set to
    /// the current last commit, not per-message markers.
    pub async fn clear_messages(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                let last_seq = conv.last_seq;
                let participant = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;
                participant.cleared_before_seq = participant.cleared_before_seq.max(last_seq);
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)?
    }

    /// Advance the delivery cursor (monotonic; clamped to the log head).
    pub async fn mark_delivered(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
        up_to_seq: i64,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                let last_seq = conv.last_seq;
                let participant = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;
                let ceiling = participant.left_seq.unwrap_or(last_seq);
                participant.delivered_seq =
                    participant.delivered_seq.max(up_to_seq.clamp(0, ceiling));
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)?
    }

    /// Advance the read cursor; reading implies delivery.
    pub async fn mark_read(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
        up_to_seq: i64,
    ) -> AppResult<()> {
        let _guard = store.lock_conversation(conversation_id).await;
        store
            .update_conversation(conversation_id, |conv| -> AppResult<()> {
                let last_seq = conv.last_seq;
                let participant = conv.participant_mut(user_id).ok_or(AppError::Forbidden)?;
                let ceiling = participant.left_seq.unwrap_or(last_seq);
                let target = up_to_seq.clamp(0, ceiling);
                participant.read_seq = participant.read_seq.max(target);
                participant.delivered_seq = participant.delivered_seq.max(target);
                Ok(())
            })
            .await
            .ok_or(AppError::NotFound)?
    }

    fn require_group_admin(conv: &Conversation, actor: Uuid) -> AppResult<()> {
        if conv.is_direct() {
            return Err(AppError::InvalidOperation(
                "membership of a direct conversation cannot change".into(),
            ));
        }
        let actor_p = conv.participant(actor).ok_or(AppError::Forbidden)?;
        if !actor_p.is_active() || !actor_p.role.is_admin() {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}
