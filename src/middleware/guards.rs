//! Authorization guards that enforce permission checks at the type level
//! This prevents handlers from accidentally bypassing authorization

use std::future::Future;
use std::pin::Pin;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{ConversationKind, MemberRole};
use crate::store::ChatStore;
use actix_middleware::UserId;
use actix_web::{Error, FromRequest, HttpMessage, HttpRequest};

/// The authenticated caller, extracted from the gateway identity header.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
}

impl FromRequest for User {
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self, Self::Error>>>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let extensions = req.extensions();
        let user_id = extensions.get::<UserId>().map(|u| u.0);

        Box::pin(async move {
            let user_id = user_id.ok_or(AppError::Unauthorized)?;
            Ok(User { id: user_id })
        })
    }
}

/// A verified conversation member with the permission context handlers need.
/// One store read loads role, kind and the lifecycle flags together.
#[derive(Debug, Clone)]
pub struct ConversationMember {
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub role: MemberRole,
    pub kind: ConversationKind,
    pub muted: bool,
    pub has_left: bool,
    pub hidden_from_all: bool,
}

impl ConversationMember {
    pub async fn verify(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let conversation = store
            .conversation(conversation_id)
            .await
            .ok_or(AppError::NotFound)?;
        let participant = conversation
            .participant(user_id)
            .ok_or(AppError::Forbidden)?;

        Ok(ConversationMember {
            user_id,
            conversation_id,
            role: participant.role,
            kind: conversation.kind,
            muted: participant.muted,
            has_left: participant.has_left(),
            hidden_from_all: participant.hidden_from_all,
        })
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_group(&self) -> bool {
        self.kind == ConversationKind::Group
    }

    pub fn require_group(&self) -> Result<(), AppError> {
        if !self.is_group() {
            return Err(AppError::InvalidOperation(
                "operation requires a group conversation".into(),
            ));
        }
        Ok(())
    }

    /// Active members only: users who left or fully removed the
    /// conversation can no longer act in it.
    pub fn require_active(&self) -> Result<(), AppError> {
        if self.has_left || self.hidden_from_all {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }
}

/// A verified conversation admin; stricter than [`ConversationMember`].
#[derive(Debug, Clone)]
pub struct ConversationAdmin {
    pub inner: ConversationMember,
}

impl ConversationAdmin {
    pub async fn verify(
        store: &ChatStore,
        user_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Self, AppError> {
        let member = ConversationMember::verify(store, user_id, conversation_id).await?;
        member.require_active()?;

        if !member.is_admin() {
            return Err(AppError::Forbidden);
        }

        Ok(ConversationAdmin { inner: member })
    }
}
