//! Group management endpoints
//!
//! All endpoints here require the conversation to be a group; the service
//! layer enforces the admin checks and the minimum-one-admin invariant
//! inside the conversation's atomic update path.

use crate::{
    error::AppError,
    middleware::guards::{ConversationMember, User},
    models::MemberRole,
    services::conversation_service::ConversationService,
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct UpdateMemberRequest {
    pub role: String, // "member" or "admin"
}

#[derive(Deserialize)]
pub struct RenameGroupRequest {
    pub name: String,
}

#[derive(Serialize)]
pub struct GroupMemberInfo {
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct MembersListResponse {
    pub members: Vec<GroupMemberInfo>,
    pub total: usize,
}

// ============================================
// Endpoints
// ============================================

/// POST /conversations/{id}/members
/// Add a member to a group conversation
///
/// Authorization: requires admin role. Re-adding a user who left re-admits
/// them as a regular member.
#[post("/conversations/{id}/members")]
pub async fn add_member(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<AddMemberRequest>,
) -> Result<HttpResponse, AppError> {
    ConversationService::add_participant(
        &state.store,
        &state.registry,
        state.identity.as_ref(),
        user.id,
        conversation_id.into_inner(),
        body.user_id,
    )
    .await?;
    Ok(HttpResponse::Created().finish())
}

/// DELETE /conversations/{id}/members/{user_id}
/// Remove a member from a group conversation
///
/// Authorization: requires admin role. Removing yourself is a leave and
/// follows the leave policy (last-admin promotion included).
#[delete("/conversations/{id}/members/{user_id}")]
pub async fn remove_member(
    state: web::Data<AppState>,
    requesting_user: User,
    path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, target_user_id) = path.into_inner();
    ConversationService::remove_participant(
        &state.store,
        &state.registry,
        requesting_user.id,
        conversation_id,
        target_user_id,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /conversations/{id}/members/{user_id}/role
/// Update a member's role in a group conversation
///
/// Authorization: requires admin role. Demoting the last admin is rejected.
#[put("/conversations/{id}/members/{user_id}/role")]
pub async fn update_member_role(
    state: web::Data<AppState>,
    requesting_user: User,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<UpdateMemberRequest>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, target_user_id) = path.into_inner();
    let role = MemberRole::parse(&body.role)
        .ok_or_else(|| AppError::BadRequest("Invalid role".into()))?;

    ConversationService::update_role(
        &state.store,
        &state.registry,
        requesting_user.id,
        conversation_id,
        target_user_id,
        role,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /conversations/{id}/name
/// Rename a group
///
/// Authorization: requires admin role
#[put("/conversations/{id}/name")]
pub async fn rename_group(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<RenameGroupRequest>,
) -> Result<HttpResponse, AppError> {
    ConversationService::rename_group(
        &state.store,
        &state.registry,
        user.id,
        conversation_id.into_inner(),
        body.into_inner().name,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /conversations/{id}/members
/// List the active members of a group conversation
///
/// Authorization: requires membership
#[get("/conversations/{id}/members")]
pub async fn list_members(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let member = ConversationMember::verify(&state.store, user.id, conversation_id).await?;
    member.require_group()?;

    let conversation = state
        .store
        .conversation(conversation_id)
        .await
        .ok_or(AppError::NotFound)?;

    let mut members: Vec<GroupMemberInfo> = conversation
        .active_participants()
        .map(|p| GroupMemberInfo {
            user_id: p.user_id,
            role: p.role.as_str().to_string(),
            joined_at: p.joined_at,
        })
        .collect();
    // Admins first, then join order.
    members.sort_by(|a, b| {
        let rank = |role: &str| if role == "admin" { 0 } else { 1 };
        rank(&a.role)
            .cmp(&rank(&b.role))
            .then(a.joined_at.cmp(&b.joined_at))
    });

    let total = members.len();
    Ok(HttpResponse::Ok().json(MembersListResponse { members, total }))
}
