//! Conversation endpoints: creation, listing, and the per-user lifecycle
//! controls (hide, mute, clear, read cursor, leave).

use crate::{
    error::AppError,
    middleware::guards::{ConversationMember, User},
    services::conversation_service::ConversationService,
    state::AppState,
};
use actix_web::{get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

// ============================================
// Request/Response DTOs
// ============================================

#[derive(Deserialize)]
pub struct CreateDirectRequest {
    pub user_id: Uuid,
}

#[derive(Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub member_ids: Vec<Uuid>,
}

#[derive(Serialize)]
pub struct MemberInfo {
    pub user_id: Uuid,
    pub role: String,
    pub joined_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

#[derive(Serialize)]
pub struct ConversationResponse {
    pub id: Uuid,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub members: Vec<MemberInfo>,
    pub last_seq: i64,
    pub last_activity_at: DateTime<Utc>,
}

#[derive(Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_hidden: bool,
}

#[derive(Deserialize)]
pub struct HiddenRequest {
    pub hidden: bool,
    #[serde(default)]
    pub from_all_views: bool,
}

#[derive(Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

#[derive(Deserialize)]
pub struct ReadRequest {
    pub up_to_seq: i64,
}

// ============================================
// Endpoints
// ============================================

/// POST /conversations/direct
/// Find or create the direct conversation with another user. Idempotent:
/// racing calls for the same pair resolve to one conversation.
#[post("/conversations/direct")]
pub async fn create_direct(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateDirectRequest>,
) -> Result<HttpResponse, AppError> {
    let (conversation_id, created) = ConversationService::find_or_create_direct(
        &state.store,
        state.identity.as_ref(),
        user.id,
        body.user_id,
    )
    .await?;

    let payload = json!({ "conversation_id": conversation_id, "created": created });
    if created {
        Ok(HttpResponse::Created().json(payload))
    } else {
        Ok(HttpResponse::Ok().json(payload))
    }
}

/// POST /conversations/group
/// Create a group conversation; the caller becomes its sole admin.
#[post("/conversations/group")]
pub async fn create_group(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateGroupRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let conversation_id = ConversationService::create_group(
        &state.store,
        state.identity.as_ref(),
        user.id,
        &body.member_ids,
        body.name,
    )
    .await?;

    Ok(HttpResponse::Created().json(json!({ "conversation_id": conversation_id })))
}

/// GET /conversations
/// The caller's conversation list, most recently active first.
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, AppError> {
    let summaries =
        ConversationService::list_conversations(&state.store, user.id, query.include_hidden).await;
    Ok(HttpResponse::Ok().json(summaries))
}

/// GET /conversations/{id}
/// Conversation details with the active member list.
#[get("/conversations/{id}")]
pub async fn get_conversation(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation =
        ConversationService::get_for_user(&state.store, conversation_id.into_inner(), user.id)
            .await?;

    let mut members = Vec::new();
    for p in conversation.active_participants() {
        // Display names are a best-effort enrichment from the identity
        // service; the conversation payload stays usable without it.
        let display_name = match &state.identity {
            Some(identity) => identity
                .get_user(p.user_id)
                .await
                .ok()
                .flatten()
                .map(|profile| profile.display_name),
            None => None,
        };
        members.push(MemberInfo {
            user_id: p.user_id,
            role: p.role.as_str().to_string(),
            joined_at: p.joined_at,
            display_name,
        });
    }

    Ok(HttpResponse::Ok().json(ConversationResponse {
        id: conversation.id,
        kind: conversation.kind.as_str().to_string(),
        name: conversation.name.clone(),
        members,
        last_seq: conversation.last_seq,
        last_activity_at: conversation.last_activity_at,
    }))
}

/// PUT /conversations/{id}/hidden
/// Hide/unhide the conversation for the caller; `from_all_views` is the
/// permanent removal.
#[put("/conversations/{id}/hidden")]
pub async fn set_hidden(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<HiddenRequest>,
) -> Result<HttpResponse, AppError> {
    ConversationService::set_hidden(
        &state.store,
        &state.registry,
        user.id,
        conversation_id.into_inner(),
        body.hidden,
        body.from_all_views,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// PUT /conversations/{id}/mute
#[put("/conversations/{id}/mute")]
pub async fn set_muted(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<MuteRequest>,
) -> Result<HttpResponse, AppError> {
    ConversationService::set_muted(
        &state.store,
        user.id,
        conversation_id.into_inner(),
        body.muted,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /conversations/{id}/clear
/// Clear the history for the caller only.
#[post("/conversations/{id}/clear")]
pub async fn clear_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    ConversationService::clear_messages(&state.store, user.id, conversation_id.into_inner())
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /conversations/{id}/read
/// Advance the caller's read cursor (also acknowledges delivery).
#[post("/conversations/{id}/read")]
pub async fn mark_read(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<ReadRequest>,
) -> Result<HttpResponse, AppError> {
    ConversationService::mark_read(
        &state.store,
        user.id,
        conversation_id.into_inner(),
        body.up_to_seq,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /conversations/{id}/typing
/// Users currently typing in this conversation, never including the caller.
#[get("/conversations/{id}/typing")]
pub async fn typing_users(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation_id = conversation_id.into_inner();
    let member = ConversationMember::verify(&state.store, user.id, conversation_id).await?;
    member.require_active()?;

    let typing = state.presence.typing_users(conversation_id, user.id).await;
    Ok(HttpResponse::Ok().json(json!({
        "conversation_id": conversation_id,
        "typing": typing,
    })))
}

/// POST /conversations/{id}/leave
/// Leave a group. Terminal; rejoining requires an admin re-add.
#[post("/conversations/{id}/leave")]
pub async fn leave_group(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    ConversationService::leave_group(
        &state.store,
        &state.registry,
        user.id,
        conversation_id.into_inner(),
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}
