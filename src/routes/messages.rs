//! Message endpoints: send, history, edit, two-tier delete.

use crate::{
    error::AppError,
    middleware::guards::User,
    models::{Attachment, DeliveryStatus},
    routes::reactions::ReactionCount,
    services::message_service::MessageService,
    state::AppState,
};
use actix_web::{delete, get, post, put, web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================
// Request/Response DTOs
// ============================================

/// Read model of one message as a specific user sees it. Tombstones keep
/// their position with `deleted: true` and no content; `status` is derived
/// from the other participants' cursors at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub seq: i64,
    pub content: Option<String>,
    pub attachments: Vec<Attachment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub edited: bool,
    pub deleted: bool,
    pub status: DeliveryStatus,
    pub reactions: Vec<ReactionCount>,
}

#[derive(Deserialize)]
pub struct SendMessageRequest {
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Client-generated key making send retries safe after a timeout.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    /// Resume the sequence after this commit; omit for the beginning.
    #[serde(default)]
    pub after_seq: Option<i64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub for_everyone: bool,
}

// ============================================
// Endpoints
// ============================================

/// POST /conversations/{id}/messages
/// Send a message to a conversation
#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let dto = MessageService::send(
        &state.store,
        &state.registry,
        user.id,
        conversation_id.into_inner(),
        body.content,
        body.attachments,
        body.idempotency_key,
    )
    .await?;
    Ok(HttpResponse::Created().json(dto))
}

/// GET /conversations/{id}/messages
/// Visible history for the caller, ascending by commit order. Restartable
/// via `after_seq`.
#[get("/conversations/{id}/messages")]
pub async fn get_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<HistoryQuery>,
) -> Result<HttpResponse, AppError> {
    let messages = MessageService::list_visible(
        &state.store,
        conversation_id.into_inner(),
        user.id,
        query.after_seq,
        query.limit,
    )
    .await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// PUT /messages/{id}
/// Edit a message (author only)
#[put("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    MessageService::edit(
        &state.store,
        &state.registry,
        user.id,
        message_id.into_inner(),
        body.into_inner().content,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}

/// DELETE /messages/{id}?for_everyone=true|false
/// Delete a message: for everyone (author only, tombstones it) or just for
/// the caller. Idempotent either way.
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    query: web::Query<DeleteQuery>,
) -> Result<HttpResponse, AppError> {
    MessageService::delete(
        &state.store,
        &state.registry,
        user.id,
        message_id.into_inner(),
        query.for_everyone,
    )
    .await?;
    Ok(HttpResponse::NoContent().finish())
}
