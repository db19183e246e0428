//! Reaction endpoints
//!
//! A single toggle endpoint covers add, replace and remove: the service
//! applies the one state-transition rule and broadcasting follows.

use crate::{
    error::AppError,
    middleware::guards::User,
    services::reaction_service::ReactionService,
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct ToggleReactionRequest {
    pub emoji: String, // Unicode emoji or emoji code
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactionCount {
    pub emoji: String,
    pub count: i64,
    pub has_reacted: bool, // Whether the requesting user holds this reaction
}

#[derive(Serialize)]
pub struct ReactionsResponse {
    pub message_id: Uuid,
    pub reactions: Vec<ReactionCount>,
}

/// POST /messages/{id}/reactions
/// Toggle the caller's reaction: none -> emoji, same emoji -> none,
/// different emoji -> replace.
#[post("/messages/{id}/reactions")]
pub async fn toggle_reaction(
    state: web::Data<AppState>,
    message_id: web::Path<Uuid>,
    user: User,
    body: web::Json<ToggleReactionRequest>,
) -> Result<HttpResponse, AppError> {
    let message_id = message_id.into_inner();
    let reactions = ReactionService::toggle(
        &state.store,
        &state.registry,
        user.id,
        message_id,
        &body.emoji,
    )
    .await?;

    Ok(HttpResponse::Ok().json(ReactionsResponse {
        message_id,
        reactions,
    }))
}

/// GET /messages/{id}/reactions
/// Grouped reaction counts with the caller's own reaction flagged.
#[get("/messages/{id}/reactions")]
pub async fn get_reactions(
    state: web::Data<AppState>,
    message_id: web::Path<Uuid>,
    user: User,
) -> Result<HttpResponse, AppError> {
    let message_id = message_id.into_inner();
    let reactions = ReactionService::grouped_counts(&state.store, message_id, user.id).await?;
    Ok(HttpResponse::Ok().json(ReactionsResponse {
        message_id,
        reactions,
    }))
}
