//! WebSocket session endpoint
//!
//! One session per (conversation, connection). The socket carries the
//! high-frequency signals (typing, delivery/read acks) inbound and the
//! unified event stream outbound; request/response commands stay on REST.
//!
//! Liveness: the actor pings every 5 seconds and drops the connection after
//! 30 seconds of silence. Every pong refreshes the presence tracker; going
//! offline is detected by the background sweeper, not the disconnect, so a
//! quick reconnect does not flap presence.

use crate::error::AppError;
use crate::metrics::CHAT_METRICS;
use crate::middleware::guards::ConversationMember;
use crate::presence::PresenceTracker;
use crate::services::conversation_service::ConversationService;
use crate::state::AppState;
use crate::store::ChatStore;
use crate::websocket::events::{broadcast_event, ChatEvent};
use crate::websocket::message_types::WsInboundEvent;
use crate::websocket::{ConnectionRegistry, SubscriberId};
use actix::{Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler};
use actix_middleware::UserId;
use actix_web::{get, web, Error, HttpMessage, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub conversation_id: Uuid,
    /// Fallback for clients that cannot set headers on the upgrade request;
    /// the gateway strips this parameter for untrusted callers.
    pub user_id: Option<Uuid>,
}

// Payload forwarded from the connection registry to the session actor.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct BroadcastMessage(String);

struct WsSession {
    conversation_id: Uuid,
    user_id: Uuid,
    subscriber_id: SubscriberId,
    store: ChatStore,
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    hb: Instant,
}

/// Refresh the user's presence entry; on an offline-to-online transition
/// announce it to every conversation the user is active in.
async fn refresh_presence(
    store: ChatStore,
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    user_id: Uuid,
) {
    if !presence.heartbeat(user_id).await {
        return;
    }
    for conv in store.conversations_of(user_id).await {
        let active = conv
            .participant(user_id)
            .map(|p| p.is_active())
            .unwrap_or(false);
        if active {
            broadcast_event(
                &registry,
                conv.id,
                &ChatEvent::PresenceChanged {
                    user_id,
                    online: true,
                },
            )
            .await;
        }
    }
}

async fn handle_ws_event(
    user_id: Uuid,
    session_conversation_id: Uuid,
    evt: WsInboundEvent,
    store: ChatStore,
    registry: ConnectionRegistry,
    presence: PresenceTracker,
) {
    match evt {
        WsInboundEvent::Typing {
            conversation_id,
            is_typing,
        } => {
            // Events are scoped to this session's conversation.
            if conversation_id != session_conversation_id {
                return;
            }
            let changed = presence.set_typing(conversation_id, user_id, is_typing).await;
            if changed {
                broadcast_event(
                    &registry,
                    conversation_id,
                    &ChatEvent::TypingChanged {
                        conversation_id,
                        user_id,
                        is_typing,
                    },
                )
                .await;
            }
        }

        WsInboundEvent::Ack {
            conversation_id,
            up_to_seq,
        } => {
            if conversation_id != session_conversation_id {
                return;
            }
            if let Err(e) =
                ConversationService::mark_delivered(&store, user_id, conversation_id, up_to_seq)
                    .await
            {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    user_id = %user_id,
                    error = %e,
                    "delivery ack rejected"
                );
            }
        }

        WsInboundEvent::Read {
            conversation_id,
            up_to_seq,
        } => {
            if conversation_id != session_conversation_id {
                return;
            }
            if let Err(e) =
                ConversationService::mark_read(&store, user_id, conversation_id, up_to_seq).await
            {
                tracing::warn!(
                    conversation_id = %conversation_id,
                    user_id = %user_id,
                    error = %e,
                    "read ack rejected"
                );
            }
        }
    }
}

impl WsSession {
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                tracing::warn!(
                    conversation_id = %act.conversation_id,
                    user_id = %act.user_id,
                    "WebSocket heartbeat failed, disconnecting"
                );
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn touch(&mut self) {
        self.hb = Instant::now();
        actix::spawn(refresh_presence(
            self.store.clone(),
            self.registry.clone(),
            self.presence.clone(),
            self.user_id,
        ));
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(
            conversation_id = %self.conversation_id,
            user_id = %self.user_id,
            "WebSocket session started"
        );
        CHAT_METRICS.ws_connections.inc();
        self.hb(ctx);
        self.touch();
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(
            conversation_id = %self.conversation_id,
            user_id = %self.user_id,
            "WebSocket session stopped"
        );
        CHAT_METRICS.ws_connections.dec();

        let registry = self.registry.clone();
        let conversation_id = self.conversation_id;
        let user_id = self.user_id;
        let subscriber_id = self.subscriber_id;
        actix::spawn(async move {
            registry
                .remove_subscriber(conversation_id, user_id, subscriber_id)
                .await;
        });
    }
}

impl Handler<BroadcastMessage> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.touch();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.touch();
            }
            Ok(ws::Message::Text(text)) => {
                self.touch();
                match serde_json::from_str::<WsInboundEvent>(&text) {
                    Ok(evt) => {
                        actix::spawn(handle_ws_event(
                            self.user_id,
                            self.conversation_id,
                            evt,
                            self.store.clone(),
                            self.registry.clone(),
                            self.presence.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to parse WS message");
                    }
                }
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary WebSocket messages not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!("WebSocket close received: {:?}", reason);
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// GET /ws?conversation_id=...
/// Upgrade to a conversation event stream. The caller must be an active
/// member of the conversation.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let params = query.into_inner();

    let user_id = req
        .extensions()
        .get::<UserId>()
        .map(|u| u.0)
        .or(params.user_id)
        .ok_or(AppError::Unauthorized)?;

    let member = ConversationMember::verify(&state.store, user_id, params.conversation_id).await?;
    member.require_active()?;

    let (subscriber_id, mut rx) = state
        .registry
        .add_subscriber(params.conversation_id, user_id)
        .await;

    let session = WsSession {
        conversation_id: params.conversation_id,
        user_id,
        subscriber_id,
        store: state.store.clone(),
        registry: state.registry.clone(),
        presence: state.presence.clone(),
        hb: Instant::now(),
    };

    let (addr, resp) = ws::WsResponseBuilder::new(session, &req, stream).start_with_addr()?;

    // Bridge the registry channel into the session actor; ends when either
    // side goes away.
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if addr.try_send(BroadcastMessage(msg)).is_err() {
                break;
            }
        }
    });

    Ok(resp)
}
