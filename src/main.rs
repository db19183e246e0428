use actix_web::{web, App, HttpResponse, HttpServer};
use realtime_messaging_service::{
    config, error, logging,
    metrics::CHAT_METRICS,
    presence::PresenceTracker,
    routes,
    state::AppState,
    store::ChatStore,
    websocket::events::{broadcast_event, ChatEvent},
    websocket::ConnectionRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Background expiry sweeper: clears stale typing entries and offline users
/// and pushes the corresponding TypingChanged / PresenceChanged events.
async fn run_presence_sweeper(
    store: ChatStore,
    registry: ConnectionRegistry,
    presence: PresenceTracker,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let report = presence.sweep().await;

        for (conversation_id, user_id) in report.typing_expired {
            broadcast_event(
                &registry,
                conversation_id,
                &ChatEvent::TypingChanged {
                    conversation_id,
                    user_id,
                    is_typing: false,
                },
            )
            .await;
        }

        for user_id in report.went_offline {
            announce_offline(&store, &registry, user_id).await;
        }
    }
}

async fn announce_offline(store: &ChatStore, registry: &ConnectionRegistry, user_id: Uuid) {
    for conv in store.conversations_of(user_id).await {
        let active = conv
            .participant(user_id)
            .map(|p| p.is_active())
            .unwrap_or(false);
        if active {
            broadcast_event(
                registry,
                conv.id,
                &ChatEvent::PresenceChanged {
                    user_id,
                    online: false,
                },
            )
            .await;
        }
    }
}

async fn metrics_endpoint() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(CHAT_METRICS.gather())
}

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(config::Config::from_env()?);

    let state = AppState::new(cfg.clone());

    // Presence/typing expiry runs for the lifetime of the process.
    tokio::spawn(run_presence_sweeper(
        state.store.clone(),
        state.registry.clone(),
        state.presence.clone(),
        cfg.sweep_interval(),
    ));

    let bind_addr = format!("0.0.0.0:{}", cfg.port);
    tracing::info!(%bind_addr, "starting realtime-messaging-service");

    let app_state = state.clone();
    let cors_origin = cfg.cors_allowed_origin.clone();

    HttpServer::new(move || {
        let cors = match cors_origin.as_deref() {
            Some(origin) => actix_cors::Cors::default()
                .allowed_origin(origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
            None => actix_cors::Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600),
        };

        App::new()
            .wrap(cors)
            .wrap(actix_middleware::RequestId::new())
            .wrap(actix_middleware::Logging)
            .wrap(actix_middleware::IdentityGateway::new())
            .app_data(web::Data::new(app_state.clone()))
            .service(routes::conversations::create_direct)
            .service(routes::conversations::create_group)
            .service(routes::conversations::list_conversations)
            .service(routes::conversations::get_conversation)
            .service(routes::conversations::set_hidden)
            .service(routes::conversations::set_muted)
            .service(routes::conversations::clear_messages)
            .service(routes::conversations::mark_read)
            .service(routes::conversations::typing_users)
            .service(routes::conversations::leave_group)
            .service(routes::groups::add_member)
            .service(routes::groups::remove_member)
            .service(routes::groups::update_member_role)
            .service(routes::groups::rename_group)
            .service(routes::groups::list_members)
            .service(routes::messages::send_message)
            .service(routes::messages::get_messages)
            .service(routes::messages::edit_message)
            .service(routes::messages::delete_message)
            .service(routes::reactions::toggle_reaction)
            .service(routes::reactions::get_reactions)
            .service(routes::wsroute::ws_handler)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics_endpoint))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run server: {e}")))
}
