use crate::{
    config::Config,
    presence::PresenceTracker,
    services::identity_client::{HttpIdentityClient, IdentityProvider},
    store::ChatStore,
    websocket::ConnectionRegistry,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: ChatStore,
    pub registry: ConnectionRegistry,
    pub presence: PresenceTracker,
    pub config: Arc<Config>,
    /// Identity provider; absent in degraded environments, in which case
    /// user existence checks are skipped with a warning.
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    pub fn new(config: Arc<Config>) -> Self {
        let identity: Option<Arc<dyn IdentityProvider>> = config
            .identity_service_url
            .as_deref()
            .map(|url| Arc::new(HttpIdentityClient::new(url)) as Arc<dyn IdentityProvider>);

        if identity.is_none() {
            tracing::warn!("IDENTITY_SERVICE_URL not set, user validation disabled");
        }

        Self {
            store: ChatStore::new(),
            registry: ConnectionRegistry::new(),
            presence: PresenceTracker::new(config.presence_timeout(), config.typing_ttl()),
            config,
            identity,
        }
    }
}
