pub mod conversation_service;
pub mod identity_client;
pub mod message_service;
pub mod reaction_service;

// Re-export key types for convenience
pub use conversation_service::{ConversationService, ConversationSummary};
pub use identity_client::{HttpIdentityClient, IdentityProvider, UserProfile};
pub use message_service::MessageService;
pub use reaction_service::ReactionService;
