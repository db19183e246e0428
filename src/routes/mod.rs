// Re-export route modules
pub mod conversations;
pub mod groups;
pub mod messages;
pub mod reactions;
pub mod wsroute;
