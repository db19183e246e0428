pub mod conversation;
pub mod member;
pub mod message;

pub use conversation::{Conversation, ConversationKind};
pub use member::{MemberRole, Participant};
pub use message::{Attachment, DeliveryStatus, Message};
