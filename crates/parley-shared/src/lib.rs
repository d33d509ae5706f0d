//! # parley-shared
//!
//! Identifier newtypes, domain models, and realtime event types shared by
//! the Parley messaging core and its storage layer.
//!
//! Everything here derives `Serialize`/`Deserialize` so records and events
//! can be handed directly to an embedding host.

pub mod events;
pub mod models;
pub mod types;

pub use events::{EventEnvelope, EventPayload, MessageAction};
pub use models::*;
pub use types::{Caller, ConversationId, ConversationKind, JsonMap, MessageId, MessageKind, PresenceStatus, UserId};
