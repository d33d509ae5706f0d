//! Realtime event envelope delivered over the event bus.
//!
//! The set of event kinds is a closed enum so every consumer match is
//! checked exhaustively by the compiler. Delivery is at-least-once;
//! handlers must treat re-application of an already-applied event as a
//! no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Conversation, Message};
use crate::types::{ConversationId, PresenceStatus, UserId};

/// What happened to a message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageAction {
    Sent,
    Edited,
    Deleted,
    Reacted,
}

/// Kind-specific payload of a realtime event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "payload")]
pub enum EventPayload {
    /// A message was sent, edited, deleted, or reacted to.
    MessageEvent { action: MessageAction, message: Message },

    /// A conversation was created, deactivated, or its listing row changed
    /// (e.g. a new last message). Carries the caller-independent record;
    /// per-caller annotations are derived by the consumer.
    ConversationChanged { conversation: Conversation },

    /// A user's presence status changed.
    PresenceChanged {
        user_id: UserId,
        status: PresenceStatus,
        last_seen: DateTime<Utc>,
    },

    /// A user started or stopped typing (`conversation_id = None`).
    TypingChanged {
        user_id: UserId,
        conversation_id: Option<ConversationId>,
    },
}

impl EventPayload {
    /// The conversation this event is scoped to, if any. Presence events
    /// and stopped-typing events are global.
    pub fn conversation_id(&self) -> Option<ConversationId> {
        match self {
            Self::MessageEvent { message, .. } => Some(message.conversation_id),
            Self::ConversationChanged { conversation } => Some(conversation.id),
            Self::PresenceChanged { .. } => None,
            Self::TypingChanged { conversation_id, .. } => *conversation_id,
        }
    }
}

/// Envelope wrapping every event published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EventEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<ConversationId>,
    pub emitted_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: EventPayload,
}

impl EventEnvelope {
    /// Wrap a payload, stamping the emission time and deriving the
    /// conversation scope from the payload.
    pub fn new(payload: EventPayload) -> Self {
        Self {
            conversation_id: payload.conversation_id(),
            emitted_at: Utc::now(),
            payload,
        }
    }
}
