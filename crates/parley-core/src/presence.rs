//! Per-user online/typing signals with read-time staleness expiry.
//!
//! Presence is advisory. Writes are last-writer-wins upserts stamped with
//! the current time; staleness is applied when reading, never by mutating
//! stored rows, so readers cannot race a background sweep.

use chrono::{Duration, Utc};

use parley_shared::{Caller, ConversationId, EventPayload, Presence, PresenceStatus, UserId};

use crate::bus::EventBus;
use crate::error::{ChatError, Result};
use crate::handle::{self, StoreHandle};

/// Tracks per-user presence and typing state.
#[derive(Clone)]
pub struct PresenceRegistry {
    db: StoreHandle,
    bus: EventBus,
    stale_after: Duration,
}

impl PresenceRegistry {
    pub(crate) fn new(db: StoreHandle, bus: EventBus, stale_after: Duration) -> Self {
        Self { db, bus, stale_after }
    }

    /// Set the caller's status, stamping `last_seen` with the current
    /// time. Publishes `PresenceChanged`.
    pub fn set_status(&self, caller: &Caller, status: PresenceStatus) -> Result<Presence> {
        let db = handle::lock(&self.db)?;

        let mut presence = db
            .get_presence(caller.user_id)?
            .unwrap_or_else(|| Presence::offline(caller.user_id));
        presence.status = status;
        presence.last_seen = Utc::now();
        db.upsert_presence(&presence)?;

        self.bus.publish(EventPayload::PresenceChanged {
            user_id: caller.user_id,
            status: presence.status,
            last_seen: presence.last_seen,
        });
        drop(db);

        tracing::debug!(user = %caller.user_id, status = status.as_str(), "presence updated");
        Ok(presence)
    }

    /// Set (or clear, with `None`) the conversation the caller is typing
    /// in. The conversation must be one the caller participates in.
    /// Publishes `TypingChanged`.
    pub fn set_typing(
        &self,
        caller: &Caller,
        conversation_id: Option<ConversationId>,
    ) -> Result<Presence> {
        let db = handle::lock(&self.db)?;

        if let Some(conversation_id) = conversation_id {
            let conversation = db.get_conversation(conversation_id)?;
            if !conversation.is_active {
                return Err(ChatError::NotFound);
            }
            if !conversation.participants.contains(&caller.user_id) {
                return Err(ChatError::NotParticipant);
            }
        }

        let mut presence = db
            .get_presence(caller.user_id)?
            .unwrap_or_else(|| Presence::offline(caller.user_id));
        presence.typing_in = conversation_id;
        presence.last_seen = Utc::now();
        db.upsert_presence(&presence)?;

        self.bus.publish(EventPayload::TypingChanged {
            user_id: caller.user_id,
            conversation_id,
        });
        drop(db);

        tracing::debug!(user = %caller.user_id, "typing state updated");
        Ok(presence)
    }

    /// A user's presence as consumers should interpret it: a synthesized
    /// `offline` default when no record exists, and any record older than
    /// the staleness threshold reported as `offline` with its typing flag
    /// suppressed.
    pub fn get_presence(&self, user_id: UserId) -> Result<Presence> {
        let db = handle::lock(&self.db)?;
        let stored = db.get_presence(user_id)?;
        drop(db);

        let mut presence = stored.unwrap_or_else(|| Presence::offline(user_id));
        if Utc::now() - presence.last_seen > self.stale_after {
            presence.status = PresenceStatus::Offline;
            presence.typing_in = None;
        }
        Ok(presence)
    }
}
