//! Domain model structs persisted by the store layer.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! directly to an embedding host or carried inside a realtime event.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConversationId, ConversationKind, JsonMap, MessageId, MessageKind, PresenceStatus, UserId};

// ---------------------------------------------------------------------------
// User profile
// ---------------------------------------------------------------------------

/// A locally cached user profile, synced from the identity provider.
/// Backs display-title derivation for conversation listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Conversation
// ---------------------------------------------------------------------------

/// A conversation grouping a fixed set of participants and an ordered
/// message history.
///
/// For kind `direct` the participant set has exactly two distinct ids and
/// at most one active conversation exists per unordered pair; the store
/// enforces this with a unique index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub kind: ConversationKind,
    pub creator_id: UserId,
    /// Unique participant ids, sorted. Order carries no meaning.
    pub participants: Vec<UserId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub metadata: JsonMap,
    /// Soft-deactivation flag. Conversations are never hard-deleted.
    pub is_active: bool,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single message inside a conversation.
///
/// Messages are totally ordered by `created_at`, ties broken by `seq` (the
/// store's insertion sequence). Deleted messages are excluded from default
/// reads but their id stays resolvable for threaded replies.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub kind: MessageKind,
    /// Parent message for threaded replies, always within the same
    /// conversation.
    pub parent_id: Option<MessageId>,
    pub metadata: JsonMap,
    /// One active emoji reaction per user; the latest call wins.
    pub reactions: BTreeMap<UserId, String>,
    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Insertion sequence assigned by the store; tie-breaker for the total
    /// order.
    pub seq: i64,
}

// ---------------------------------------------------------------------------
// Read receipt
// ---------------------------------------------------------------------------

/// A marker recording that `user_id` has read `message_id`. At most one
/// exists per pair; senders never get receipts for their own messages.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message_id: MessageId,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Presence
// ---------------------------------------------------------------------------

/// Best-effort presence record, one per user. Advisory only: consumers must
/// apply the staleness threshold at read time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Presence {
    pub user_id: UserId,
    pub status: PresenceStatus,
    /// Conversation the user is currently typing in, if any.
    pub typing_in: Option<ConversationId>,
    pub metadata: JsonMap,
    pub last_seen: DateTime<Utc>,
}

impl Presence {
    /// Synthesized record for users with no stored presence.
    pub fn offline(user_id: UserId) -> Self {
        Self {
            user_id,
            status: PresenceStatus::Offline,
            typing_in: None,
            metadata: JsonMap::new(),
            last_seen: DateTime::UNIX_EPOCH,
        }
    }
}

// ---------------------------------------------------------------------------
// Notification preferences
// ---------------------------------------------------------------------------

/// A daily do-not-disturb window in minutes since midnight, UTC.
///
/// `start > end` wraps past midnight; `start == end` is an empty window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuietHours {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl QuietHours {
    pub fn contains(&self, minute: u16) -> bool {
        if self.start_minute == self.end_minute {
            false
        } else if self.start_minute < self.end_minute {
            (self.start_minute..self.end_minute).contains(&minute)
        } else {
            minute >= self.start_minute || minute < self.end_minute
        }
    }
}

/// Per-user delivery settings, one record per user. Absence implies the
/// default: all channels enabled, no quiet hours, no mutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationPreferences {
    pub user_id: UserId,
    pub email_enabled: bool,
    pub push_enabled: bool,
    pub desktop_enabled: bool,
    pub sound_enabled: bool,
    pub quiet_hours: Option<QuietHours>,
    pub muted_conversations: BTreeSet<ConversationId>,
    pub metadata: JsonMap,
    pub updated_at: DateTime<Utc>,
}

impl NotificationPreferences {
    /// The documented default record, created lazily on first read.
    pub fn default_for(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            email_enabled: true,
            push_enabled: true,
            desktop_enabled: true,
            sound_enabled: true,
            quiet_hours: None,
            muted_conversations: BTreeSet::new(),
            metadata: JsonMap::new(),
            updated_at: now,
        }
    }

    /// Whether delivery for `conversation_id` is suppressed at `now`:
    /// the conversation is muted, or `now` falls inside the quiet-hours
    /// window. Neither condition affects message storage.
    pub fn is_muted_at(&self, conversation_id: ConversationId, now: DateTime<Utc>) -> bool {
        if self.muted_conversations.contains(&conversation_id) {
            return true;
        }
        match self.quiet_hours {
            Some(window) => {
                use chrono::Timelike;
                let minute = (now.hour() * 60 + now.minute()) as u16;
                window.contains(minute)
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quiet_hours_plain_window() {
        let window = QuietHours { start_minute: 60, end_minute: 120 };
        assert!(!window.contains(59));
        assert!(window.contains(60));
        assert!(window.contains(119));
        assert!(!window.contains(120));
    }

    #[test]
    fn quiet_hours_wraps_past_midnight() {
        // 22:00 -> 07:00
        let window = QuietHours { start_minute: 1320, end_minute: 420 };
        assert!(window.contains(1350));
        assert!(window.contains(0));
        assert!(window.contains(419));
        assert!(!window.contains(420));
        assert!(!window.contains(720));
    }

    #[test]
    fn quiet_hours_empty_window() {
        let window = QuietHours { start_minute: 300, end_minute: 300 };
        assert!(!window.contains(300));
        assert!(!window.contains(0));
    }

    #[test]
    fn muted_set_suppresses_delivery() {
        let user = UserId::new();
        let conversation = ConversationId::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let mut prefs = NotificationPreferences::default_for(user, now);
        assert!(!prefs.is_muted_at(conversation, now));

        prefs.muted_conversations.insert(conversation);
        assert!(prefs.is_muted_at(conversation, now));
    }

    #[test]
    fn quiet_hours_suppress_delivery() {
        let user = UserId::new();
        let conversation = ConversationId::new();
        let mut prefs = NotificationPreferences::default_for(user, Utc::now());
        prefs.quiet_hours = Some(QuietHours { start_minute: 1320, end_minute: 420 });

        let night = Utc.with_ymd_and_hms(2026, 3, 1, 23, 30, 0).unwrap();
        let noon = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        assert!(prefs.is_muted_at(conversation, night));
        assert!(!prefs.is_muted_at(conversation, noon));
    }
}
