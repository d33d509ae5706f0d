//! Push/export channel seam.
//!
//! The core hands finished [`Notification`] values to a host-provided
//! [`NotificationSink`] after preference filtering; formatting and
//! rendering are the sink's problem. Delivery is best-effort and never
//! fails the triggering operation.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

use parley_shared::{Conversation, ConversationId, Message, MessageId, NotificationPreferences, UserId};
use parley_store::Database;

/// Delivery channels a user can toggle in their preferences.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryChannel {
    Email,
    Push,
    Desktop,
    Sound,
}

/// A finished, preference-filtered notification.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notification {
    pub user_id: UserId,
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
    pub sender_id: UserId,
    /// Truncated message content; the sink decides how to render it.
    pub preview: String,
    /// Channels the recipient has enabled, never empty.
    pub channels: Vec<DeliveryChannel>,
}

/// Receives finished notifications. Implementations must not block: the
/// sender's request is on the line.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification);
}

/// Default sink that only logs. Useful for embedding hosts that render
/// notifications from bus events instead.
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) {
        tracing::info!(
            user = %notification.user_id,
            conversation = %notification.conversation_id,
            channels = notification.channels.len(),
            "notification delivered"
        );
    }
}

const MAX_PREVIEW_CHARS: usize = 120;

fn enabled_channels(preferences: &NotificationPreferences) -> Vec<DeliveryChannel> {
    let mut channels = Vec::new();
    if preferences.email_enabled {
        channels.push(DeliveryChannel::Email);
    }
    if preferences.push_enabled {
        channels.push(DeliveryChannel::Push);
    }
    if preferences.desktop_enabled {
        channels.push(DeliveryChannel::Desktop);
    }
    if preferences.sound_enabled {
        channels.push(DeliveryChannel::Sound);
    }
    channels
}

/// Fans a sent message out to the sink, one notification per recipient
/// whose preferences allow delivery.
#[derive(Clone)]
pub(crate) struct Notifier {
    sink: Arc<dyn NotificationSink>,
}

impl Notifier {
    pub(crate) fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self { sink }
    }

    pub(crate) fn message_sent(&self, db: &Database, conversation: &Conversation, message: &Message) {
        let now = Utc::now();
        let preview: String = message.content.chars().take(MAX_PREVIEW_CHARS).collect();

        for user_id in &conversation.participants {
            if *user_id == message.sender_id {
                continue;
            }

            let preferences = match db.get_preferences(*user_id) {
                Ok(Some(stored)) => stored,
                Ok(None) => NotificationPreferences::default_for(*user_id, now),
                Err(e) => {
                    // Best-effort: a preference read failure must not fail
                    // the send.
                    tracing::warn!(user = %user_id, error = %e, "preference lookup failed, skipping notification");
                    continue;
                }
            };

            if preferences.is_muted_at(conversation.id, now) {
                tracing::debug!(user = %user_id, conversation = %conversation.id, "notification suppressed");
                continue;
            }

            let channels = enabled_channels(&preferences);
            if channels.is_empty() {
                continue;
            }

            self.sink.deliver(&Notification {
                user_id: *user_id,
                conversation_id: conversation.id,
                message_id: message.id,
                sender_id: message.sender_id,
                preview: preview.clone(),
                channels,
            });
        }
    }
}
