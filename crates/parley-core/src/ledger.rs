//! Message append, retrieval, and mutation.
//!
//! All mutations publish `MessageEvent`s while the store lock is held, so
//! a single conversation's events reach the bus in creation order.

use chrono::Utc;
use serde::Serialize;

use parley_shared::{
    Caller, ConversationId, EventPayload, JsonMap, Message, MessageAction, MessageId, MessageKind,
};

use crate::bus::EventBus;
use crate::error::{ChatError, Result};
use crate::handle::{self, StoreHandle};
use crate::notify::Notifier;

/// A message annotated with the caller's read state. `is_read` is true
/// for the caller's own messages without a stored receipt.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    #[serde(flatten)]
    pub message: Message,
    pub is_read: bool,
}

/// Appends messages, retrieves ordered history, and applies
/// soft-delete/edit semantics.
#[derive(Clone)]
pub struct MessageLedger {
    db: StoreHandle,
    bus: EventBus,
    notifier: Notifier,
}

impl MessageLedger {
    pub(crate) fn new(db: StoreHandle, bus: EventBus, notifier: Notifier) -> Self {
        Self { db, bus, notifier }
    }

    /// Append a message to a conversation the caller participates in.
    ///
    /// Publishes `MessageEvent(sent)` and `ConversationChanged`, and hands
    /// notifications to the sink for recipients whose preferences allow
    /// delivery. Never retried internally: a failure surfaces as-is so the
    /// caller decides, avoiding duplicate sends.
    pub fn send_message(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
        content: &str,
        kind: MessageKind,
        parent_id: Option<MessageId>,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput("message content must not be empty".into()));
        }

        let db = handle::lock(&self.db)?;

        let mut conversation = db.get_conversation(conversation_id)?;
        if !conversation.is_active {
            return Err(ChatError::NotFound);
        }
        if !conversation.participants.contains(&caller.user_id) {
            return Err(ChatError::NotParticipant);
        }

        if let Some(parent_id) = parent_id {
            let parent = db.get_message(parent_id)?;
            if parent.conversation_id != conversation_id {
                return Err(ChatError::InvalidInput(
                    "reply parent belongs to a different conversation".into(),
                ));
            }
        }

        let now = Utc::now();
        let mut message = Message {
            id: MessageId::new(),
            conversation_id,
            sender_id: caller.user_id,
            content: content.to_string(),
            kind,
            parent_id,
            metadata: JsonMap::new(),
            reactions: Default::default(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            seq: 0,
        };
        message.seq = db.insert_message(&message)?;
        db.touch_conversation(conversation_id, now)?;
        conversation.last_message_at = Some(now);
        conversation.updated_at = now;

        // Publish before releasing the store lock: this is what keeps one
        // conversation's MessageEvent stream in creation order.
        self.bus.publish(EventPayload::MessageEvent {
            action: MessageAction::Sent,
            message: message.clone(),
        });
        self.bus.publish(EventPayload::ConversationChanged {
            conversation: conversation.clone(),
        });
        self.notifier.message_sent(&db, &conversation, &message);
        drop(db);

        tracing::info!(message = %message.id, conversation = %conversation_id, "message sent");
        Ok(message)
    }

    /// Non-deleted messages of the conversation in total order, annotated
    /// with the caller's read state.
    pub fn list_messages(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessageView>> {
        let db = handle::lock(&self.db)?;

        let conversation = db.get_conversation(conversation_id)?;
        if !conversation.is_active {
            return Err(ChatError::NotFound);
        }
        if !conversation.participants.contains(&caller.user_id) {
            return Err(ChatError::NotParticipant);
        }

        let messages = db.list_messages(conversation_id)?;
        let read = db.read_message_ids(conversation_id, caller.user_id)?;

        Ok(messages
            .into_iter()
            .map(|message| {
                let is_read = message.sender_id == caller.user_id || read.contains(&message.id);
                MessageView { message, is_read }
            })
            .collect())
    }

    /// Fetch a single message, deleted or not. Used to resolve reply
    /// parents; participant-membership authorized like every read.
    pub fn get_message(&self, caller: &Caller, message_id: MessageId) -> Result<Message> {
        let db = handle::lock(&self.db)?;
        let message = db.get_message(message_id)?;
        if !db.is_participant(message.conversation_id, caller.user_id)? {
            return Err(ChatError::NotParticipant);
        }
        Ok(message)
    }

    /// Replace a message's content. Sender only; deleted messages cannot
    /// be edited.
    pub fn edit_message(
        &self,
        caller: &Caller,
        message_id: MessageId,
        content: &str,
    ) -> Result<Message> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::InvalidInput("message content must not be empty".into()));
        }

        let db = handle::lock(&self.db)?;
        let mut message = db.get_message(message_id)?;
        if message.is_deleted {
            return Err(ChatError::NotFound);
        }
        if message.sender_id != caller.user_id {
            return Err(ChatError::NotParticipant);
        }

        let now = Utc::now();
        db.mark_message_edited(message_id, content, now)?;
        message.content = content.to_string();
        message.is_edited = true;
        message.edited_at = Some(now);

        self.bus.publish(EventPayload::MessageEvent {
            action: MessageAction::Edited,
            message: message.clone(),
        });
        drop(db);

        tracing::info!(message = %message_id, "message edited");
        Ok(message)
    }

    /// Soft-delete a message. Sender only; idempotent. The id stays
    /// resolvable for replies.
    pub fn delete_message(&self, caller: &Caller, message_id: MessageId) -> Result<()> {
        let db = handle::lock(&self.db)?;
        let mut message = db.get_message(message_id)?;
        if message.sender_id != caller.user_id {
            return Err(ChatError::NotParticipant);
        }
        if message.is_deleted {
            return Ok(());
        }

        let now = Utc::now();
        db.mark_message_deleted(message_id, now)?;
        message.is_deleted = true;
        message.deleted_at = Some(now);

        self.bus.publish(EventPayload::MessageEvent {
            action: MessageAction::Deleted,
            message,
        });
        drop(db);

        tracing::info!(message = %message_id, "message deleted");
        Ok(())
    }

    /// Upsert the caller's emoji reaction on a message. One reaction per
    /// user; the latest call wins.
    pub fn add_reaction(
        &self,
        caller: &Caller,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<Message> {
        let emoji = emoji.trim();
        if emoji.is_empty() {
            return Err(ChatError::InvalidInput("reaction emoji must not be empty".into()));
        }

        let db = handle::lock(&self.db)?;
        let mut message = db.get_message(message_id)?;
        if message.is_deleted {
            return Err(ChatError::NotFound);
        }
        if !db.is_participant(message.conversation_id, caller.user_id)? {
            return Err(ChatError::NotParticipant);
        }

        db.upsert_reaction(message_id, caller.user_id, emoji, Utc::now())?;
        message.reactions.insert(caller.user_id, emoji.to_string());

        self.bus.publish(EventPayload::MessageEvent {
            action: MessageAction::Reacted,
            message: message.clone(),
        });
        drop(db);

        tracing::debug!(message = %message_id, "reaction added");
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use parley_shared::UserId;
    use parley_store::Database;

    use crate::directory::ConversationDirectory;
    use crate::notify::LogSink;

    struct Fixture {
        directory: ConversationDirectory,
        ledger: MessageLedger,
        bus: EventBus,
        alice: Caller,
        bob: Caller,
        conversation_id: ConversationId,
    }

    fn fixture() -> Fixture {
        let db: StoreHandle = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let bus = EventBus::new(64);
        let directory = ConversationDirectory::new(Arc::clone(&db), bus.clone(), 3);
        let ledger = MessageLedger::new(Arc::clone(&db), bus.clone(), Notifier::new(Arc::new(LogSink)));

        let alice = Caller::new(UserId::new());
        let bob = Caller::new(UserId::new());
        let conversation = directory.get_or_create_direct(&alice, bob.user_id).unwrap();

        Fixture { directory, ledger, bus, alice, bob, conversation_id: conversation.id }
    }

    #[test]
    fn empty_content_is_rejected() {
        let f = fixture();
        let err = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "   \n", MessageKind::Text, None)
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn outsiders_cannot_send_or_list() {
        let f = fixture();
        let mallory = Caller::new(UserId::new());

        let err = f
            .ledger
            .send_message(&mallory, f.conversation_id, "hi", MessageKind::Text, None)
            .unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));

        let err = f.ledger.list_messages(&mallory, f.conversation_id).unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));
    }

    #[test]
    fn listing_is_ordered_and_annotated() {
        let f = fixture();
        f.ledger
            .send_message(&f.alice, f.conversation_id, "one", MessageKind::Text, None)
            .unwrap();
        f.ledger
            .send_message(&f.bob, f.conversation_id, "two", MessageKind::Text, None)
            .unwrap();
        f.ledger
            .send_message(&f.alice, f.conversation_id, "three", MessageKind::Text, None)
            .unwrap();

        let views = f.ledger.list_messages(&f.alice, f.conversation_id).unwrap();
        let contents: Vec<&str> = views.iter().map(|v| v.message.content.as_str()).collect();
        assert_eq!(contents, ["one", "two", "three"]);

        // Own messages read, Bob's unread until a receipt exists.
        assert!(views[0].is_read);
        assert!(!views[1].is_read);
        assert!(views[2].is_read);
    }

    #[test]
    fn only_the_sender_may_edit() {
        let f = fixture();
        let message = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "draft", MessageKind::Text, None)
            .unwrap();

        let err = f.ledger.edit_message(&f.bob, message.id, "hijack").unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));

        let edited = f.ledger.edit_message(&f.alice, message.id, "final").unwrap();
        assert_eq!(edited.content, "final");
        assert!(edited.is_edited);
    }

    #[test]
    fn deleted_parent_still_resolves_for_replies() {
        let f = fixture();
        let parent = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "root", MessageKind::Text, None)
            .unwrap();
        let reply = f
            .ledger
            .send_message(&f.bob, f.conversation_id, "reply", MessageKind::Text, Some(parent.id))
            .unwrap();

        f.ledger.delete_message(&f.alice, parent.id).unwrap();
        // Idempotent.
        f.ledger.delete_message(&f.alice, parent.id).unwrap();

        let views = f.ledger.list_messages(&f.bob, f.conversation_id).unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].message.id, reply.id);
        assert_eq!(views[0].message.parent_id, Some(parent.id));

        let resolved = f.ledger.get_message(&f.bob, parent.id).unwrap();
        assert!(resolved.is_deleted);
    }

    #[test]
    fn reply_parent_must_share_the_conversation() {
        let f = fixture();
        let group = f
            .directory
            .create_group(&f.alice, vec![f.bob.user_id, UserId::new()], None)
            .unwrap();
        let elsewhere = f
            .ledger
            .send_message(&f.alice, group.id, "in the group", MessageKind::Text, None)
            .unwrap();

        let err = f
            .ledger
            .send_message(
                &f.bob,
                f.conversation_id,
                "cross-reply",
                MessageKind::Text,
                Some(elsewhere.id),
            )
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn reaction_upsert_keeps_latest() {
        let f = fixture();
        let message = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "react to me", MessageKind::Text, None)
            .unwrap();

        f.ledger.add_reaction(&f.bob, message.id, "👍").unwrap();
        let updated = f.ledger.add_reaction(&f.bob, message.id, "🎉").unwrap();

        assert_eq!(updated.reactions.len(), 1);
        assert_eq!(updated.reactions.get(&f.bob.user_id).map(String::as_str), Some("🎉"));
    }

    #[tokio::test]
    async fn message_events_arrive_in_creation_order() {
        let f = fixture();
        let mut subscription = f.bus.subscribe();

        let first = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "first", MessageKind::Text, None)
            .unwrap();
        let second = f
            .ledger
            .send_message(&f.bob, f.conversation_id, "second", MessageKind::Text, None)
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 2 {
            let envelope = subscription.recv().await.unwrap();
            if let EventPayload::MessageEvent { action: MessageAction::Sent, message } = envelope.payload {
                seen.push(message.id);
            }
        }
        assert_eq!(seen, [first.id, second.id]);
    }
}
