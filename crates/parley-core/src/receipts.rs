//! Per-user read state: receipt recording and derived unread counts.
//!
//! Unread counts are recomputed from receipt rows on every read. Any
//! count held by a caller (e.g. on a conversation listing) is a
//! point-in-time snapshot and must be refreshed after a mutation.

use chrono::Utc;

use parley_shared::{Caller, ConversationId, MessageId};

use crate::error::{ChatError, Result};
use crate::handle::{self, StoreHandle};

/// Records per-user-per-message read events and derives unread counts.
#[derive(Clone)]
pub struct ReadReceiptTracker {
    db: StoreHandle,
}

impl ReadReceiptTracker {
    pub(crate) fn new(db: StoreHandle) -> Self {
        Self { db }
    }

    /// Record that the caller read a message. Idempotent: re-marking an
    /// already-read message is a no-op, and a sender is implicitly
    /// considered to have read their own messages without a stored
    /// receipt.
    pub fn mark_read(&self, caller: &Caller, message_id: MessageId) -> Result<()> {
        let db = handle::lock(&self.db)?;

        let message = db.get_message(message_id)?;
        if !db.is_participant(message.conversation_id, caller.user_id)? {
            return Err(ChatError::NotParticipant);
        }
        if message.sender_id == caller.user_id {
            return Ok(());
        }

        let created = db.insert_receipt(message_id, caller.user_id, Utc::now())?;
        if created {
            tracing::debug!(message = %message_id, user = %caller.user_id, "message marked read");
        }
        Ok(())
    }

    /// Mark every currently-unread message in the conversation as read,
    /// in one store transaction: a concurrent reader observes either none
    /// or all of the receipts. Returns the number of receipts created.
    pub fn mark_conversation_read(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<usize> {
        let mut db = handle::lock(&self.db)?;

        let conversation = db.get_conversation(conversation_id)?;
        if !conversation.is_active {
            return Err(ChatError::NotFound);
        }
        if !conversation.participants.contains(&caller.user_id) {
            return Err(ChatError::NotParticipant);
        }

        let unread = db.unread_message_ids(conversation_id, caller.user_id)?;
        if unread.is_empty() {
            return Ok(0);
        }

        let created = db.insert_receipts_batch(&unread, caller.user_id, Utc::now())?;
        tracing::info!(
            conversation = %conversation_id,
            user = %caller.user_id,
            count = created,
            "conversation marked read"
        );
        Ok(created)
    }

    /// Number of messages in the conversation authored by someone else
    /// with no receipt for the caller. Derived from authoritative receipt
    /// state on every call, never cached.
    pub fn unread_count(&self, caller: &Caller, conversation_id: ConversationId) -> Result<u64> {
        let db = handle::lock(&self.db)?;

        let conversation = db.get_conversation(conversation_id)?;
        if !conversation.participants.contains(&caller.user_id) {
            return Err(ChatError::NotParticipant);
        }

        Ok(db.unread_count(conversation_id, caller.user_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use parley_shared::{MessageKind, UserId};
    use parley_store::Database;

    use crate::bus::EventBus;
    use crate::directory::ConversationDirectory;
    use crate::ledger::MessageLedger;
    use crate::notify::{LogSink, Notifier};

    struct Fixture {
        ledger: MessageLedger,
        receipts: ReadReceiptTracker,
        alice: Caller,
        bob: Caller,
        conversation_id: ConversationId,
    }

    fn fixture() -> Fixture {
        let db: StoreHandle = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let bus = EventBus::new(64);
        let directory = ConversationDirectory::new(Arc::clone(&db), bus.clone(), 3);
        let ledger = MessageLedger::new(Arc::clone(&db), bus, Notifier::new(Arc::new(LogSink)));
        let receipts = ReadReceiptTracker::new(Arc::clone(&db));

        let alice = Caller::new(UserId::new());
        let bob = Caller::new(UserId::new());
        let conversation = directory.get_or_create_direct(&alice, bob.user_id).unwrap();

        Fixture { ledger, receipts, alice, bob, conversation_id: conversation.id }
    }

    #[test]
    fn double_mark_read_changes_nothing() {
        let f = fixture();
        let message = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "hi", MessageKind::Text, None)
            .unwrap();

        f.receipts.mark_read(&f.bob, message.id).unwrap();
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 0);

        f.receipts.mark_read(&f.bob, message.id).unwrap();
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 0);
    }

    #[test]
    fn own_messages_never_count_as_unread() {
        let f = fixture();
        let message = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "mine", MessageKind::Text, None)
            .unwrap();

        assert_eq!(f.receipts.unread_count(&f.alice, f.conversation_id).unwrap(), 0);
        // Marking one's own message read is a no-op, not an error.
        f.receipts.mark_read(&f.alice, message.id).unwrap();
    }

    #[test]
    fn each_foreign_message_adds_exactly_one() {
        let f = fixture();
        for n in 1..=3u64 {
            f.ledger
                .send_message(&f.alice, f.conversation_id, "ping", MessageKind::Text, None)
                .unwrap();
            assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), n);
        }
    }

    #[test]
    fn partial_read_leaves_the_rest_unread() {
        let f = fixture();
        let mut sent = Vec::new();
        for content in ["one", "two", "three"] {
            sent.push(
                f.ledger
                    .send_message(&f.alice, f.conversation_id, content, MessageKind::Text, None)
                    .unwrap(),
            );
        }
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 3);

        f.receipts.mark_read(&f.bob, sent[1].id).unwrap();
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 2);

        let views = f.ledger.list_messages(&f.bob, f.conversation_id).unwrap();
        let read_flags: Vec<bool> = views.iter().map(|v| v.is_read).collect();
        assert_eq!(read_flags, [false, true, false]);
    }

    #[test]
    fn mark_conversation_read_drains_to_zero() {
        let f = fixture();
        for _ in 0..4 {
            f.ledger
                .send_message(&f.alice, f.conversation_id, "ping", MessageKind::Text, None)
                .unwrap();
        }

        let created = f.receipts.mark_conversation_read(&f.bob, f.conversation_id).unwrap();
        assert_eq!(created, 4);
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 0);

        // Nothing left to mark.
        assert_eq!(f.receipts.mark_conversation_read(&f.bob, f.conversation_id).unwrap(), 0);
    }

    #[test]
    fn outsiders_cannot_read_counts() {
        let f = fixture();
        let mallory = Caller::new(UserId::new());
        let err = f.receipts.unread_count(&mallory, f.conversation_id).unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));
    }

    #[test]
    fn deleting_a_message_removes_it_from_unread() {
        let f = fixture();
        let message = f
            .ledger
            .send_message(&f.alice, f.conversation_id, "oops", MessageKind::Text, None)
            .unwrap();
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 1);

        f.ledger.delete_message(&f.alice, message.id).unwrap();
        assert_eq!(f.receipts.unread_count(&f.bob, f.conversation_id).unwrap(), 0);
    }
}
