//! Read-receipt storage and derived unread counts.
//!
//! Receipts are write-once per (message, user); `INSERT OR IGNORE` makes
//! re-marking a no-op. Unread counts are always computed from the receipt
//! rows — there is no stored counter to drift.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::{ConversationId, MessageId, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Record that `user_id` has read `message_id`. Returns `true` if a
    /// receipt was created, `false` if one already existed.
    pub fn insert_receipt(
        &self,
        message_id: MessageId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at)
             VALUES (?1, ?2, ?3)",
            params![message_id.to_string(), user_id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Record receipts for a batch of messages in one transaction, so a
    /// concurrent reader observes either none or all of them.
    pub fn insert_receipts_batch(
        &mut self,
        message_ids: &[MessageId],
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> Result<usize> {
        let tx = self.conn_mut().transaction()?;
        let mut created = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO read_receipts (message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3)",
            )?;
            for message_id in message_ids {
                created += stmt.execute(params![
                    message_id.to_string(),
                    user_id.to_string(),
                    at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(created)
    }

    /// Whether a receipt exists for the pair.
    pub fn has_receipt(&self, message_id: MessageId, user_id: UserId) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM read_receipts
                            WHERE message_id = ?1 AND user_id = ?2)",
            params![message_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// Count of non-deleted messages in the conversation authored by
    /// someone else and not yet receipted by `user_id`. Derived on every
    /// call.
    pub fn unread_count(&self, conversation_id: ConversationId, user_id: UserId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM messages m
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.is_deleted = 0
               AND NOT EXISTS (SELECT 1 FROM read_receipts r
                               WHERE r.message_id = m.id AND r.user_id = ?2)",
            params![conversation_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Ids of the messages `unread_count` would count, in total order.
    /// Input to the batch mark-read path.
    pub fn unread_message_ids(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<Vec<MessageId>> {
        let mut stmt = self.conn().prepare(
            "SELECT m.id FROM messages m
             WHERE m.conversation_id = ?1
               AND m.sender_id != ?2
               AND m.is_deleted = 0
               AND NOT EXISTS (SELECT 1 FROM read_receipts r
                               WHERE r.message_id = m.id AND r.user_id = ?2)
             ORDER BY m.created_at ASC, m.rowid ASC",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), user_id.to_string()],
            |row| {
                let id_str: String = row.get(0)?;
                columns::uuid_col(0, &id_str).map(MessageId)
            },
        )?;

        let mut ids = Vec::new();
        for row in rows {
            ids.push(row?);
        }
        Ok(ids)
    }

    /// Ids of messages in the conversation that `user_id` has receipted.
    /// Used to annotate listings with `is_read`.
    pub fn read_message_ids(
        &self,
        conversation_id: ConversationId,
        user_id: UserId,
    ) -> Result<HashSet<MessageId>> {
        let mut stmt = self.conn().prepare(
            "SELECT r.message_id FROM read_receipts r
             JOIN messages m ON m.id = r.message_id
             WHERE m.conversation_id = ?1 AND r.user_id = ?2",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), user_id.to_string()],
            |row| {
                let id_str: String = row.get(0)?;
                columns::uuid_col(0, &id_str).map(MessageId)
            },
        )?;

        let mut ids = HashSet::new();
        for row in rows {
            ids.insert(row?);
        }
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::{Conversation, ConversationKind, JsonMap, Message, MessageKind};

    fn seed(db: &mut Database, a: UserId, b: UserId) -> ConversationId {
        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Direct,
            creator_id: a,
            participants: vec![a.min(b), a.max(b)],
            title: None,
            description: None,
            metadata: JsonMap::new(),
            is_active: true,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_conversation(&conversation).unwrap();
        conversation.id
    }

    fn send(db: &Database, conversation_id: ConversationId, sender_id: UserId) -> MessageId {
        let message = Message {
            id: MessageId::new(),
            conversation_id,
            sender_id,
            content: "hi".into(),
            kind: MessageKind::Text,
            parent_id: None,
            metadata: JsonMap::new(),
            reactions: Default::default(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: Utc::now(),
            seq: 0,
        };
        db.insert_message(&message).unwrap();
        message.id
    }

    #[test]
    fn receipt_insert_is_idempotent() {
        let mut db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let conversation_id = seed(&mut db, a, b);
        let message_id = send(&db, conversation_id, a);

        assert!(db.insert_receipt(message_id, b, Utc::now()).unwrap());
        assert!(!db.insert_receipt(message_id, b, Utc::now()).unwrap());
        assert_eq!(db.unread_count(conversation_id, b).unwrap(), 0);
    }

    #[test]
    fn unread_excludes_own_and_deleted() {
        let mut db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let conversation_id = seed(&mut db, a, b);

        send(&db, conversation_id, b); // b's own message
        let from_a = send(&db, conversation_id, a);
        let deleted = send(&db, conversation_id, a);
        db.mark_message_deleted(deleted, Utc::now()).unwrap();

        assert_eq!(db.unread_count(conversation_id, b).unwrap(), 1);
        assert_eq!(db.unread_message_ids(conversation_id, b).unwrap(), vec![from_a]);
    }

    #[test]
    fn batch_receipts_drain_unread() {
        let mut db = Database::open_in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let conversation_id = seed(&mut db, a, b);

        for _ in 0..3 {
            send(&db, conversation_id, a);
        }
        assert_eq!(db.unread_count(conversation_id, b).unwrap(), 3);

        let ids = db.unread_message_ids(conversation_id, b).unwrap();
        let created = db.insert_receipts_batch(&ids, b, Utc::now()).unwrap();
        assert_eq!(created, 3);
        assert_eq!(db.unread_count(conversation_id, b).unwrap(), 0);
    }
}
