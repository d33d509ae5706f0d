//! Reaction storage: one active emoji per (message, user), latest wins.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use rusqlite::params;

use parley_shared::{MessageId, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Upsert a user's reaction on a message. Re-reacting replaces the
    /// previous emoji.
    pub fn upsert_reaction(
        &self,
        message_id: MessageId,
        user_id: UserId,
        emoji: &str,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn().execute(
            "INSERT INTO message_reactions (message_id, user_id, emoji, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(message_id, user_id)
             DO UPDATE SET emoji = excluded.emoji, created_at = excluded.created_at",
            params![
                message_id.to_string(),
                user_id.to_string(),
                emoji,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// The reaction map (user id -> emoji) for one message.
    pub fn reactions_for_message(&self, message_id: MessageId) -> Result<BTreeMap<UserId, String>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, emoji FROM message_reactions WHERE message_id = ?1",
        )?;

        let rows = stmt.query_map(params![message_id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            let emoji: String = row.get(1)?;
            Ok((UserId(columns::uuid_col(0, &user_str)?), emoji))
        })?;

        let mut reactions = BTreeMap::new();
        for row in rows {
            let (user_id, emoji) = row?;
            reactions.insert(user_id, emoji);
        }
        Ok(reactions)
    }

    /// Get reactions for multiple messages at once (batch query).
    pub fn reactions_for_messages(
        &self,
        message_ids: &[MessageId],
    ) -> Result<HashMap<MessageId, BTreeMap<UserId, String>>> {
        let mut map = HashMap::new();
        for id in message_ids {
            let reactions = self.reactions_for_message(*id)?;
            if !reactions.is_empty() {
                map.insert(*id, reactions);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_shared::{Conversation, ConversationId, ConversationKind, JsonMap, Message, MessageKind};

    fn seed_message(db: &mut Database) -> MessageId {
        let now = Utc::now();
        let sender = UserId::new();
        let conversation = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Group,
            creator_id: sender,
            participants: vec![sender, UserId::new()],
            title: None,
            description: None,
            metadata: JsonMap::new(),
            is_active: true,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_conversation(&conversation).unwrap();

        let message = Message {
            id: MessageId::new(),
            conversation_id: conversation.id,
            sender_id: sender,
            content: "hello".into(),
            kind: MessageKind::Text,
            parent_id: None,
            metadata: JsonMap::new(),
            reactions: Default::default(),
            is_edited: false,
            edited_at: None,
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            seq: 0,
        };
        db.insert_message(&message).unwrap();
        message.id
    }

    #[test]
    fn latest_reaction_wins() {
        let mut db = Database::open_in_memory().unwrap();
        let message_id = seed_message(&mut db);
        let user_id = UserId::new();

        db.upsert_reaction(message_id, user_id, "👍", Utc::now()).unwrap();
        db.upsert_reaction(message_id, user_id, "❤️", Utc::now()).unwrap();

        let reactions = db.reactions_for_message(message_id).unwrap();
        assert_eq!(reactions.len(), 1);
        assert_eq!(reactions.get(&user_id).map(String::as_str), Some("❤️"));
    }
}
