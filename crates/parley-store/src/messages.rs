//! CRUD operations for [`Message`] records.
//!
//! Rows are never physically removed; edit and delete flip flags. The
//! total order within a conversation is `created_at ASC, rowid ASC` — the
//! rowid is the insertion sequence and is surfaced as `Message::seq`.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::{ConversationId, Message, MessageId, MessageKind, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::{Result, StoreError};

const MESSAGE_COLUMNS: &str = "rowid, id, conversation_id, sender_id, content, kind, parent_id, \
     metadata, is_edited, edited_at, is_deleted, deleted_at, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new message. Returns the assigned insertion sequence.
    /// Reactions are never written here; a fresh message has none.
    pub fn insert_message(&self, message: &Message) -> Result<i64> {
        self.conn().execute(
            "INSERT INTO messages (id, conversation_id, sender_id, content, kind, parent_id,
                                   metadata, is_edited, edited_at, is_deleted, deleted_at,
                                   created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                message.id.to_string(),
                message.conversation_id.to_string(),
                message.sender_id.to_string(),
                message.content,
                message.kind.as_str(),
                message.parent_id.map(|p| p.to_string()),
                serde_json::to_string(&message.metadata)?,
                message.is_edited,
                message.edited_at.map(|t| t.to_rfc3339()),
                message.is_deleted,
                message.deleted_at.map(|t| t.to_rfc3339()),
                message.created_at.to_rfc3339(),
            ],
        )?;
        Ok(self.conn().last_insert_rowid())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a message by id, deleted or not, reactions included.
    pub fn get_message(&self, id: MessageId) -> Result<Message> {
        let mut message = self
            .conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })?;

        message.reactions = self.reactions_for_message(id)?;
        Ok(message)
    }

    /// Non-deleted messages of a conversation in total order, reactions
    /// included.
    pub fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1 AND is_deleted = 0
             ORDER BY created_at ASC, rowid ASC"
        ))?;

        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }

        let ids: Vec<MessageId> = messages.iter().map(|m| m.id).collect();
        let mut reactions = self.reactions_for_messages(&ids)?;
        for message in &mut messages {
            if let Some(map) = reactions.remove(&message.id) {
                message.reactions = map;
            }
        }
        Ok(messages)
    }

    /// The most recent non-deleted message of a conversation, if any.
    pub fn latest_message(&self, conversation_id: ConversationId) -> Result<Option<Message>> {
        let found = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND is_deleted = 0
                     ORDER BY created_at DESC, rowid DESC LIMIT 1"
                ),
                params![conversation_id.to_string()],
                row_to_message,
            )
            .optional()?;

        match found {
            Some(mut message) => {
                message.reactions = self.reactions_for_message(message.id)?;
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Replace the content and set the edited flag. Returns `true` if a
    /// row changed.
    pub fn mark_message_edited(
        &self,
        id: MessageId,
        content: &str,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET content = ?2, is_edited = 1, edited_at = ?3 WHERE id = ?1",
            params![id.to_string(), content, at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Soft-delete a message. The row and its id remain for reply
    /// integrity. Returns `true` if a row changed.
    pub fn mark_message_deleted(&self, id: MessageId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE messages SET is_deleted = 1, deleted_at = ?2 WHERE id = ?1",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Message`] with no reactions; callers fill
/// reactions from the reactions table.
fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let seq: i64 = row.get(0)?;
    let id_str: String = row.get(1)?;
    let conversation_str: String = row.get(2)?;
    let sender_str: String = row.get(3)?;
    let content: String = row.get(4)?;
    let kind_str: String = row.get(5)?;
    let parent_str: Option<String> = row.get(6)?;
    let metadata_str: String = row.get(7)?;
    let is_edited: bool = row.get(8)?;
    let edited_str: Option<String> = row.get(9)?;
    let is_deleted: bool = row.get(10)?;
    let deleted_str: Option<String> = row.get(11)?;
    let created_str: String = row.get(12)?;

    let kind = MessageKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            5,
            rusqlite::types::Type::Text,
            format!("unknown message kind: {kind_str}").into(),
        )
    })?;

    let parent_id = parent_str
        .map(|s| columns::uuid_col(6, &s).map(MessageId))
        .transpose()?;

    Ok(Message {
        id: MessageId(columns::uuid_col(1, &id_str)?),
        conversation_id: ConversationId(columns::uuid_col(2, &conversation_str)?),
        sender_id: UserId(columns::uuid_col(3, &sender_str)?),
        content,
        kind,
        parent_id,
        metadata: columns::json_map_col(7, &metadata_str)?,
        reactions: Default::default(),
        is_edited,
        edited_at: columns::opt_timestamp_col(9, edited_str)?,
        is_deleted,
        deleted_at: columns::opt_timestamp_col(11, deleted_str)?,
        created_at: columns::timestamp_col(12, &created_str)?,
        seq,
    })
}
