//! CRUD operations for [`Conversation`] records.
//!
//! The unordered-pair uniqueness invariant for active direct conversations
//! is enforced here via the `idx_conversations_direct_pair` partial unique
//! index; a losing racer surfaces [`StoreError::Constraint`].

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use parley_shared::{Conversation, ConversationId, ConversationKind, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::{Result, StoreError};

/// Canonical key for an unordered participant pair: `"<min>:<max>"` of the
/// two sorted ids. Backs the direct-conversation uniqueness index.
pub fn direct_pair_key(a: UserId, b: UserId) -> String {
    let (lo, hi) = if a.0 <= b.0 { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

fn pair_key_for(conversation: &Conversation) -> Option<String> {
    match (conversation.kind, conversation.participants.as_slice()) {
        (ConversationKind::Direct, [a, b]) => Some(direct_pair_key(*a, *b)),
        _ => None,
    }
}

const CONVERSATION_COLUMNS: &str = "id, kind, creator_id, title, description, metadata, \
     is_active, last_message_at, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new conversation together with its participant rows, in one
    /// transaction.
    pub fn insert_conversation(&mut self, conversation: &Conversation) -> Result<()> {
        let pair_key = pair_key_for(conversation);
        let tx = self.conn_mut().transaction()?;

        tx.execute(
            "INSERT INTO conversations (id, kind, creator_id, title, description, metadata,
                                        direct_pair_key, is_active, last_message_at,
                                        created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                conversation.id.to_string(),
                conversation.kind.as_str(),
                conversation.creator_id.to_string(),
                conversation.title,
                conversation.description,
                serde_json::to_string(&conversation.metadata)?,
                pair_key,
                conversation.is_active,
                conversation.last_message_at.map(|t| t.to_rfc3339()),
                conversation.created_at.to_rfc3339(),
                conversation.updated_at.to_rfc3339(),
            ],
        )?;

        for user_id in &conversation.participants {
            tx.execute(
                "INSERT INTO conversation_participants (conversation_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    conversation.id.to_string(),
                    user_id.to_string(),
                    conversation.created_at.to_rfc3339(),
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single conversation by id, participants included.
    pub fn get_conversation(&self, id: ConversationId) -> Result<Conversation> {
        let mut conversation = self
            .conn()
            .query_row(
                &format!("SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"),
                params![id.to_string()],
                row_to_conversation,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => other.into(),
            })?;

        conversation.participants = self.conversation_participants(id)?;
        Ok(conversation)
    }

    /// List all active conversations the user participates in, most
    /// recently active first.
    pub fn list_conversations_for_user(&self, user_id: UserId) -> Result<Vec<Conversation>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE is_active = 1
               AND id IN (SELECT conversation_id FROM conversation_participants
                          WHERE user_id = ?1)
             ORDER BY COALESCE(last_message_at, created_at) DESC, id ASC"
        ))?;

        let rows = stmt.query_map(params![user_id.to_string()], row_to_conversation)?;

        let mut conversations = Vec::new();
        for row in rows {
            let mut conversation = row?;
            conversation.participants = self.conversation_participants(conversation.id)?;
            conversations.push(conversation);
        }
        Ok(conversations)
    }

    /// Look up the active direct conversation for an unordered pair key, if
    /// one exists.
    pub fn find_active_direct(&self, pair_key: &str) -> Result<Option<Conversation>> {
        let found = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {CONVERSATION_COLUMNS} FROM conversations
                     WHERE kind = 'direct' AND is_active = 1 AND direct_pair_key = ?1"
                ),
                params![pair_key],
                row_to_conversation,
            )
            .optional()?;

        match found {
            Some(mut conversation) => {
                conversation.participants = self.conversation_participants(conversation.id)?;
                Ok(Some(conversation))
            }
            None => Ok(None),
        }
    }

    /// Participant ids of a conversation, sorted.
    pub fn conversation_participants(&self, id: ConversationId) -> Result<Vec<UserId>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id FROM conversation_participants
             WHERE conversation_id = ?1 ORDER BY user_id ASC",
        )?;

        let rows = stmt.query_map(params![id.to_string()], |row| {
            let user_str: String = row.get(0)?;
            columns::uuid_col(0, &user_str).map(UserId)
        })?;

        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    /// Whether `user_id` participates in the conversation.
    pub fn is_participant(&self, id: ConversationId, user_id: UserId) -> Result<bool> {
        let exists: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM conversation_participants
                            WHERE conversation_id = ?1 AND user_id = ?2)",
            params![id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Stamp the conversation's last-message timestamp.
    pub fn touch_conversation(&self, id: ConversationId, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE conversations SET last_message_at = ?2, updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Flip the soft-deactivation flag. Returns `true` if a row changed.
    pub fn set_conversation_active(
        &self,
        id: ConversationId,
        is_active: bool,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE conversations SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), is_active, at.to_rfc3339()],
        )?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Conversation`] with an empty participant
/// list; callers fill participants from the join table.
fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let id_str: String = row.get(0)?;
    let kind_str: String = row.get(1)?;
    let creator_str: String = row.get(2)?;
    let title: Option<String> = row.get(3)?;
    let description: Option<String> = row.get(4)?;
    let metadata_str: String = row.get(5)?;
    let is_active: bool = row.get(6)?;
    let last_message_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let kind = ConversationKind::from_str(&kind_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown conversation kind: {kind_str}").into(),
        )
    })?;

    Ok(Conversation {
        id: ConversationId(columns::uuid_col(0, &id_str)?),
        kind,
        creator_id: UserId(columns::uuid_col(2, &creator_str)?),
        participants: Vec::new(),
        title,
        description,
        metadata: columns::json_map_col(5, &metadata_str)?,
        is_active,
        last_message_at: columns::opt_timestamp_col(7, last_message_str)?,
        created_at: columns::timestamp_col(8, &created_str)?,
        updated_at: columns::timestamp_col(9, &updated_str)?,
    })
}
