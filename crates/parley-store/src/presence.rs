//! Presence storage: one row per user, last-writer-wins upsert.

use rusqlite::{params, OptionalExtension};

use parley_shared::{ConversationId, Presence, PresenceStatus, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Upsert a presence record wholesale.
    pub fn upsert_presence(&self, presence: &Presence) -> Result<()> {
        self.conn().execute(
            "INSERT INTO presence (user_id, status, typing_in, metadata, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                 status = excluded.status,
                 typing_in = excluded.typing_in,
                 metadata = excluded.metadata,
                 last_seen = excluded.last_seen",
            params![
                presence.user_id.to_string(),
                presence.status.as_str(),
                presence.typing_in.map(|c| c.to_string()),
                serde_json::to_string(&presence.metadata)?,
                presence.last_seen.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a user's stored presence record, if any. Staleness
    /// interpretation is the caller's job.
    pub fn get_presence(&self, user_id: UserId) -> Result<Option<Presence>> {
        let found = self
            .conn()
            .query_row(
                "SELECT user_id, status, typing_in, metadata, last_seen
                 FROM presence WHERE user_id = ?1",
                params![user_id.to_string()],
                row_to_presence,
            )
            .optional()?;
        Ok(found)
    }
}

fn row_to_presence(row: &rusqlite::Row<'_>) -> rusqlite::Result<Presence> {
    let user_str: String = row.get(0)?;
    let status_str: String = row.get(1)?;
    let typing_str: Option<String> = row.get(2)?;
    let metadata_str: String = row.get(3)?;
    let last_seen_str: String = row.get(4)?;

    let status = PresenceStatus::from_str(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            rusqlite::types::Type::Text,
            format!("unknown presence status: {status_str}").into(),
        )
    })?;

    let typing_in = typing_str
        .map(|s| columns::uuid_col(2, &s).map(ConversationId))
        .transpose()?;

    Ok(Presence {
        user_id: UserId(columns::uuid_col(0, &user_str)?),
        status,
        typing_in,
        metadata: columns::json_map_col(3, &metadata_str)?,
        last_seen: columns::timestamp_col(4, &last_seen_str)?,
    })
}
