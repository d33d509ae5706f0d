//! Notification preference storage: one row per user, merge semantics are
//! the core's job — the store reads and writes whole records.

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension};

use parley_shared::{ConversationId, NotificationPreferences, QuietHours, UserId};

use crate::columns;
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Upsert a preference record wholesale.
    pub fn upsert_preferences(&self, preferences: &NotificationPreferences) -> Result<()> {
        let muted: Vec<String> = preferences
            .muted_conversations
            .iter()
            .map(|c| c.to_string())
            .collect();

        self.conn().execute(
            "INSERT INTO notification_preferences
                 (user_id, email_enabled, push_enabled, desktop_enabled, sound_enabled,
                  quiet_start, quiet_end, muted, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id) DO UPDATE SET
                 email_enabled = excluded.email_enabled,
                 push_enabled = excluded.push_enabled,
                 desktop_enabled = excluded.desktop_enabled,
                 sound_enabled = excluded.sound_enabled,
                 quiet_start = excluded.quiet_start,
                 quiet_end = excluded.quiet_end,
                 muted = excluded.muted,
                 metadata = excluded.metadata,
                 updated_at = excluded.updated_at",
            params![
                preferences.user_id.to_string(),
                preferences.email_enabled,
                preferences.push_enabled,
                preferences.desktop_enabled,
                preferences.sound_enabled,
                preferences.quiet_hours.map(|q| q.start_minute),
                preferences.quiet_hours.map(|q| q.end_minute),
                serde_json::to_string(&muted)?,
                serde_json::to_string(&preferences.metadata)?,
                preferences.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a user's stored preference record, if any. Default synthesis
    /// (read-repair) is the caller's job.
    pub fn get_preferences(&self, user_id: UserId) -> Result<Option<NotificationPreferences>> {
        let found = self
            .conn()
            .query_row(
                "SELECT user_id, email_enabled, push_enabled, desktop_enabled, sound_enabled,
                        quiet_start, quiet_end, muted, metadata, updated_at
                 FROM notification_preferences WHERE user_id = ?1",
                params![user_id.to_string()],
                row_to_preferences,
            )
            .optional()?;
        Ok(found)
    }
}

fn row_to_preferences(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationPreferences> {
    let user_str: String = row.get(0)?;
    let email_enabled: bool = row.get(1)?;
    let push_enabled: bool = row.get(2)?;
    let desktop_enabled: bool = row.get(3)?;
    let sound_enabled: bool = row.get(4)?;
    let quiet_start: Option<u16> = row.get(5)?;
    let quiet_end: Option<u16> = row.get(6)?;
    let muted_str: String = row.get(7)?;
    let metadata_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let quiet_hours = match (quiet_start, quiet_end) {
        (Some(start_minute), Some(end_minute)) => Some(QuietHours { start_minute, end_minute }),
        _ => None,
    };

    let muted_ids: Vec<String> = serde_json::from_str(&muted_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let mut muted_conversations = BTreeSet::new();
    for id in &muted_ids {
        muted_conversations.insert(ConversationId(columns::uuid_col(7, id)?));
    }

    Ok(NotificationPreferences {
        user_id: UserId(columns::uuid_col(0, &user_str)?),
        email_enabled,
        push_enabled,
        desktop_enabled,
        sound_enabled,
        quiet_hours,
        muted_conversations,
        metadata: columns::json_map_col(8, &metadata_str)?,
        updated_at: columns::timestamp_col(9, &updated_str)?,
    })
}
