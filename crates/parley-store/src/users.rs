//! Local user profile cache, synced from the identity provider. Backs
//! display-title derivation for conversation listings.

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension};

use parley_shared::{UserId, UserProfile};

use crate::columns;
use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Insert or refresh a profile. The display name is overwritten; the
    /// original created_at is kept.
    pub fn upsert_user(&self, profile: &UserProfile) -> Result<()> {
        self.conn().execute(
            "INSERT INTO users (id, display_name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET display_name = excluded.display_name",
            params![
                profile.id.to_string(),
                profile.display_name,
                profile.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch a cached profile, if any.
    pub fn get_user(&self, id: UserId) -> Result<Option<UserProfile>> {
        let found = self
            .conn()
            .query_row(
                "SELECT id, display_name, created_at FROM users WHERE id = ?1",
                params![id.to_string()],
                row_to_user,
            )
            .optional()?;
        Ok(found)
    }

    /// Resolve display names for a batch of users. Users without a cached
    /// profile (or without a name) are absent from the result.
    pub fn display_names(&self, ids: &[UserId]) -> Result<HashMap<UserId, String>> {
        let mut names = HashMap::new();
        for id in ids {
            if let Some(profile) = self.get_user(*id)? {
                if let Some(name) = profile.display_name {
                    names.insert(*id, name);
                }
            }
        }
        Ok(names)
    }
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let id_str: String = row.get(0)?;
    let display_name: Option<String> = row.get(1)?;
    let created_str: String = row.get(2)?;

    Ok(UserProfile {
        id: UserId(columns::uuid_col(0, &id_str)?),
        display_name,
        created_at: columns::timestamp_col(2, &created_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn upsert_refreshes_display_name() {
        let db = Database::open_in_memory().unwrap();
        let id = UserId::new();

        db.upsert_user(&UserProfile {
            id,
            display_name: Some("Alice".into()),
            created_at: Utc::now(),
        })
        .unwrap();

        db.upsert_user(&UserProfile {
            id,
            display_name: Some("Alice L.".into()),
            created_at: Utc::now(),
        })
        .unwrap();

        let stored = db.get_user(id).unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Alice L."));
    }

    #[test]
    fn display_names_skip_unknown_users() {
        let db = Database::open_in_memory().unwrap();
        let known = UserId::new();
        let unknown = UserId::new();

        db.upsert_user(&UserProfile {
            id: known,
            display_name: Some("Bob".into()),
            created_at: Utc::now(),
        })
        .unwrap();

        let names = db.display_names(&[known, unknown]).unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names.get(&known).map(String::as_str), Some("Bob"));
    }
}
