//! Per-user notification delivery settings.
//!
//! Records are created lazily with defaults on first read (read-repair)
//! and updated by merge-upsert: unspecified patch fields leave the stored
//! value unchanged.

use std::collections::BTreeSet;

use chrono::Utc;
use serde::Deserialize;

use parley_shared::{Caller, ConversationId, JsonMap, NotificationPreferences, QuietHours};

use crate::error::{ChatError, Result};
use crate::handle::{self, StoreHandle};

/// Partial update for [`NotificationPreferences`]. `None` fields are left
/// unchanged; `quiet_hours` uses a nested `Option` so `Some(None)` clears
/// the window.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PreferencesPatch {
    pub email_enabled: Option<bool>,
    pub push_enabled: Option<bool>,
    pub desktop_enabled: Option<bool>,
    pub sound_enabled: Option<bool>,
    pub quiet_hours: Option<Option<QuietHours>>,
    /// Replaces the muted set wholesale when present; use
    /// [`NotificationPreferenceStore::mute_conversation`] for single
    /// toggles.
    pub muted_conversations: Option<BTreeSet<ConversationId>>,
    pub metadata: Option<JsonMap>,
}

/// Stores and evaluates per-user delivery settings.
#[derive(Clone)]
pub struct NotificationPreferenceStore {
    db: StoreHandle,
}

impl NotificationPreferenceStore {
    pub(crate) fn new(db: StoreHandle) -> Self {
        Self { db }
    }

    /// The caller's preferences, creating the default record on first
    /// access.
    pub fn get_preferences(&self, caller: &Caller) -> Result<NotificationPreferences> {
        let db = handle::lock(&self.db)?;

        if let Some(stored) = db.get_preferences(caller.user_id)? {
            return Ok(stored);
        }

        let defaults = NotificationPreferences::default_for(caller.user_id, Utc::now());
        db.upsert_preferences(&defaults)?;
        tracing::debug!(user = %caller.user_id, "created default notification preferences");
        Ok(defaults)
    }

    /// Merge a partial update into the caller's preferences and return
    /// the stored result.
    pub fn update_preferences(
        &self,
        caller: &Caller,
        patch: PreferencesPatch,
    ) -> Result<NotificationPreferences> {
        if let Some(Some(window)) = patch.quiet_hours {
            if window.start_minute >= 1440 || window.end_minute >= 1440 {
                return Err(ChatError::InvalidInput(
                    "quiet hours must be minutes within a day".into(),
                ));
            }
        }

        let db = handle::lock(&self.db)?;

        let mut preferences = db
            .get_preferences(caller.user_id)?
            .unwrap_or_else(|| NotificationPreferences::default_for(caller.user_id, Utc::now()));

        if let Some(v) = patch.email_enabled {
            preferences.email_enabled = v;
        }
        if let Some(v) = patch.push_enabled {
            preferences.push_enabled = v;
        }
        if let Some(v) = patch.desktop_enabled {
            preferences.desktop_enabled = v;
        }
        if let Some(v) = patch.sound_enabled {
            preferences.sound_enabled = v;
        }
        if let Some(v) = patch.quiet_hours {
            preferences.quiet_hours = v;
        }
        if let Some(v) = patch.muted_conversations {
            preferences.muted_conversations = v;
        }
        if let Some(v) = patch.metadata {
            preferences.metadata = v;
        }
        preferences.updated_at = Utc::now();

        db.upsert_preferences(&preferences)?;
        tracing::info!(user = %caller.user_id, "notification preferences updated");
        Ok(preferences)
    }

    /// Whether delivery to the caller for this conversation is currently
    /// suppressed: the conversation is muted or the current time falls in
    /// the quiet-hours window. Message storage is unaffected either way.
    pub fn is_muted(&self, caller: &Caller, conversation_id: ConversationId) -> Result<bool> {
        let db = handle::lock(&self.db)?;
        let preferences = db
            .get_preferences(caller.user_id)?
            .unwrap_or_else(|| NotificationPreferences::default_for(caller.user_id, Utc::now()));
        Ok(preferences.is_muted_at(conversation_id, Utc::now()))
    }

    /// Add a conversation the caller participates in to the muted set.
    pub fn mute_conversation(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<NotificationPreferences> {
        let db = handle::lock(&self.db)?;

        let conversation = db.get_conversation(conversation_id)?;
        if !conversation.participants.contains(&caller.user_id) {
            return Err(ChatError::NotParticipant);
        }

        let mut preferences = db
            .get_preferences(caller.user_id)?
            .unwrap_or_else(|| NotificationPreferences::default_for(caller.user_id, Utc::now()));
        preferences.muted_conversations.insert(conversation_id);
        preferences.updated_at = Utc::now();
        db.upsert_preferences(&preferences)?;

        tracing::debug!(user = %caller.user_id, conversation = %conversation_id, "conversation muted");
        Ok(preferences)
    }

    /// Remove a conversation from the muted set. Idempotent; no
    /// membership check, so mutes survive leaving data intact even after
    /// deactivation.
    pub fn unmute_conversation(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<NotificationPreferences> {
        let db = handle::lock(&self.db)?;

        let mut preferences = db
            .get_preferences(caller.user_id)?
            .unwrap_or_else(|| NotificationPreferences::default_for(caller.user_id, Utc::now()));
        preferences.muted_conversations.remove(&conversation_id);
        preferences.updated_at = Utc::now();
        db.upsert_preferences(&preferences)?;

        tracing::debug!(user = %caller.user_id, conversation = %conversation_id, "conversation unmuted");
        Ok(preferences)
    }
}
