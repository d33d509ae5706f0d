//! Conversation creation, lookup, and listing.

use chrono::Utc;
use serde::Serialize;

use parley_shared::{
    Caller, Conversation, ConversationId, ConversationKind, EventPayload, JsonMap, Message, UserId,
};
use parley_store::{direct_pair_key, Database, StoreError};

use crate::bus::EventBus;
use crate::error::{ChatError, Result};
use crate::handle::{self, StoreHandle};

/// Fixed title for conversations whose metadata marks them as an
/// automated-assistant channel.
const ASSISTANT_LABEL: &str = "Assistant";

/// Fallback title when no participant name resolves.
const FALLBACK_LABEL: &str = "Conversation";

/// A conversation as it appears in the caller's listing: the record plus
/// derived, caller-specific annotations. The annotations are a
/// point-in-time snapshot; refresh after any mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub title: String,
    pub last_message: Option<Message>,
    pub unread_count: u64,
}

/// Creates and looks up conversations; resolves display titles;
/// deduplicates concurrent direct-conversation creation races.
#[derive(Clone)]
pub struct ConversationDirectory {
    db: StoreHandle,
    bus: EventBus,
    create_attempts: u32,
}

impl ConversationDirectory {
    pub(crate) fn new(db: StoreHandle, bus: EventBus, create_attempts: u32) -> Self {
        Self { db, bus, create_attempts }
    }

    /// All active conversations the caller participates in, most recently
    /// active first, annotated for the caller.
    ///
    /// Rows that duplicate an earlier row by id or by (kind, participant
    /// set) are collapsed; the most recently active row wins. The latter
    /// guards against data created before the uniqueness index existed.
    pub fn list_conversations(&self, caller: &Caller) -> Result<Vec<ConversationSummary>> {
        let db = handle::lock(&self.db)?;
        let rows = db.list_conversations_for_user(caller.user_id)?;

        let mut seen_ids = std::collections::HashSet::new();
        let mut seen_shapes = std::collections::HashSet::new();
        let mut summaries = Vec::new();

        for conversation in rows {
            if !seen_ids.insert(conversation.id) {
                continue;
            }
            let shape = (conversation.kind, conversation.participants.clone());
            if !seen_shapes.insert(shape) {
                tracing::warn!(
                    conversation = %conversation.id,
                    "collapsing duplicate conversation in listing"
                );
                continue;
            }

            let title = derive_title(&db, &conversation, caller.user_id)?;
            let last_message = db.latest_message(conversation.id)?;
            let unread_count = db.unread_count(conversation.id, caller.user_id)?;

            summaries.push(ConversationSummary {
                conversation,
                title,
                last_message,
                unread_count,
            });
        }

        Ok(summaries)
    }

    /// Return the active direct conversation between the caller and
    /// `other`, creating it if none exists.
    ///
    /// Two concurrent callers may both miss the lookup and insert; the
    /// store's uniqueness index picks one winner, and the loser retries
    /// the lookup (bounded) and returns the winning row.
    pub fn get_or_create_direct(&self, caller: &Caller, other: UserId) -> Result<Conversation> {
        if other == caller.user_id {
            return Err(ChatError::InvalidInput(
                "a direct conversation needs two distinct participants".into(),
            ));
        }

        let pair_key = direct_pair_key(caller.user_id, other);

        for attempt in 1..=self.create_attempts {
            let mut db = handle::lock(&self.db)?;

            if let Some(existing) = db.find_active_direct(&pair_key)? {
                return Ok(existing);
            }

            let now = Utc::now();
            let (lo, hi) = (caller.user_id.min(other), caller.user_id.max(other));
            let conversation = Conversation {
                id: ConversationId::new(),
                kind: ConversationKind::Direct,
                creator_id: caller.user_id,
                participants: vec![lo, hi],
                title: None,
                description: None,
                metadata: JsonMap::new(),
                is_active: true,
                last_message_at: None,
                created_at: now,
                updated_at: now,
            };

            match db.insert_conversation(&conversation) {
                Ok(()) => {
                    self.bus.publish(EventPayload::ConversationChanged {
                        conversation: conversation.clone(),
                    });
                    tracing::info!(conversation = %conversation.id, "direct conversation created");
                    return Ok(conversation);
                }
                Err(StoreError::Constraint(_)) => {
                    tracing::warn!(
                        attempt,
                        "lost direct-conversation creation race, retrying lookup"
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ChatError::ConflictRetryExhausted {
            attempts: self.create_attempts,
        })
    }

    /// Create a group conversation. The caller is always a participant.
    pub fn create_group(
        &self,
        caller: &Caller,
        participants: Vec<UserId>,
        title: Option<String>,
    ) -> Result<Conversation> {
        let mut members: std::collections::BTreeSet<UserId> = participants.into_iter().collect();
        members.insert(caller.user_id);
        if members.len() < 2 {
            return Err(ChatError::InvalidInput(
                "a group conversation needs at least two distinct participants".into(),
            ));
        }

        let now = Utc::now();
        let conversation = Conversation {
            id: ConversationId::new(),
            kind: ConversationKind::Group,
            creator_id: caller.user_id,
            participants: members.into_iter().collect(),
            title: title.filter(|t| !t.trim().is_empty()),
            description: None,
            metadata: JsonMap::new(),
            is_active: true,
            last_message_at: None,
            created_at: now,
            updated_at: now,
        };

        let mut db = handle::lock(&self.db)?;
        db.insert_conversation(&conversation)?;
        self.bus.publish(EventPayload::ConversationChanged {
            conversation: conversation.clone(),
        });
        tracing::info!(
            conversation = %conversation.id,
            participants = conversation.participants.len(),
            "group conversation created"
        );
        Ok(conversation)
    }

    /// Soft-deactivate a conversation. Creator only; idempotent.
    pub fn deactivate(&self, caller: &Caller, conversation_id: ConversationId) -> Result<()> {
        let db = handle::lock(&self.db)?;
        let mut conversation = db.get_conversation(conversation_id)?;

        if !conversation.participants.contains(&caller.user_id)
            || conversation.creator_id != caller.user_id
        {
            return Err(ChatError::NotParticipant);
        }
        if !conversation.is_active {
            return Ok(());
        }

        let now = Utc::now();
        db.set_conversation_active(conversation_id, false, now)?;
        conversation.is_active = false;
        conversation.updated_at = now;

        self.bus.publish(EventPayload::ConversationChanged { conversation });
        tracing::info!(conversation = %conversation_id, "conversation deactivated");
        Ok(())
    }
}

/// Derive the display title for a conversation from the viewer's
/// perspective.
fn derive_title(
    db: &Database,
    conversation: &Conversation,
    viewer: UserId,
) -> std::result::Result<String, StoreError> {
    let assistant = conversation
        .metadata
        .get("assistant")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if assistant {
        return Ok(ASSISTANT_LABEL.to_string());
    }

    if let Some(title) = conversation.title.as_deref() {
        if !title.trim().is_empty() {
            return Ok(title.to_string());
        }
    }

    let others: Vec<UserId> = conversation
        .participants
        .iter()
        .copied()
        .filter(|id| *id != viewer)
        .collect();
    let names = db.display_names(&others)?;

    let resolved: Vec<&str> = others
        .iter()
        .filter_map(|id| names.get(id).map(String::as_str))
        .collect();

    if resolved.is_empty() {
        Ok(FALLBACK_LABEL.to_string())
    } else {
        Ok(resolved.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use chrono::Utc;
    use parley_shared::UserProfile;

    fn directory() -> (ConversationDirectory, StoreHandle, EventBus) {
        let db: StoreHandle = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
        let bus = EventBus::new(64);
        let directory = ConversationDirectory::new(Arc::clone(&db), bus.clone(), 3);
        (directory, db, bus)
    }

    fn name(db: &StoreHandle, user_id: UserId, display_name: &str) {
        db.lock()
            .unwrap()
            .upsert_user(&UserProfile {
                id: user_id,
                display_name: Some(display_name.into()),
                created_at: Utc::now(),
            })
            .unwrap();
    }

    #[test]
    fn get_or_create_is_stable() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());
        let bob = UserId::new();

        let first = directory.get_or_create_direct(&alice, bob).unwrap();
        let second = directory.get_or_create_direct(&alice, bob).unwrap();
        // Symmetric from the other side too.
        let third = directory
            .get_or_create_direct(&Caller::new(bob), alice.user_id)
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.id, third.id);
    }

    #[test]
    fn get_or_create_rejects_self() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());

        let err = directory.get_or_create_direct(&alice, alice.user_id).unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn concurrent_get_or_create_yields_one_conversation() {
        let (directory, _db, _bus) = directory();
        let alice = UserId::new();
        let bob = UserId::new();

        let ids: Vec<ConversationId> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let directory = directory.clone();
                    scope.spawn(move || {
                        let (caller, other) = if i % 2 == 0 { (alice, bob) } else { (bob, alice) };
                        directory
                            .get_or_create_direct(&Caller::new(caller), other)
                            .unwrap()
                            .id
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.windows(2).all(|pair| pair[0] == pair[1]));
    }

    #[test]
    fn creation_publishes_conversation_changed() {
        let (directory, _db, bus) = directory();
        let mut subscription = bus.subscribe();

        let created = directory
            .get_or_create_direct(&Caller::new(UserId::new()), UserId::new())
            .unwrap();

        let envelope = subscription.try_recv().unwrap();
        assert_eq!(envelope.conversation_id, Some(created.id));
        assert!(matches!(
            envelope.payload,
            EventPayload::ConversationChanged { .. }
        ));
    }

    #[test]
    fn titles_prefer_assistant_then_names() {
        let (directory, db, _bus) = directory();
        let alice = Caller::new(UserId::new());
        let bob = UserId::new();
        name(&db, bob, "Bob");

        let plain = directory.get_or_create_direct(&alice, bob).unwrap();

        // A second direct conversation marked as the assistant channel.
        let helper = UserId::new();
        let mut assistant = directory.get_or_create_direct(&alice, helper).unwrap();
        assistant
            .metadata
            .insert("assistant".into(), serde_json::Value::Bool(true));
        {
            let db = db.lock().unwrap();
            db.conn()
                .execute(
                    "UPDATE conversations SET metadata = ?2 WHERE id = ?1",
                    rusqlite::params![
                        assistant.id.to_string(),
                        serde_json::to_string(&assistant.metadata).unwrap(),
                    ],
                )
                .unwrap();
        }

        let listed = directory.list_conversations(&alice).unwrap();
        let title_of = |id: ConversationId| {
            listed
                .iter()
                .find(|s| s.conversation.id == id)
                .unwrap()
                .title
                .clone()
        };

        assert_eq!(title_of(plain.id), "Bob");
        assert_eq!(title_of(assistant.id), ASSISTANT_LABEL);
    }

    #[test]
    fn title_falls_back_when_no_name_resolves() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());

        directory.get_or_create_direct(&alice, UserId::new()).unwrap();
        let listed = directory.list_conversations(&alice).unwrap();
        assert_eq!(listed[0].title, FALLBACK_LABEL);
    }

    #[test]
    fn explicit_group_title_is_used() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());

        directory
            .create_group(&alice, vec![UserId::new(), UserId::new()], Some("Standup".into()))
            .unwrap();

        let listed = directory.list_conversations(&alice).unwrap();
        assert_eq!(listed[0].title, "Standup");
    }

    #[test]
    fn group_needs_two_distinct_participants() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());

        let err = directory
            .create_group(&alice, vec![alice.user_id], None)
            .unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
    }

    #[test]
    fn listing_collapses_legacy_duplicate_pairs() {
        let (directory, db, _bus) = directory();
        let alice = Caller::new(UserId::new());
        let bob = UserId::new();

        let original = directory.get_or_create_direct(&alice, bob).unwrap();

        // Simulate a pre-constraint duplicate: detach the original from the
        // uniqueness index, then create a fresh row for the same pair.
        {
            let db = db.lock().unwrap();
            db.conn()
                .execute(
                    "UPDATE conversations SET direct_pair_key = NULL WHERE id = ?1",
                    rusqlite::params![original.id.to_string()],
                )
                .unwrap();
        }
        let replacement = directory.get_or_create_direct(&alice, bob).unwrap();
        assert_ne!(replacement.id, original.id);

        let listed = directory.list_conversations(&alice).unwrap();
        assert_eq!(listed.len(), 1);
    }

    #[test]
    fn deactivate_is_creator_only_and_idempotent() {
        let (directory, _db, _bus) = directory();
        let alice = Caller::new(UserId::new());
        let bob = UserId::new();

        let conversation = directory.get_or_create_direct(&alice, bob).unwrap();

        let err = directory
            .deactivate(&Caller::new(bob), conversation.id)
            .unwrap_err();
        assert!(matches!(err, ChatError::NotParticipant));

        directory.deactivate(&alice, conversation.id).unwrap();
        directory.deactivate(&alice, conversation.id).unwrap();

        assert!(directory.list_conversations(&alice).unwrap().is_empty());
    }
}
