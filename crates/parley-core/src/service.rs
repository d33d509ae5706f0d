//! The messaging core's public surface.
//!
//! [`ChatService`] wires the store handle, event bus, identity provider,
//! and notification sink into the component set and exposes the full
//! operation surface. One instance serves every session; sessions hold a
//! `Caller` (from [`ChatService::authenticate`]) and an
//! [`EventSubscription`] (from [`ChatService::subscribe`]).

use std::sync::{Arc, Mutex};

use parley_shared::{
    Caller, Conversation, ConversationId, Message, MessageId, MessageKind,
    NotificationPreferences, Presence, PresenceStatus, UserId, UserProfile,
};
use parley_store::Database;

use crate::bus::{EventBus, EventSubscription};
use crate::config::CoreConfig;
use crate::directory::{ConversationDirectory, ConversationSummary};
use crate::error::Result;
use crate::handle::{self, StoreHandle};
use crate::identity::IdentityProvider;
use crate::ledger::{MessageLedger, MessageView};
use crate::notify::{NotificationSink, Notifier};
use crate::preferences::{NotificationPreferenceStore, PreferencesPatch};
use crate::presence::PresenceRegistry;
use crate::receipts::ReadReceiptTracker;

/// Facade over the messaging core components.
pub struct ChatService {
    db: StoreHandle,
    bus: EventBus,
    identity: Arc<dyn IdentityProvider>,
    directory: ConversationDirectory,
    ledger: MessageLedger,
    receipts: ReadReceiptTracker,
    presence: PresenceRegistry,
    preferences: NotificationPreferenceStore,
}

impl ChatService {
    pub fn new(
        config: CoreConfig,
        database: Database,
        identity: Arc<dyn IdentityProvider>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let db: StoreHandle = Arc::new(Mutex::new(database));
        let bus = EventBus::new(config.bus_capacity);
        let notifier = Notifier::new(sink);

        Self {
            directory: ConversationDirectory::new(
                Arc::clone(&db),
                bus.clone(),
                config.direct_create_attempts,
            ),
            ledger: MessageLedger::new(Arc::clone(&db), bus.clone(), notifier),
            receipts: ReadReceiptTracker::new(Arc::clone(&db)),
            presence: PresenceRegistry::new(
                Arc::clone(&db),
                bus.clone(),
                config.presence_stale_after(),
            ),
            preferences: NotificationPreferenceStore::new(Arc::clone(&db)),
            db,
            bus,
            identity,
        }
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    /// Resolve an opaque token through the identity provider.
    pub fn authenticate(&self, token: &str) -> Result<Caller> {
        self.identity.authenticate(token)
    }

    /// Open a realtime event subscription for a session.
    pub fn subscribe(&self) -> EventSubscription {
        self.bus.subscribe()
    }

    /// The underlying event bus, for hosts that fan events further out.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Sync a user profile from the identity provider into the local
    /// cache backing display-title derivation.
    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<()> {
        let db = handle::lock(&self.db)?;
        db.upsert_user(profile)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    pub fn list_conversations(&self, caller: &Caller) -> Result<Vec<ConversationSummary>> {
        self.directory.list_conversations(caller)
    }

    pub fn get_or_create_direct(&self, caller: &Caller, other: UserId) -> Result<Conversation> {
        self.directory.get_or_create_direct(caller, other)
    }

    pub fn create_group(
        &self,
        caller: &Caller,
        participants: Vec<UserId>,
        title: Option<String>,
    ) -> Result<Conversation> {
        self.directory.create_group(caller, participants, title)
    }

    pub fn deactivate_conversation(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<()> {
        self.directory.deactivate(caller, conversation_id)
    }

    // ------------------------------------------------------------------
    // Messages
    // ------------------------------------------------------------------

    pub fn send_message(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
        content: &str,
        kind: MessageKind,
        parent_id: Option<MessageId>,
    ) -> Result<Message> {
        self.ledger
            .send_message(caller, conversation_id, content, kind, parent_id)
    }

    pub fn list_messages(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<Vec<MessageView>> {
        self.ledger.list_messages(caller, conversation_id)
    }

    pub fn get_message(&self, caller: &Caller, message_id: MessageId) -> Result<Message> {
        self.ledger.get_message(caller, message_id)
    }

    pub fn edit_message(
        &self,
        caller: &Caller,
        message_id: MessageId,
        content: &str,
    ) -> Result<Message> {
        self.ledger.edit_message(caller, message_id, content)
    }

    pub fn delete_message(&self, caller: &Caller, message_id: MessageId) -> Result<()> {
        self.ledger.delete_message(caller, message_id)
    }

    pub fn add_reaction(
        &self,
        caller: &Caller,
        message_id: MessageId,
        emoji: &str,
    ) -> Result<Message> {
        self.ledger.add_reaction(caller, message_id, emoji)
    }

    // ------------------------------------------------------------------
    // Read state
    // ------------------------------------------------------------------

    pub fn mark_read(&self, caller: &Caller, message_id: MessageId) -> Result<()> {
        self.receipts.mark_read(caller, message_id)
    }

    pub fn mark_conversation_read(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<usize> {
        self.receipts.mark_conversation_read(caller, conversation_id)
    }

    pub fn unread_count(&self, caller: &Caller, conversation_id: ConversationId) -> Result<u64> {
        self.receipts.unread_count(caller, conversation_id)
    }

    // ------------------------------------------------------------------
    // Presence
    // ------------------------------------------------------------------

    pub fn set_status(&self, caller: &Caller, status: PresenceStatus) -> Result<Presence> {
        self.presence.set_status(caller, status)
    }

    pub fn set_typing(
        &self,
        caller: &Caller,
        conversation_id: Option<ConversationId>,
    ) -> Result<Presence> {
        self.presence.set_typing(caller, conversation_id)
    }

    pub fn get_presence(&self, user_id: UserId) -> Result<Presence> {
        self.presence.get_presence(user_id)
    }

    // ------------------------------------------------------------------
    // Notification preferences
    // ------------------------------------------------------------------

    pub fn get_preferences(&self, caller: &Caller) -> Result<NotificationPreferences> {
        self.preferences.get_preferences(caller)
    }

    pub fn update_preferences(
        &self,
        caller: &Caller,
        patch: PreferencesPatch,
    ) -> Result<NotificationPreferences> {
        self.preferences.update_preferences(caller, patch)
    }

    pub fn is_muted(&self, caller: &Caller, conversation_id: ConversationId) -> Result<bool> {
        self.preferences.is_muted(caller, conversation_id)
    }

    pub fn mute_conversation(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<NotificationPreferences> {
        self.preferences.mute_conversation(caller, conversation_id)
    }

    pub fn unmute_conversation(
        &self,
        caller: &Caller,
        conversation_id: ConversationId,
    ) -> Result<NotificationPreferences> {
        self.preferences.unmute_conversation(caller, conversation_id)
    }
}
