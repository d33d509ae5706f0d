//! # parley-core
//!
//! The Parley real-time messaging core: conversations, messages, read
//! receipts, presence, notification preferences, and a realtime event
//! bus, on top of the `parley-store` SQLite layer.
//!
//! The core is transport-agnostic. An embedding host authenticates
//! sessions through an [`IdentityProvider`], calls operations on
//! [`ChatService`] with the resulting [`Caller`], and forwards
//! [`EventEnvelope`]s from an [`EventSubscription`] to its UI or wire
//! protocol. Finished notifications land in a host-provided
//! [`NotificationSink`].
//!
//! [`Caller`]: parley_shared::Caller
//! [`EventEnvelope`]: parley_shared::EventEnvelope

pub mod bus;
pub mod config;
pub mod directory;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod preferences;
pub mod presence;
pub mod receipts;
pub mod service;
pub mod telemetry;

mod error;
mod handle;

pub use bus::{EventBus, EventSubscription};
pub use config::CoreConfig;
pub use directory::{ConversationDirectory, ConversationSummary};
pub use error::{ChatError, ErrorPayload, Result};
pub use identity::{IdentityProvider, StaticTokenProvider};
pub use ledger::{MessageLedger, MessageView};
pub use notify::{DeliveryChannel, LogSink, Notification, NotificationSink};
pub use preferences::{NotificationPreferenceStore, PreferencesPatch};
pub use presence::PresenceRegistry;
pub use receipts::ReadReceiptTracker;
pub use service::ChatService;
