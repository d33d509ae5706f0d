//! Core configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the core can be embedded with
//! zero configuration.

use chrono::Duration;

/// Messaging core configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Age after which a presence record is reported as `offline`
    /// regardless of its stored status, in seconds.
    /// Env: `PARLEY_PRESENCE_STALE_SECS`
    /// Default: `300`
    pub presence_stale_secs: u64,

    /// Capacity of the realtime event bus channel. Subscribers that fall
    /// further behind observe a lag and must resynchronize from the store.
    /// Env: `PARLEY_BUS_CAPACITY`
    /// Default: `1024`
    pub bus_capacity: usize,

    /// Bounded retry budget for resolving a direct-conversation creation
    /// race before surfacing an error.
    /// Env: `PARLEY_DIRECT_CREATE_ATTEMPTS`
    /// Default: `3`
    pub direct_create_attempts: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            presence_stale_secs: 300,
            bus_capacity: 1024,
            direct_create_attempts: 3,
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PARLEY_PRESENCE_STALE_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.presence_stale_secs = secs,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PARLEY_PRESENCE_STALE_SECS, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("PARLEY_BUS_CAPACITY") {
            match val.parse::<usize>() {
                Ok(capacity) if capacity > 0 => config.bus_capacity = capacity,
                _ => {
                    tracing::warn!(value = %val, "Invalid PARLEY_BUS_CAPACITY, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("PARLEY_DIRECT_CREATE_ATTEMPTS") {
            match val.parse::<u32>() {
                Ok(attempts) if attempts > 0 => config.direct_create_attempts = attempts,
                _ => {
                    tracing::warn!(value = %val, "Invalid PARLEY_DIRECT_CREATE_ATTEMPTS, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The staleness threshold as a duration.
    pub fn presence_stale_after(&self) -> Duration {
        Duration::seconds(self.presence_stale_secs as i64)
    }
}
