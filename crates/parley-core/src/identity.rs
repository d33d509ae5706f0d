//! Identity provider seam.
//!
//! The messaging core consumes an external identity provider; it never
//! verifies credentials itself. Hosts implement [`IdentityProvider`]
//! against their auth system; [`StaticTokenProvider`] covers embedded
//! setups and tests.

use std::collections::HashMap;

use parley_shared::Caller;

use crate::error::{ChatError, Result};

/// Resolves an opaque bearer token to an authenticated caller.
pub trait IdentityProvider: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<Caller>;
}

/// Fixed token table. Registration happens at wiring time; lookups are
/// read-only afterwards.
#[derive(Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, Caller>,
}

impl StaticTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: impl Into<String>, caller: Caller) {
        self.tokens.insert(token.into(), caller);
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn authenticate(&self, token: &str) -> Result<Caller> {
        match self.tokens.get(token) {
            Some(caller) => Ok(caller.clone()),
            None => {
                tracing::warn!("authentication failed for unknown token");
                Err(ChatError::Unauthenticated)
            }
        }
    }
}
