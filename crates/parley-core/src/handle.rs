//! Shared handle to the durable store.
//!
//! `rusqlite` connections are `Send` but not `Sync`, so every concurrent
//! session clones one `Arc<Mutex<Database>>`. Components hold the store
//! behind this handle and keep their critical sections short.

use std::sync::{Arc, Mutex, MutexGuard};

use parley_store::Database;

use crate::error::{ChatError, Result};

pub(crate) type StoreHandle = Arc<Mutex<Database>>;

pub(crate) fn lock(handle: &StoreHandle) -> Result<MutexGuard<'_, Database>> {
    handle.lock().map_err(|_| {
        tracing::error!("store mutex poisoned");
        ChatError::StoreUnavailable
    })
}
