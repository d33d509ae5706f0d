//! Opt-in tracing setup for embedding hosts.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a formatted `tracing` subscriber honoring `RUST_LOG`, with a
/// sensible default filter. Safe to call more than once; later calls are
/// no-ops. Hosts with their own subscriber should skip this.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("parley_core=debug,parley_store=info,warn"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
