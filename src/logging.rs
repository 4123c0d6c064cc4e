//! Structured logging (§4.9, ambient). Every component that crosses an I/O
//! or planning boundary emits a `tracing::debug!`/`tracing::trace!` event
//! tagged `[Component::method]`, mirroring the teacher's `debug!` call
//! convention — but routed through `tracing` instead of a hand-rolled file
//! logger, since the crate installs no global state of its own.
//!
//! The crate itself never calls [`tracing::subscriber::set_global_default`];
//! that choice belongs to the binary embedding it. [`init_test_subscriber`]
//! is provided purely for tests and example binaries.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a stdout `fmt` subscriber for the duration of the test process.
/// Idempotent — later calls are no-ops, so every test module can call this
/// at the top of its tests without double-installing a subscriber.
pub fn init_test_subscriber() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}
