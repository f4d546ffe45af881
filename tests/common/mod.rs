//! Shared helpers for the integration tests.
//!
//! Set `RUST_LOG` (e.g. `efrb_tree=trace`) to see the tree's events; output
//! goes through the test harness so it is only shown for failing tests.

#![allow(dead_code)]

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

static INIT: Once = Once::new();

/// Installs the global subscriber. Only the first call has an effect.
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_test_writer()
            .with_thread_ids(true)
            .with_target(true)
            .compact()
            .with_filter(filter);
        let _ = Registry::default().with(fmt_layer).try_init();
    });
}

/// Number of worker threads for stress tests.
pub fn concurrency() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(8)
        .clamp(4, 16)
}
