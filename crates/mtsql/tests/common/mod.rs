//! Shared helpers for mtsql integration tests

use std::sync::Once;

static INIT: Once = Once::new();

/// Initialize test logging (idempotent)
pub fn init_test_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::from_default_env()
                    .add_directive("mtsql=debug".parse().unwrap()),
            )
            .with_test_writer()
            .try_init()
            .ok();
    });
}
