//! Shared test utilities.

pub mod mocks;

/// Install a test subscriber once so `RUST_LOG=debug cargo test` shows
/// engine traces. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
