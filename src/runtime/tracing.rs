/// Initializes tracing for a test binary.
///
/// Structured logging with environment-based filtering (`RUST_LOG`) and the
/// per-test capture writer, so silo and registry output lands in the failing
/// test's captured output instead of interleaving across tests.
///
/// Safe to call from every test; repeated initialization is ignored.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
