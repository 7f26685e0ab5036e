use tracing_subscriber::EnvFilter;

/// Initialize tracing with minimal overhead. `RUST_LOG` controls the
/// filter; the default level is info.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
