use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

static TRACING_INIT: Once = Once::new();

/// Installs the global `fmt` subscriber.
///
/// `RUST_LOG` wins over `default_filter`; an unparsable directive falls back
/// to `kitamo=info`. Later calls, or a subscriber installed elsewhere, are left alone.
pub fn init_tracing(default_filter: &str) {
    TRACING_INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("kitamo=info"));

        let _ = fmt().with_env_filter(filter).try_init();
    });
}
