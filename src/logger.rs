//! Structured logging setup. The teacher's modern dependency set carries
//! `tracing` + `tracing-subscriber` (with `env-filter`) rather than the
//! legacy `log`/`pretty_env_logger` combination its older modules used; we
//! follow the modern convention.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs a global `tracing` subscriber. `default_filter` is used unless
/// `RUST_LOG` is set, matching the override behavior the teacher's logger
/// gives `RUST_LOG` over its own configured filters.
pub fn setup_logger(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already set, skipping");
    }
}
