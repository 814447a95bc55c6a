//! Tracing bootstrap for strand.
//!
//! Installs a `tracing-subscriber` registry with an [`EnvFilter`] and a
//! stderr fmt layer. `RUST_LOG` wins when set; otherwise the supplied default
//! directive is used.
//!
//! ```bash
//! RUST_LOG=strand_kernel=debug cargo test -p strand-kernel
//! ```

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Build the filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber.
///
/// Call once from `main` of any binary built on strand; the library crates
/// only emit events and never install a subscriber themselves.
///
/// Returns `false` if a global subscriber was already installed (e.g. a
/// second test in the same binary), which is not an error.
pub fn init_tracing(default_directive: &str) -> bool {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .is_ok()
}

/// Install a test-friendly subscriber that writes through the test harness
/// capture.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::registry()
        .with(env_filter("debug"))
        .with(fmt::layer().with_test_writer())
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_test_tracing();
        assert!(!init_tracing(DEFAULT_FILTER));
        tracing::info!("subscriber already installed");
    }
}
