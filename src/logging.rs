//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when neither `RUST_LOG` nor a configured level is present.
const DEFAULT_FILTER: &str = "shell_bot=info";

fn filter_for(level: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| match level {
        Some(level) if !level.contains('=') => EnvFilter::new(format!("shell_bot={}", level)),
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::new(DEFAULT_FILTER),
    })
}

/// Initialize the logging system with the configured level.
///
/// `RUST_LOG` takes precedence when set. A bare level such as `debug`
/// applies to this crate only; full directives are used as given.
///
/// # Panics
///
/// Panics if another tracing subscriber has already been set.
pub fn init_with(level: &str) {
    tracing_subscriber::registry()
        .with(filter_for(Some(level)))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system with the default filter.
///
/// Returns `Err` if logging has already been initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_for(None))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_init_idempotent() {
        let _ = try_init();
        let _ = try_init();
    }

    #[test]
    fn test_filter_for_levels() {
        // Only checks that building filters never panics.
        let _ = filter_for(Some("debug"));
        let _ = filter_for(Some("shell_bot=trace,teloxide=warn"));
        let _ = filter_for(None);
    }
}
