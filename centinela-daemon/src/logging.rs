//! Logging initialization for centinela-daemon.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `CentinelaConfig`. `RUST_LOG` takes precedence over `log_level`.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use centinela_core::config::GeneralConfig;

/// Build the level filter, preferring `RUST_LOG` when it is set and valid.
pub fn build_filter(log_level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(log_level)
            .map_err(|e| anyhow::anyhow!("invalid log level '{}': {}", log_level, e)),
    }
}

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before any tracing macros are used.
///
/// # Formats
///
/// * `"json"` - JSON lines (default)
/// * `"pretty"` - Human-readable multi-line output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter = build_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format.as_str() {
        "json" => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false),
            )
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    }
    .map_err(|e| anyhow::anyhow!("failed to initialize tracing subscriber: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[serial_test::serial]
    fn level_names_build_filters() {
        // SAFETY: serialised with the other env-var tests in this crate.
        unsafe { std::env::remove_var("RUST_LOG") };
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(build_filter(level).is_ok(), "{level}");
        }
        assert!(build_filter("info,centinela_engine=debug").is_ok());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let config = GeneralConfig {
            log_format: "xml".to_owned(),
            ..GeneralConfig::default()
        };
        let err = init_tracing(&config).unwrap_err();
        assert!(err.to_string().contains("unknown log format"));
    }
}
