//! Global log subscriber setup.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

use crate::config::LoggingConfig;

/// Installs the global subscriber and routes `log` records into it.
///
/// `RUST_LOG` overrides the configured level. Returns `false` when a
/// subscriber was already installed, in which case nothing changes.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true));
        tracing::subscriber::set_global_default(subscriber).is_ok()
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true));
        tracing::subscriber::set_global_default(subscriber).is_ok()
    };

    if !installed {
        return false;
    }

    if let Err(e) = tracing_log::LogTracer::init() {
        tracing::debug!("log bridge already installed: {}", e);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_second_init_is_noop() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: false,
        };
        // Another test binary may have installed a subscriber first; either
        // way the second call must report no change.
        let _ = init_logging(&config);
        assert!(!init_logging(&config));

        log::info!("routed through the tracing subscriber");
        tracing::info!("direct tracing event");
    }
}
