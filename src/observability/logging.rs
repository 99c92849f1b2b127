//! Structured logging.
//!
//! `RUST_LOG` takes precedence; otherwise the configured level applies to this
//! crate, the bundled binaries and `tower_http`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global tracing subscriber. Later calls are no-ops.
pub fn init(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn default_directives(log_level: &str) -> String {
    format!(
        "round_robin_lb={level},demo_backend={level},lbctl={level},tower_http={level}",
        level = log_level
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directives_parse() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("round_robin_lb=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
