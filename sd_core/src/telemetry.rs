//! ABOUTME: Process-wide tracing subscriber setup
//! ABOUTME: JSON lines in production, human-readable output elsewhere

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Used when RUST_LOG is unset; sqlx statement logging is noisy at info
const DEFAULT_FILTER: &str = "info,sqlx=warn,actix_server=warn";

/// Output shape chosen from the deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    pub fn for_environment(env: &str) -> Self {
        if env.eq_ignore_ascii_case("production") {
            Self::Json
        } else {
            Self::Pretty
        }
    }
}

/// Install the global subscriber; later calls are no-ops
pub fn init_tracing(env: &str, service: &str) {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        match LogFormat::for_environment(env) {
            LogFormat::Json => tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
                .with(filter)
                .init(),
            LogFormat::Pretty => tracing_subscriber::registry()
                .with(tracing_subscriber::fmt::layer().pretty())
                .with(filter)
                .init(),
        }

        tracing::info!(service = %service, env = %env, "Tracing initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_follows_environment() {
        assert_eq!(LogFormat::for_environment("production"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("PRODUCTION"), LogFormat::Json);
        assert_eq!(LogFormat::for_environment("development"), LogFormat::Pretty);
    }

    #[test]
    fn test_init_tracing_idempotent() {
        init_tracing("test", "seatdesk-test");
        init_tracing("test", "seatdesk-test");
    }
}
