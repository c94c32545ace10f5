use std::env;
use tracing_subscriber::{fmt, EnvFilter};

pub fn setup_logging() {
    // Check for a LOG_LEVEL environment variable, defaulting to INFO
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(&log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .init();

    tracing::info!("Logging initialized at custom levels");
}

/// Used when `RUST_LOG` is not set.
fn default_filter(log_level: &str) -> EnvFilter {
    EnvFilter::new(format!("repairhub_notify={}", log_level))
        // Per-frame chatter from the live channel stays at WARN unless RUST_LOG says otherwise
        .add_directive("repairhub_notify::live_channel=warn".parse().unwrap())
        // Handshake and HTTP client internals
        .add_directive("tungstenite=warn".parse().unwrap())
        .add_directive("tokio_tungstenite=warn".parse().unwrap())
        .add_directive("reqwest=warn".parse().unwrap())
}
