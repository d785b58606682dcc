//! Tracing setup and log redaction helpers

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "pix_donations={level},tower_http={level},sqlx=warn",
            level = config.level.to_lowercase()
        ))
    });

    let registry = tracing_subscriber::registry().with(filter);

    // try_init so tests and embedding binaries can install their own subscriber first
    let _ = match config.format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
        LogFormat::Plain => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };
}

/// `jo***@example.com`
pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => "***".to_string(),
    }
}
