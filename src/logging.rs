//! Diagnostic logging setup
//!
//! Logs always go to stderr so command output on stdout stays parseable.
//! `RUST_LOG` wins over `--debug` when set.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::LogFormat;
use crate::errors::{ActuatorError, Result};

/// Filter used when `RUST_LOG` is not set
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        "warn,kubectl_actuator=debug,kube=info"
    } else {
        "warn"
    }
}

/// Install the global subscriber; fails if one is already installed
pub fn init(debug: bool, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(debug),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init(),
    };

    result.map_err(|e| ActuatorError::Config(format!("Failed to initialize logging: {}", e)))
}
