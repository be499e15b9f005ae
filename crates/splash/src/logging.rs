//! Logging initialization.
//!
//! Logs always go to stderr; stdout carries the document stream.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the logging subsystem.
///
/// `level` is any `EnvFilter` directive (`info`, `debug`,
/// `splash_core=trace`, ...). `RUST_LOG` overrides it when set.
pub fn init(level: &str, json_format: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize logging from the `[logging]` section and CLI flags.
///
/// `--verbose` raises the level to `debug` unless the config already asks
/// for something more detailed.
pub fn init_from_config(config: &splash_core::Config, verbose: bool, json_logs: bool) {
    let json_format = json_logs || config.logging.format == "json";
    init(&effective_level(&config.logging.level, verbose), json_format);
}

fn effective_level(configured: &str, verbose: bool) -> String {
    if verbose && !matches!(configured, "debug" | "trace") {
        "debug".to_string()
    } else {
        configured.to_string()
    }
}
