use std::path::Path;

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// File name used for JSON logs inside the log directory.
pub const LOG_FILE_NAME: &str = "app.log";

fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn observability_enabled() -> bool {
    match std::env::var("BRIDGE_OBSERVABILITY_ENABLED") {
        Ok(value) => parse_bool_env(&value).unwrap_or(true),
        Err(_) => true,
    }
}

/// Console logs share the terminal with chunks printed to stdout.
fn console_writer() -> std::io::Stderr {
    std::io::stderr()
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("BRIDGE_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `BRIDGE_OBSERVABILITY_ENABLED`: optional enable/disable flag (default enabled).
/// - `BRIDGE_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `RUST_LOG`: fallback filter.
///
/// With a `log_dir`, logs are written as JSON lines to `{log_dir}/app.log`;
/// otherwise they go to stderr in a compact console format, leaving stdout
/// to printed chunks.
pub fn init_observability(log_dir: Option<&Path>) {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }

        let env_filter = resolve_env_filter();
        if let Some(dir) = log_dir {
            let _ = std::fs::create_dir_all(dir);
            let writer = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let json_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(false)
                .with_writer(writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(json_layer)
                .try_init();
        } else {
            let console_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(console_writer);
            let _ = tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .try_init();
        }
    });
}
