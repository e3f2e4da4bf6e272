//! Logging initialization for InboxPilot.
//!
//! Supports three formats:
//! - `pretty`: multi-line human-readable output
//! - `component`: compact single-line output; the [`log_component!`] macro
//!   adds a `component` field for per-subsystem filtering
//! - `json`: structured JSON lines for log aggregators

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LoggingConfig};
use crate::error::Result;

/// Initialize the global tracing subscriber from config.
///
/// Call this once at startup before any tracing events are emitted.
/// Events go to stderr, or to `cfg.file` in JSON mode. `RUST_LOG` takes
/// precedence over `cfg.level`. Returns an error only if the configured log
/// file cannot be opened.
pub fn init_logging(cfg: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    match cfg.format {
        LogFormat::Json => {
            let builder = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(true);
            if let Some(path) = &cfg.file {
                let file = OpenOptions::new().create(true).append(true).open(path)?;
                builder.with_writer(Mutex::new(file)).init();
            } else {
                builder.with_writer(std::io::stderr).init();
            }
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .pretty()
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Component => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .compact()
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

/// Emit a component-tagged tracing event.
///
/// ```
/// # use inboxpilot::log_component;
/// log_component!(info, "gateway", "request accepted");
/// log_component!(warn, "memory", "summarization failed", failures = 1u32);
/// ```
#[macro_export]
macro_rules! log_component {
    ($level:ident, $component:expr, $msg:expr) => {
        tracing::$level!(component = $component, $msg)
    };
    ($level:ident, $component:expr, $msg:expr, $($key:ident = $val:expr),+ $(,)?) => {
        tracing::$level!(component = $component, $($key = $val,)+ $msg)
    };
}
