//! Process logging setup
//!
//! `start` logs JSON lines by default so the output can be shipped as-is;
//! `withdraw` and local runs can switch to the human-readable formatter.

use std::str::FromStr;
use tracing::{info_span, Level, Span};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{BotError, BotResult};

/// Service name attached to every relay-process log line
pub const SERVICE_NAME: &str = "skipper/relay/api";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl FromStr for LogFormat {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "text" => Ok(Self::Text),
            other => Err(BotError::Config(format!("invalid log format: {}", other))),
        }
    }
}

/// Parse a level name (`trace`..`error`)
pub fn parse_level(level: &str) -> BotResult<Level> {
    Level::from_str(level).map_err(|_| BotError::Config(format!("invalid log level: {}", level)))
}

/// Root span of the `start` process
///
/// Create it after [`init`], otherwise it is disabled. Tasks spawned under it
/// must attach it with `in_current_span()` to inherit its fields.
pub fn service_span() -> Span {
    info_span!("relay", service = SERVICE_NAME, version = env!("CARGO_PKG_VERSION"))
}

/// Install the global subscriber
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init(format: LogFormat, level: &str) -> BotResult<()> {
    let level = parse_level(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stdout),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stdout),
            )
            .try_init(),
    };

    result.map_err(|e| BotError::Config(format!("failed to install logger: {}", e)))
}
