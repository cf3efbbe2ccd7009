use std::io;
use tracing_subscriber::{fmt, EnvFilter};

/// Output flavour for the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    /// Parse a config value; anything other than `json` falls back to compact.
    pub fn from_config(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Compact
        }
    }

    /// Filter used when `RUST_LOG` is unset. JSON output is meant for log
    /// shipping, so store decisions (lazy expiry, skipped records) are kept.
    pub fn default_filter(self) -> &'static str {
        match self {
            Self::Compact => "info",
            Self::Json => "info,service::premium=debug",
        }
    }
}

/// Install the global tracing subscriber writing to stdout.
/// `RUST_LOG` overrides the format's default filter; a second call is a no-op.
pub fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format.default_filter()));
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stdout);
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
