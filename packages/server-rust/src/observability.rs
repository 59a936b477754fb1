//! Tracing subscriber setup.

use std::fmt;
use std::str::FromStr;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter};

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Json => "json",
        })
    }
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => anyhow::bail!("unknown log format: {other}"),
        }
    }
}

/// Builds the filter: `RUST_LOG` when set, otherwise `default_directives`.
///
/// # Errors
///
/// Returns an error if `default_directives` cannot be parsed.
pub fn env_filter(default_directives: &str) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(default_directives)?),
    }
}

/// Installs the global tracing subscriber.
///
/// # Errors
///
/// Returns an error if the directives are invalid or a global subscriber is
/// already installed.
pub fn init_tracing(format: LogFormat, default_directives: &str) -> anyhow::Result<()> {
    let filter = env_filter(default_directives)?;
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(fmt_layer::layer().with_target(true)).try_init()?,
        LogFormat::Json => registry
            .with(fmt_layer::layer().json().with_current_span(true))
            .try_init()?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_log_format() {
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Text);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn displays_log_format() {
        assert_eq!(LogFormat::Json.to_string(), "json");
        assert_eq!(LogFormat::default().to_string(), "text");
    }

    #[test]
    fn invalid_default_directive_is_rejected() {
        if std::env::var_os("RUST_LOG").is_none() {
            assert!(env_filter("conductor=loud").is_err());
        }
    }
}
