use std::{path::PathBuf, sync::OnceLock};

use clap::{Parser, ValueEnum};

/// Ship container logs to Logstash as JSON lines.
#[derive(Parser, Debug, Default)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Address of the Logstash input, as host:port.
    #[arg(env = "LOGSTASH_ADDRESS")]
    pub address: Option<String>,

    /// Wire transport used to reach Logstash.
    #[arg(short, long, value_enum, env = "LOGSTASH_TRANSPORT")]
    pub transport: Option<Transport>,

    /// Path to an optional TOML config file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Default comma separated tags for containers without LOGSTASH_TAGS.
    #[arg(long, env = "LOGSTASH_TAGS")]
    pub tags: Option<String>,

    /// Default comma separated key=value fields for containers without LOGSTASH_FIELDS.
    #[arg(long, env = "LOGSTASH_FIELDS")]
    pub fields: Option<String>,

    /// Default JSON decoding policy; only the exact value "false" disables it.
    #[arg(long, env = "DECODE_JSON_LOGS")]
    pub decode_json_logs: Option<String>,

    /// Add container labels (and pod labels) to every record.
    #[arg(
        long,
        env = "DOCKER_LABELS",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    pub docker_labels: Option<String>,

    /// Split lines on embedded carriage returns (journald driver workaround).
    #[arg(
        long,
        env = "BROKEN_JOURNALD",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    pub broken_journald: Option<String>,

    /// Retry failed writes forever instead of exiting.
    #[arg(
        long,
        env = "RETRY_SEND",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    pub retry_send: Option<String>,

    /// Retry the initial connection forever instead of exiting.
    #[arg(
        long,
        env = "RETRY_STARTUP",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    pub retry_startup: Option<String>,

    /// Verbose debug logging.
    #[arg(
        long,
        env = "DEBUG",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "1"
    )]
    pub debug: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    #[default]
    Udp,
    Tcp,
}

impl AsRef<str> for Transport {
    fn as_ref(&self) -> &str {
        match self {
            Self::Udp => "udp",
            Self::Tcp => "tcp",
        }
    }
}

static ARGS: OnceLock<Args> = OnceLock::new();

pub fn get_cli_args() -> &'static Args {
    ARGS.get_or_init(Args::parse)
}

/// A toggle is on when its value is present and non-empty.
pub fn toggle(value: &Option<String>) -> Option<bool> {
    value.as_ref().map(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flags_without_values() {
        let args = Args::try_parse_from([
            "dockstash",
            "logstash:5000",
            "--transport",
            "tcp",
            "--docker-labels",
            "--retry-send",
        ])
        .expect("Failed to parse args");

        assert_eq!(args.address.as_deref(), Some("logstash:5000"));
        assert_eq!(args.transport, Some(Transport::Tcp));
        assert_eq!(toggle(&args.docker_labels), Some(true));
        assert_eq!(toggle(&args.retry_send), Some(true));
    }

    #[test]
    fn test_toggle_before_address_does_not_consume_it() {
        let args = Args::try_parse_from(["dockstash", "--retry-send", "logstash:5000"])
            .expect("Failed to parse args");

        assert_eq!(args.address.as_deref(), Some("logstash:5000"));
        assert_eq!(toggle(&args.retry_send), Some(true));
    }

    #[test]
    fn test_toggle_with_explicit_value() {
        let args = Args::try_parse_from(["dockstash", "--docker-labels=yes", "logstash:5000"])
            .expect("Failed to parse args");

        assert_eq!(args.address.as_deref(), Some("logstash:5000"));
        assert_eq!(toggle(&args.docker_labels), Some(true));
    }

    #[test]
    fn test_toggle_empty_value_is_off() {
        assert_eq!(toggle(&Some(String::new())), Some(false));
        assert_eq!(toggle(&Some("yes".to_string())), Some(true));
        assert_eq!(toggle(&None), None);
    }
}
