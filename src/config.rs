use crate::cli::{Args, Transport, toggle};
use crate::config_file::ForwarderConfigFile;
use crate::metadata::{MalformedFieldError, parse_fields};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid default fields: {0}")]
    MalformedField(#[from] MalformedFieldError),
    #[error("No Logstash address configured")]
    MissingAddress,
}

/// Options the pipeline consults per line. Resolved once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Used for containers without a `LOGSTASH_TAGS` entry.
    pub default_tags: String,
    /// Used for containers without a `LOGSTASH_FIELDS` entry.
    pub default_fields: String,
    /// Used for containers without a `DECODE_JSON_LOGS` entry.
    pub default_decode_json_logs: String,
    pub docker_labels: bool,
    pub broken_journald: bool,
    pub retry_send: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderConfig {
    pub address: String,
    pub transport: Transport,
    pub retry_startup: bool,
    pub debug: bool,
    pub pipeline: PipelineConfig,
}

impl ForwarderConfig {
    pub fn try_init(args: &Args) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => ForwarderConfigFile::try_init(path)?,
            None => ForwarderConfigFile::default(),
        };
        Self::resolve(args, file)
    }

    fn resolve(args: &Args, file: ForwarderConfigFile) -> Result<Self, ConfigError> {
        let address = args
            .address
            .clone()
            .or(file.address)
            .ok_or(ConfigError::MissingAddress)?;

        let default_decode_json_logs = match (&args.decode_json_logs, file.decode_json_logs) {
            (Some(value), _) => value.clone(),
            (None, Some(false)) => "false".to_string(),
            (None, Some(true)) => "true".to_string(),
            (None, None) => String::new(),
        };

        let pipeline = PipelineConfig {
            default_tags: args.tags.clone().or(file.tags).unwrap_or_default(),
            default_fields: args.fields.clone().or(file.fields).unwrap_or_default(),
            default_decode_json_logs,
            docker_labels: toggle(&args.docker_labels)
                .or(file.docker_labels)
                .unwrap_or(false),
            broken_journald: toggle(&args.broken_journald)
                .or(file.broken_journald)
                .unwrap_or(false),
            retry_send: toggle(&args.retry_send)
                .or(file.retry_send)
                .unwrap_or(false),
        };

        // A bad default would fail on the first line of every container.
        parse_fields(&pipeline.default_fields)?;

        Ok(Self {
            address,
            transport: args.transport.or(file.transport).unwrap_or_default(),
            retry_startup: toggle(&args.retry_startup)
                .or(file.retry_startup)
                .unwrap_or(false),
            debug: toggle(&args.debug).or(file.debug).unwrap_or(false),
            pipeline,
        })
    }
}
