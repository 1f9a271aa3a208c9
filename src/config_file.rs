use std::path::Path;

use crate::cli::Transport;
use crate::config::ConfigError;

/// On-disk configuration. Every key is optional; command line and
/// environment values take precedence over anything set here.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForwarderConfigFile {
    pub address: Option<String>,
    pub transport: Option<Transport>,
    pub tags: Option<String>,
    pub fields: Option<String>,
    pub decode_json_logs: Option<bool>,
    pub docker_labels: Option<bool>,
    pub broken_journald: Option<bool>,
    pub retry_send: Option<bool>,
    pub retry_startup: Option<bool>,
    pub debug: Option<bool>,
}

impl ForwarderConfigFile {
    fn try_init_from_string(config: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config)?)
    }

    pub fn try_init(path: &Path) -> Result<Self, ConfigError> {
        use std::io::Read;
        let mut config = String::new();
        std::fs::File::open(path)?.read_to_string(&mut config)?;
        Self::try_init_from_string(&config)
    }
}
