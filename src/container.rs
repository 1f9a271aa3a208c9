use std::collections::HashMap;

/// Stable identity of a container; the key for every per-container cache.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerId(pub String);

impl std::fmt::Display for ContainerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the pipeline knows about the container a line came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: String,
    pub hostname: String,
    /// `KEY=VALUE` entries in the order the runtime reports them.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
}

impl Container {
    pub fn container_id(&self) -> ContainerId {
        ContainerId(self.id.clone())
    }

    /// Values of every env entry named `key`, in declaration order.
    pub fn env_values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.env.iter().filter_map(move |entry| {
            entry
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

/// One raw log line as delivered by the log source.
#[derive(Debug, Clone)]
pub struct LogMessage {
    pub container: std::sync::Arc<Container>,
    /// `stdout` or `stderr`.
    pub source: String,
    pub data: String,
}
