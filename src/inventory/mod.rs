//! Read-only view of the container runtime used for label enrichment.
//!
//! The pipeline only ever needs to enumerate containers by label and read
//! daemon-level information. `create_container` exists so test doubles can
//! seed an inventory through the same interface.

use std::collections::HashMap;

use async_trait::async_trait;

pub mod docker;
#[cfg(test)]
pub mod mock;

pub use docker::DockerInventory;

/// A `key=value` label filter, as understood by the Docker list API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelFilter {
    pub key: String,
    pub value: String,
}

impl LabelFilter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        labels.get(&self.key) == Some(&self.value)
    }
}

impl std::fmt::Display for LabelFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Entry returned when enumerating containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryContainer {
    pub id: String,
    pub image: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DaemonInfo {
    pub name: String,
    pub server_version: String,
}

/// What a test double needs to create a container.
#[derive(Debug, Clone, Default)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub hostname: String,
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),
    #[error("Inventory unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ContainerInventory: Send + Sync {
    async fn list_containers(
        &self,
        filter: &LabelFilter,
    ) -> Result<Vec<InventoryContainer>, InventoryError>;

    async fn daemon_info(&self) -> Result<DaemonInfo, InventoryError>;

    /// Returns the id of the new container.
    async fn create_container(&self, spec: ContainerSpec) -> Result<String, InventoryError>;
}
