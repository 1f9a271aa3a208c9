//! Docker-backed inventory using bollard.
//!
//! Connects to the local daemon with the default connection method
//! (Unix socket on Linux/macOS, named pipe on Windows).

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::models::ContainerCreateBody;
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, ListContainersOptions,
    ListContainersOptionsBuilder,
};

use super::{
    ContainerInventory, ContainerSpec, DaemonInfo, InventoryContainer, InventoryError, LabelFilter,
};

#[derive(Clone)]
pub struct DockerInventory {
    docker: Docker,
}

impl DockerInventory {
    pub fn connect() -> Result<Self, InventoryError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }

    /// The underlying client, shared with the log source.
    pub fn docker(&self) -> &Docker {
        &self.docker
    }
}

#[async_trait]
impl ContainerInventory for DockerInventory {
    async fn list_containers(
        &self,
        filter: &LabelFilter,
    ) -> Result<Vec<InventoryContainer>, InventoryError> {
        let filters = HashMap::from_iter([("label", vec![filter.to_string()])]);
        let options: ListContainersOptions =
            ListContainersOptionsBuilder::default().filters(&filters).build();

        let containers = self.docker.list_containers(Some(options)).await?;

        Ok(containers
            .into_iter()
            .map(|summary| InventoryContainer {
                id: summary.id.unwrap_or_default(),
                image: summary.image.unwrap_or_default(),
                labels: summary.labels.unwrap_or_default(),
            })
            .collect())
    }

    async fn daemon_info(&self) -> Result<DaemonInfo, InventoryError> {
        let info = self.docker.info().await?;
        Ok(DaemonInfo {
            name: info.name.unwrap_or_default(),
            server_version: info.server_version.unwrap_or_default(),
        })
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, InventoryError> {
        log::info!("Creating container: {}", spec.name);

        let config = ContainerCreateBody {
            image: Some(spec.image),
            hostname: Some(spec.hostname),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env)
            },
            labels: if spec.labels.is_empty() {
                None
            } else {
                Some(spec.labels)
            },
            ..Default::default()
        };

        let options: CreateContainerOptions =
            CreateContainerOptionsBuilder::new().name(&spec.name).build();

        let response = self.docker.create_container(Some(options), config).await?;
        Ok(response.id)
    }
}
