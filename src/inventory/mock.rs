use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{
    ContainerInventory, ContainerSpec, DaemonInfo, InventoryContainer, InventoryError, LabelFilter,
};

/// In-memory inventory for tests.
#[derive(Debug, Default)]
pub struct MockInventory {
    containers: Mutex<Vec<InventoryContainer>>,
    list_calls: AtomicUsize,
    pub fail_list: bool,
    pub fail_info: bool,
}

impl MockInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContainerInventory for MockInventory {
    async fn list_containers(
        &self,
        filter: &LabelFilter,
    ) -> Result<Vec<InventoryContainer>, InventoryError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list {
            return Err(InventoryError::Unavailable("list refused".to_string()));
        }
        let containers = self.containers.lock().expect("Poisoned mutex");
        Ok(containers
            .iter()
            .filter(|c| filter.matches(&c.labels))
            .cloned()
            .collect())
    }

    async fn daemon_info(&self) -> Result<DaemonInfo, InventoryError> {
        if self.fail_info {
            return Err(InventoryError::Unavailable("info refused".to_string()));
        }
        Ok(DaemonInfo {
            name: "banana-potato".to_string(),
            server_version: "tangerine".to_string(),
        })
    }

    async fn create_container(&self, spec: ContainerSpec) -> Result<String, InventoryError> {
        let mut containers = self.containers.lock().expect("Poisoned mutex");
        let id = format!("{}-{}", spec.name, containers.len());
        containers.push(InventoryContainer {
            id: id.clone(),
            image: spec.image,
            labels: spec.labels,
        });
        Ok(id)
    }
}
